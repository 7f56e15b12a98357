//! 角点特征匹配配准.
//!
//! 1. Harris 角点响应;
//! 2. 非极大值抑制后, 用有界堆保留最强的若干个角点;
//! 3. 以零均值, 单位范数的方形邻域块作为描述子;
//! 4. 归一化相关匹配, 要求互为最优且通过比值检验;
//! 5. 最小二乘拟合仿射, 按残差中位数迭代剔除外点.

use binary_heap_plus::BinaryHeap;
use ndarray::{s, Array2, ArrayView2};

use super::{AlignMethod, Aligner};
use crate::debug::DebugSink;
use crate::signal::gaussian_filter;
use crate::transform::Affine2;

/// Harris 响应中的经验常数.
const HARRIS_K: f64 = 0.04;

/// 结构张量平滑的标准差.
const TENSOR_SIGMA: f64 = 1.5;

/// 描述子邻域半径, 块边长为 `2 * PATCH_RADIUS + 1`.
const PATCH_RADIUS: usize = 7;

/// 非极大值抑制半径.
const NMS_RADIUS: usize = 3;

/// 响应低于最大响应的该比例时丢弃.
const RESPONSE_RATIO: f64 = 0.01;

/// 拟合所需的最少内点数.
const MIN_INLIERS: usize = 6;

/// 图像坐标 `(x, y)`.
type Point = (f64, f64);

#[derive(Copy, Clone, Debug)]
struct Keypoint {
    row: usize,
    col: usize,
    response: f64,
}

impl Keypoint {
    #[inline]
    fn point(&self) -> Point {
        (self.col as f64, self.row as f64)
    }
}

/// 特征匹配配准.
#[derive(Copy, Clone, Debug)]
pub struct FeatureAligner {
    /// 每幅图像保留的最多角点数.
    pub max_keypoints: usize,

    /// 比值检验阈值: 最优匹配距离须小于次优距离的该倍数.
    pub ratio: f64,

    /// 外点剔除的最多迭代次数.
    pub max_iterations: usize,
}

impl Default for FeatureAligner {
    fn default() -> Self {
        Self {
            max_keypoints: 200,
            ratio: 0.8,
            max_iterations: 5,
        }
    }
}

/// Harris 角点响应. 梯度用中心差分, 边界处复制边缘像素.
fn harris_response(img: ArrayView2<f32>) -> Array2<f64> {
    let (h, w) = img.dim();
    let at = |r: isize, c: isize| {
        img[(
            r.clamp(0, h as isize - 1) as usize,
            c.clamp(0, w as isize - 1) as usize,
        )] as f64
    };
    let mut ixx = Array2::<f64>::zeros((h, w));
    let mut iyy = Array2::<f64>::zeros((h, w));
    let mut ixy = Array2::<f64>::zeros((h, w));
    for r in 0..h as isize {
        for c in 0..w as isize {
            let gx = 0.5 * (at(r, c + 1) - at(r, c - 1));
            let gy = 0.5 * (at(r + 1, c) - at(r - 1, c));
            let idx = (r as usize, c as usize);
            ixx[idx] = gx * gx;
            iyy[idx] = gy * gy;
            ixy[idx] = gx * gy;
        }
    }
    for t in [&mut ixx, &mut iyy, &mut ixy] {
        gaussian_filter(t, TENSOR_SIGMA, 3.0, &[0, 1]);
    }
    let mut resp = ixx;
    ndarray::Zip::from(&mut resp)
        .and(&iyy)
        .and(&ixy)
        .for_each(|a, &b, &c| {
            let tr = *a + b;
            *a = *a * b - c * c - HARRIS_K * tr * tr;
        });
    resp
}

/// 零均值, 单位范数的邻域块. 平坦区域返回 `None`.
fn describe(img: ArrayView2<f32>, kp: &Keypoint) -> Option<Vec<f64>> {
    let r = PATCH_RADIUS;
    let patch = img.slice(s![kp.row - r..=kp.row + r, kp.col - r..=kp.col + r]);
    let mean = patch.iter().map(|&v| v as f64).sum::<f64>() / patch.len() as f64;
    let mut desc: Vec<f64> = patch.iter().map(|&v| v as f64 - mean).collect();
    let norm = desc.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < 1e-9 {
        return None;
    }
    desc.iter_mut().for_each(|v| *v /= norm);
    Some(desc)
}

/// 三元线性方程组的高斯消元 (列主元). 奇异时返回 `None`.
fn solve3(mut m: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let f = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= f * m[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / m[row][row];
    }
    Some(x)
}

/// 最小二乘拟合把 `src` 映射到 `dst` 的仿射.
fn fit_affine(pairs: &[(Point, Point)]) -> Option<Affine2> {
    let mut normal = [[0.0; 3]; 3];
    let (mut bx, mut by) = ([0.0; 3], [0.0; 3]);
    for &((x, y), (u, v)) in pairs {
        let p = [x, y, 1.0];
        for i in 0..3 {
            for j in 0..3 {
                normal[i][j] += p[i] * p[j];
            }
            bx[i] += p[i] * u;
            by[i] += p[i] * v;
        }
    }
    let row_x = solve3(normal, bx)?;
    let row_y = solve3(normal, by)?;
    Some(Affine2::new([row_x, row_y]))
}

fn residual(model: &Affine2, &((x, y), (u, v)): &(Point, Point)) -> f64 {
    let (px, py) = model.apply(x, y);
    (px - u).hypot(py - v)
}

fn median(mut data: Vec<f64>) -> f64 {
    data.sort_by(f64::total_cmp);
    data[data.len() / 2]
}

impl FeatureAligner {
    /// 检测角点, 按响应强度降序返回.
    fn detect(&self, img: ArrayView2<f32>, resp: &Array2<f64>) -> Vec<Keypoint> {
        let (h, w) = img.dim();
        let margin = PATCH_RADIUS;
        if h <= 2 * margin || w <= 2 * margin {
            return Vec::new();
        }
        let top = resp.iter().copied().fold(f64::MIN, f64::max);
        if !(top > 0.0) {
            return Vec::new();
        }
        let thresh = RESPONSE_RATIO * top;

        // 堆顶为当前保留角点中响应最弱者.
        let mut heap: BinaryHeap<Keypoint, _> =
            BinaryHeap::new_by(|a: &Keypoint, b: &Keypoint| b.response.total_cmp(&a.response));
        heap.reserve(self.max_keypoints + 1);
        for row in margin..h - margin {
            for col in margin..w - margin {
                let response = resp[(row, col)];
                if response <= thresh {
                    continue;
                }
                let window = resp.slice(s![
                    row.saturating_sub(NMS_RADIUS)..(row + NMS_RADIUS + 1).min(h),
                    col.saturating_sub(NMS_RADIUS)..(col + NMS_RADIUS + 1).min(w)
                ]);
                if window.iter().any(|&v| v > response) {
                    continue;
                }
                heap.push(Keypoint { row, col, response });
                if heap.len() > self.max_keypoints {
                    heap.pop();
                }
            }
        }
        let mut kps = heap.into_vec();
        kps.sort_by(|a, b| b.response.total_cmp(&a.response));
        kps
    }

    /// 互为最优且通过比值检验的匹配对 `(测试点, 模板点)`.
    fn match_descriptors(
        &self,
        template: &[(Keypoint, Vec<f64>)],
        test: &[(Keypoint, Vec<f64>)],
    ) -> Vec<(Point, Point)> {
        if template.is_empty() || test.is_empty() {
            return Vec::new();
        }
        let ncc = Array2::from_shape_fn((test.len(), template.len()), |(i, j)| {
            test[i].1.iter().zip(&template[j].1).map(|(a, b)| a * b).sum::<f64>()
        });
        // 单位向量间的欧氏距离.
        let dist = |c: f64| (2.0 - 2.0 * c).max(0.0).sqrt();

        let best_test_for = |j: usize| {
            (0..test.len()).max_by(|&a, &b| ncc[(a, j)].total_cmp(&ncc[(b, j)]))
        };

        let mut pairs = Vec::new();
        for (i, row) in ncc.outer_iter().enumerate() {
            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
            let best = order[0];
            let second = order.get(1).map_or(f64::INFINITY, |&k| dist(row[k]));
            if dist(row[best]) >= self.ratio * second {
                continue;
            }
            if best_test_for(best) != Some(i) {
                continue;
            }
            pairs.push((test[i].0.point(), template[best].0.point()));
        }
        pairs
    }

    /// 迭代剔除外点后拟合.
    fn robust_fit(&self, pairs: &[(Point, Point)]) -> Option<(Affine2, usize)> {
        let mut inliers: Vec<usize> = (0..pairs.len()).collect();
        for _ in 0..self.max_iterations.max(1) {
            if inliers.len() < MIN_INLIERS {
                return None;
            }
            let subset: Vec<_> = inliers.iter().map(|&i| pairs[i]).collect();
            let model = fit_affine(&subset)?;
            let res: Vec<f64> = pairs.iter().map(|p| residual(&model, p)).collect();
            let med = median(inliers.iter().map(|&i| res[i]).collect());
            let thresh = (2.5 * med).max(1.0);
            let next: Vec<usize> = (0..pairs.len()).filter(|&i| res[i] <= thresh).collect();
            if next == inliers {
                return Some((model, inliers.len()));
            }
            inliers = next;
        }
        if inliers.len() < MIN_INLIERS {
            return None;
        }
        let subset: Vec<_> = inliers.iter().map(|&i| pairs[i]).collect();
        fit_affine(&subset).map(|m| (m, inliers.len()))
    }
}

impl Aligner for FeatureAligner {
    #[inline]
    fn method(&self) -> AlignMethod {
        AlignMethod::Features
    }

    fn estimate(
        &self,
        template: ArrayView2<f32>,
        test: ArrayView2<f32>,
        debug: Option<&DebugSink>,
    ) -> Option<Affine2> {
        let describe_all = |img: ArrayView2<f32>, name: &str| {
            let resp = harris_response(img);
            if let Some(sink) = debug {
                sink.save_gray(name, resp.view());
            }
            self.detect(img, &resp)
                .into_iter()
                .filter_map(|kp| describe(img, &kp).map(|d| (kp, d)))
                .collect::<Vec<_>>()
        };
        let template_kps = describe_all(template, "harris_template");
        let test_kps = describe_all(test, "harris_test");
        let pairs = self.match_descriptors(&template_kps, &test_kps);
        log::debug!(
            "features: {} / {} keypoints, {} matches",
            template_kps.len(),
            test_kps.len(),
            pairs.len()
        );

        let (model, inliers) = self.robust_fit(&pairs)?;
        log::debug!("features: {inliers} inliers");
        Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::{fit_affine, solve3, FeatureAligner};
    use crate::align::Aligner;
    use crate::test_utils::smooth_image;
    use crate::transform::Affine2;
    use ndarray::{s, Array2};

    #[test]
    fn test_solve3() {
        let x = solve3([[2.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 4.0]], [3.0, 5.0, 5.0]).unwrap();
        for (a, b) in x.iter().zip([1.0, 1.0, 1.0]) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(solve3([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]], [1.0; 3]).is_none());
    }

    #[test]
    fn test_fit_exact_affine() {
        let truth = Affine2::new([[1.01, 0.02, 3.0], [-0.015, 0.99, -2.0]]);
        let pairs: Vec<_> = (0..10)
            .map(|i| {
                let p = ((i * 7 % 11) as f64, (i * 3 % 5) as f64 + i as f64);
                (p, truth.apply(p.0, p.1))
            })
            .collect();
        let fit = fit_affine(&pairs).unwrap();
        for (r, t) in fit.matrix().iter().zip(truth.matrix()) {
            for (a, b) in r.iter().zip(t) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_translation() {
        let big = smooth_image((110, 110), 21, 2.0);
        let template = big.slice(s![10..100, 10..100]);
        let test = big.slice(s![15..105, 8..98]);
        let a = FeatureAligner::default().estimate(template, test, None).unwrap();
        // test(r, c) == template(r + 5, c - 2)
        let (x, y) = a.apply(40.0, 50.0);
        assert!((x - 38.0).abs() < 0.5 && (y - 55.0).abs() < 0.5, "{x} {y}");
    }

    #[test]
    fn test_flat_fails() {
        let flat = Array2::<f32>::ones((64, 64));
        assert!(FeatureAligner::default().estimate(flat.view(), flat.view(), None).is_none());
    }
}

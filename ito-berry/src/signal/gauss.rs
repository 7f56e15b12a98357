//! 可分离高斯滤波, 边界模式为 `reflect` (`d c b a | a b c d | d c b a`).

use ndarray::{Array, Array3, ArrayViewMut1, Axis, Dimension, Zip};
use num::traits::AsPrimitive;
use num::Float;

use crate::consts::BLUR_TRUNCATE;

/// 归一化的一维高斯核, 半径为 `(truncate * sigma + 0.5) as usize`.
///
/// 若 `sigma` 不为正, 则程序 panic.
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    assert!(sigma > 0.0, "高斯核标准差必须为正");
    let radius = (truncate * sigma + 0.5) as isize;
    let inv = -0.5 / (sigma * sigma);
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| ((x * x) as f64 * inv).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// `reflect` 边界下, 越界索引 `i` 在长度为 `n` 的数组中对应的位置.
#[inline]
pub fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let i = i.rem_euclid(period) as usize;
    if i < n {
        i
    } else {
        2 * n - 1 - i
    }
}

/// 用一维核对单条 lane 做相关.
fn filter_lane<T>(mut lane: ArrayViewMut1<T>, weights: &[T])
where
    T: Float,
{
    let n = lane.len();
    let radius = (weights.len() / 2) as isize;
    let src = lane.to_vec();
    for (i, out) in lane.iter_mut().enumerate() {
        *out = weights
            .iter()
            .enumerate()
            .fold(T::zero(), |acc, (k, &w)| {
                acc + w * src[reflect_index(i as isize + k as isize - radius, n)]
            });
    }
}

/// 沿指定的若干轴做原地高斯滤波.
///
/// 空数组或 `sigma` 不为正时不做任何处理.
pub fn gaussian_filter<T, D>(arr: &mut Array<T, D>, sigma: f64, truncate: f64, axes: &[usize])
where
    T: Float + Send + Sync + 'static,
    f64: AsPrimitive<T>,
    D: Dimension,
{
    if arr.is_empty() || sigma.is_nan() || sigma <= 0.0 {
        return;
    }
    let weights: Vec<T> = gaussian_kernel(sigma, truncate)
        .into_iter()
        .map(|w| w.as_())
        .collect();
    for &axis in axes {
        let lanes = Zip::from(arr.lanes_mut(Axis(axis)));
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                lanes.par_for_each(|lane| filter_lane(lane, &weights));
            } else {
                lanes.for_each(|lane| filter_lane(lane, &weights));
            }
        }
    }
}

/// 对 `(行, 列, 光谱)` 立方体的每个光谱平面做横向高斯模糊.
pub fn blur_lateral(cube: &mut Array3<f32>, sigma: f64) {
    gaussian_filter(cube, sigma, BLUR_TRUNCATE, &[0, 1]);
}

#[cfg(test)]
mod tests {
    use super::{blur_lateral, gaussian_filter, gaussian_kernel, reflect_index};
    use ndarray::{Array1, Array3};

    #[test]
    fn test_kernel_size_and_sum() {
        let k = gaussian_kernel(1.5, 3.5);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((k[0] - k[10]).abs() < 1e-15);
        assert_eq!(gaussian_kernel(2.0, 4.0).len(), 17);
    }

    #[test]
    fn test_reflect_index() {
        let n = 4;
        let got: Vec<usize> = (-4..8).map(|i| reflect_index(i, n)).collect();
        assert_eq!(got, vec![3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-1, 1), 0);
        assert_eq!(reflect_index(5, 1), 0);
    }

    #[test]
    fn test_constant_preserved() {
        let mut cube = Array3::from_elem((6, 7, 3), 2.5f32);
        blur_lateral(&mut cube, 2.0);
        assert!(cube.iter().all(|v| (v - 2.5).abs() < 1e-5));
    }

    #[test]
    fn test_impulse_spreads_symmetrically() {
        let mut line = Array1::<f64>::zeros(21);
        line[10] = 1.0;
        gaussian_filter(&mut line, 1.0, 4.0, &[0]);
        assert!((line.sum() - 1.0).abs() < 1e-12);
        assert!((line[9] - line[11]).abs() < 1e-15);
        assert!(line[10] > line[9] && line[9] > line[8]);
    }

    #[test]
    fn test_non_positive_sigma_is_identity() {
        let orig = Array3::from_shape_fn((4, 4, 2), |(r, c, k)| (r * 8 + c * 2 + k) as f32);
        for sigma in [0.0, -1.5, f64::NAN] {
            let mut cube = orig.clone();
            blur_lateral(&mut cube, sigma);
            assert_eq!(cube, orig);
        }
    }

    #[test]
    fn test_blur_keeps_spectral_axis() {
        let mut cube = Array3::<f32>::zeros((9, 9, 4));
        cube[(4, 4, 1)] = 1.0;
        blur_lateral(&mut cube, 1.0);
        assert!(cube.slice(ndarray::s![.., .., 0]).iter().all(|v| *v == 0.0));
        assert!((cube.slice(ndarray::s![.., .., 1]).sum() - 1.0).abs() < 1e-5);
    }
}

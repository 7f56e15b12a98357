//! 峰值搜索与峰值附近的形状描述.

use std::cmp::Reverse;

use ndarray::{ArrayView1, ArrayView2};
use ordered_float::OrderedFloat;

/// 第一个最大值的索引. 空输入返回 `None`.
pub fn argmax<I: IntoIterator<Item = f64>>(data: I) -> Option<usize> {
    data.into_iter()
        .enumerate()
        .min_by_key(|&(_, v)| Reverse(OrderedFloat(v)))
        .map(|(i, _)| i)
}

/// 二维数组中 (行优先意义下) 第一个最大值的索引.
pub fn argmax_2d(data: ArrayView2<f64>) -> Option<(usize, usize)> {
    data.indexed_iter()
        .min_by_key(|&(_, v)| Reverse(OrderedFloat(*v)))
        .map(|(idx, _)| idx)
}

/// 三点抛物线拟合得到的峰值亚像素偏移, 范围 `[-0.5, 0.5]`.
///
/// `left`, `center`, `right` 为峰值及其两侧的取值. 曲率退化时返回 0.
#[inline]
pub fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if !denom.is_finite() || denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// 一维曲线在峰值处的相关衰减率 (correlation decay rate).
///
/// 曲线先按峰值归一化, 然后取峰值两侧距离为 `interval` 处的单侧差分
/// `(1 - c[peak ± interval]) / interval` 的平均. 只有一侧在界内时仅使用该侧,
/// 两侧均越界时为 0.
pub fn decay_rate_1d(curve: ArrayView1<f64>, peak: usize, interval: usize) -> f64 {
    let top = curve[peak];
    let side = |idx: usize| (1.0 - curve[idx] / top) / interval as f64;

    let mut sum = 0.0;
    let mut count = 0;
    if let Some(idx) = peak.checked_sub(interval) {
        sum += side(idx);
        count += 1;
    }
    if peak + interval < curve.len() {
        sum += side(peak + interval);
        count += 1;
    }
    match count {
        0 => 0.0,
        _ => sum / count as f64,
    }
}

/// 二维曲面在峰值处沿行方向与列方向的相关衰减率 `(cdr_y, cdr_x)`.
pub fn decay_rate_2d(surface: ArrayView2<f64>, peak: (usize, usize), interval: usize) -> (f64, f64) {
    let (pr, pc) = peak;
    let cdr_y = decay_rate_1d(surface.column(pc), pr, interval);
    let cdr_x = decay_rate_1d(surface.row(pr), pc, interval);
    (cdr_y, cdr_x)
}

#[cfg(test)]
mod tests {
    use super::{argmax, argmax_2d, decay_rate_1d, decay_rate_2d, parabolic_offset};
    use ndarray::{arr1, arr2};

    #[test]
    fn test_argmax_first_of_ties() {
        assert_eq!(argmax([1.0, 3.0, 2.0, 3.0]), Some(1));
        assert_eq!(argmax(Vec::<f64>::new()), None);
        let a = arr2(&[[0.0, 5.0], [5.0, 1.0]]);
        assert_eq!(argmax_2d(a.view()), Some((0, 1)));
    }

    #[test]
    fn test_parabolic_recovers_vertex() {
        // y = -(x - 0.3)^2 在 x = -1, 0, 1 处采样.
        let f = |x: f64| -(x - 0.3) * (x - 0.3);
        let off = parabolic_offset(f(-1.0), f(0.0), f(1.0));
        assert!((off - 0.3).abs() < 1e-12);
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_decay_rate_sharper_is_larger() {
        let wide = arr1(&[0.6, 0.8, 0.9, 1.0, 0.9, 0.8, 0.6]);
        let sharp = arr1(&[0.1, 0.2, 0.5, 1.0, 0.5, 0.2, 0.1]);
        let w = decay_rate_1d(wide.view(), 3, 2);
        let s = decay_rate_1d(sharp.view(), 3, 2);
        assert!(w >= 0.0 && s > w);
        assert!((w - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_decay_rate_edges() {
        let c = arr1(&[1.0, 0.5, 0.0]);
        // 仅右侧在界内.
        assert!((decay_rate_1d(c.view(), 0, 2) - 0.5).abs() < 1e-12);
        assert_eq!(decay_rate_1d(arr1(&[2.0]).view(), 0, 1), 0.0);
    }

    #[test]
    fn test_decay_rate_2d_axes() {
        let s = arr2(&[
            [0.0, 0.5, 0.0],
            [0.0, 1.0, 0.8],
            [0.0, 0.5, 0.0],
        ]);
        let (y, x) = decay_rate_2d(s.view(), (1, 1), 1);
        assert!((y - 0.5).abs() < 1e-12);
        assert!((x - 0.6).abs() < 1e-12);
    }
}

//! 数值信号处理: 基于 FFT 的互相关, 高斯滤波和峰值搜索.
//!
//! 所有互相关均采用 `full` 模式: 长度为 `n1` 和 `n2` 的输入产生长度
//! `n1 + n2 - 1` 的输出, 零偏移位于索引 `n2 - 1`. 输出的第 `k` 个元素为
//! `sum_j a[j + k - (n2 - 1)] * b[j]`.

mod correlate;
mod gauss;
mod peak;

pub use correlate::{correlate_full_1d, correlate_full_2d, normalized_xcorr_2d, Correlator1d};
pub use gauss::{blur_lateral, gaussian_filter, gaussian_kernel, reflect_index};
pub use peak::{argmax, argmax_2d, decay_rate_1d, decay_rate_2d, parabolic_offset};

/// 总体标准差意义下的 `(均值, 标准差)`.
///
/// 空输入返回 `(0, 0)`.
pub fn mean_std<I>(data: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = data.into_iter();
    let (sum, n) = iter.clone().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = iter.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::mean_std;

    #[test]
    fn test_mean_std() {
        let (m, s) = mean_std([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((m - 5.0).abs() < 1e-12);
        assert!((s - 2.0).abs() < 1e-12);
        assert_eq!(mean_std(std::iter::empty::<f64>().collect::<Vec<_>>()), (0.0, 0.0));
    }
}

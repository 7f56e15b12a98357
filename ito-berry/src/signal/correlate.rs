//! FFT 互相关.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::mean_std;

/// 对二维复数数组沿 `axis` 的每条 lane 执行 FFT.
fn fft_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &dyn Fft<f64>) {
    let mut buf = vec![Complex64::default(); data.len_of(axis)];
    for mut lane in data.lanes_mut(axis) {
        buf.iter_mut().zip(lane.iter()).for_each(|(b, v)| *b = *v);
        fft.process(&mut buf);
        lane.iter_mut().zip(buf.iter()).for_each(|(v, b)| *v = *b);
    }
}

/// 一维 `full` 互相关器, 预先规划好正反 FFT.
///
/// 多条信号的互相关之和可以在频域累加后只做一次逆变换,
/// 见 [`Correlator1d::accumulate`] 和 [`Correlator1d::finish`].
#[derive(Clone)]
pub struct Correlator1d {
    n1: usize,
    n2: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Correlator1d {
    /// 为长度 `n1` (第一参数) 与 `n2` (第二参数) 的信号创建互相关器.
    ///
    /// 若任一长度为 0, 则程序 panic.
    pub fn new(n1: usize, n2: usize) -> Self {
        assert!(n1 > 0 && n2 > 0, "互相关输入不能为空");
        let size = n1 + n2 - 1;
        let mut planner = FftPlanner::new();
        Self {
            n1,
            n2,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    /// 输出长度 `n1 + n2 - 1`.
    #[inline]
    pub fn out_len(&self) -> usize {
        self.n1 + self.n2 - 1
    }

    /// 零偏移对应的输出索引.
    #[inline]
    pub fn zero_shift(&self) -> usize {
        self.n2 - 1
    }

    /// 补零后的频谱.
    pub fn spectrum<I: IntoIterator<Item = f64>>(&self, data: I) -> Vec<Complex64> {
        let mut buf = vec![Complex64::default(); self.out_len()];
        buf.iter_mut()
            .zip(data)
            .for_each(|(b, v)| *b = Complex64::new(v, 0.0));
        self.forward.process(&mut buf);
        buf
    }

    /// `acc += a * conj(b)`.
    pub fn accumulate(acc: &mut [Complex64], a: &[Complex64], b: &[Complex64]) {
        for ((c, x), y) in acc.iter_mut().zip(a).zip(b) {
            *c += x * y.conj();
        }
    }

    /// 将频域累加结果逆变换回 `full` 互相关.
    pub fn finish(&self, mut acc: Vec<Complex64>) -> Array1<f64> {
        let size = self.out_len();
        self.inverse.process(&mut acc);
        let scale = 1.0 / size as f64;
        let shift = self.zero_shift();
        Array1::from_shape_fn(size, |k| acc[(k + size - shift) % size].re * scale)
    }

    /// 直接计算两条信号的互相关.
    pub fn correlate<I, J>(&self, a: I, b: J) -> Array1<f64>
    where
        I: IntoIterator<Item = f64>,
        J: IntoIterator<Item = f64>,
    {
        let sa = self.spectrum(a);
        let sb = self.spectrum(b);
        let mut acc = vec![Complex64::default(); self.out_len()];
        Self::accumulate(&mut acc, &sa, &sb);
        self.finish(acc)
    }
}

/// 一维 `full` 互相关.
pub fn correlate_full_1d(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    Correlator1d::new(a.len(), b.len()).correlate(a.iter().copied(), b.iter().copied())
}

/// 二维 `full` 互相关, 输出形状 `(h1 + h2 - 1, w1 + w2 - 1)`, 零偏移位于 `(h2 - 1, w2 - 1)`.
///
/// 若任一输入为空, 则程序 panic.
pub fn correlate_full_2d(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    let (h1, w1) = a.dim();
    let (h2, w2) = b.dim();
    assert!(h1 * w1 > 0 && h2 * w2 > 0, "互相关输入不能为空");
    let (ph, pw) = (h1 + h2 - 1, w1 + w2 - 1);

    let mut planner = FftPlanner::<f64>::new();
    let (row_fwd, col_fwd) = (planner.plan_fft_forward(pw), planner.plan_fft_forward(ph));
    let (row_inv, col_inv) = (planner.plan_fft_inverse(pw), planner.plan_fft_inverse(ph));

    let spectrum = |src: ArrayView2<f64>| {
        let mut buf = Array2::<Complex64>::zeros((ph, pw));
        buf.slice_mut(ndarray::s![..src.nrows(), ..src.ncols()])
            .zip_mut_with(&src, |d, s| *d = Complex64::new(*s, 0.0));
        fft_lanes(&mut buf, Axis(1), row_fwd.as_ref());
        fft_lanes(&mut buf, Axis(0), col_fwd.as_ref());
        buf
    };

    let mut cross = spectrum(a);
    cross.zip_mut_with(&spectrum(b), |x, y| *x *= y.conj());
    fft_lanes(&mut cross, Axis(1), row_inv.as_ref());
    fft_lanes(&mut cross, Axis(0), col_inv.as_ref());

    let scale = 1.0 / (ph * pw) as f64;
    Array2::from_shape_fn((ph, pw), |(r, c)| {
        cross[((r + ph - (h2 - 1)) % ph, (c + pw - (w2 - 1)) % pw)].re * scale
    })
}

/// 标准差相对均值可以忽略 (或非有限) 时视为常数图像.
#[inline]
fn is_flat(mean: f64, std: f64) -> bool {
    !std.is_finite() || std <= 1e-9 * mean.abs().max(1.0)
}

/// 归一化二维互相关.
///
/// 两幅图像均被归一化到零均值, 单位 (总体) 方差, 第二幅再额外除以其像素数,
/// 因此相同图像的零偏移处互相关为 1. 任一图像为常数 (或包含非有限值) 时返回 `None`.
pub fn normalized_xcorr_2d(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Option<Array2<f64>> {
    let (ma, sa) = mean_std(a.iter().map(|&v| v as f64));
    let (mb, sb) = mean_std(b.iter().map(|&v| v as f64));
    if is_flat(ma, sa) || is_flat(mb, sb) {
        return None;
    }
    let count = b.len() as f64;
    let na = a.mapv(|v| (v as f64 - ma) / sa);
    let nb = b.mapv(|v| (v as f64 - mb) / (sb * count));
    Some(correlate_full_2d(na.view(), nb.view()))
}

#[cfg(test)]
mod tests {
    use super::{correlate_full_1d, correlate_full_2d, normalized_xcorr_2d, Correlator1d};
    use ndarray::{arr1, arr2, Array2};

    fn brute_1d(a: &[f64], b: &[f64]) -> Vec<f64> {
        let n2 = b.len() as isize;
        (0..a.len() + b.len() - 1)
            .map(|k| {
                (0..b.len())
                    .filter_map(|j| {
                        let i = j as isize + k as isize - (n2 - 1);
                        (0..a.len() as isize)
                            .contains(&i)
                            .then(|| a[i as usize] * b[j])
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_1d_matches_direct_sum() {
        let a = [1.0, 2.0, 3.0, -1.0];
        let b = [0.5, -2.0, 1.0];
        let got = correlate_full_1d(arr1(&a).view(), arr1(&b).view());
        let want = brute_1d(&a, &b);
        assert_eq!(got.len(), 6);
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-9, "{g} vs {w}");
        }
    }

    #[test]
    fn test_accumulate_is_linear() {
        let cor = Correlator1d::new(5, 5);
        let xs = [[1.0, 0.0, 2.0, 1.0, -1.0], [0.0, 3.0, 1.0, 1.0, 2.0]];
        let ys = [[2.0, 1.0, 0.0, 1.0, 0.0], [1.0, 1.0, -1.0, 0.0, 4.0]];
        let mut acc = vec![rustfft::num_complex::Complex64::default(); cor.out_len()];
        for (x, y) in xs.iter().zip(ys.iter()) {
            let (sx, sy) = (cor.spectrum(x.iter().copied()), cor.spectrum(y.iter().copied()));
            Correlator1d::accumulate(&mut acc, &sx, &sy);
        }
        let sum = cor.finish(acc);
        let direct = cor.correlate(xs[0].iter().copied(), ys[0].iter().copied())
            + cor.correlate(xs[1].iter().copied(), ys[1].iter().copied());
        for (a, b) in sum.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_2d_zero_shift_index() {
        let a = arr2(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        let c = correlate_full_2d(a.view(), a.view());
        assert_eq!(c.dim(), (5, 5));
        assert!((c[(2, 2)] - 1.0).abs() < 1e-12);
        assert!(c.iter().filter(|v| v.abs() > 1e-9).count() == 1);
    }

    #[test]
    fn test_2d_direction() {
        // 测试图像中的亮点比模板靠下一行, 靠右两列.
        let mut a = Array2::zeros((5, 6));
        let mut b = Array2::zeros((5, 6));
        a[(1, 1)] = 1.0;
        b[(2, 3)] = 1.0;
        let c = correlate_full_2d(a.view(), b.view());
        let (pr, pc) = crate::signal::argmax_2d(c.view()).unwrap();
        assert_eq!((pr as isize - 4, pc as isize - 5), (-1, -2));
    }

    #[test]
    fn test_normalized_identical_peak_is_one() {
        let img = Array2::from_shape_fn((8, 9), |(r, c)| ((r * 7 + c * 3) % 5) as f32);
        let c = normalized_xcorr_2d(img.view(), img.view()).unwrap();
        assert!((c[(7, 8)] - 1.0).abs() < 1e-9);
        assert!(c.iter().all(|v| *v <= 1.0 + 1e-9));
        assert!(normalized_xcorr_2d(Array2::ones((4, 4)).view(), img.view()).is_none());
    }
}

//! 曲线拟合.
//!
//! 给定一系列点 `(x, y)`, 该模块可以拟合出一条三次样条曲线 (not-a-knot 边界条件),
//! 并在任意位置求值. 光谱上采样依赖于此.

use ndarray::{Array, Array1, ArrayView1};

mod cubic_spline;

// Q: 用宏替代?

/// 三次样条插值.
///
/// `x` 是严格递增的数组, `y` 是对应函数值, 返回曲线在 `xq` 各点处的值.
pub fn cubic_spline_f32(x: ArrayView1<f32>, y: ArrayView1<f32>, xq: ArrayView1<f32>) -> Array1<f32> {
    cubic_spline::CubicSplineImp::<f32>::new(x.view(), y.view()).interpolate(xq)
}

/// 三次样条插值.
///
/// `x` 是严格递增的数组, `y` 是对应函数值, 返回曲线在 `xq` 各点处的值.
pub fn cubic_spline_f64(x: ArrayView1<f64>, y: ArrayView1<f64>, xq: ArrayView1<f64>) -> Array1<f64> {
    cubic_spline::CubicSplineImp::<f64>::new(x.view(), y.view()).interpolate(xq)
}

/// 将 `[0, 1]` 上等距采样的 `y` 重采样为 `out_len` 个等距点.
///
/// # 注意
///
/// `y` 至少需要三个点, 否则程序 panic.
pub fn resample_cubic(y: ArrayView1<f64>, out_len: usize) -> Array1<f64> {
    let x = Array::linspace(0.0, 1.0, y.len());
    let xq = Array::linspace(0.0, 1.0, out_len);
    cubic_spline_f64(x.view(), y, xq.view())
}

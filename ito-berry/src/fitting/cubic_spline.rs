//! 三次样条曲线.

use ndarray::{Array1, Array2, ArrayView1};
use num::Float;

// ref: https://zhuanlan.zhihu.com/p/628508199

macro_rules! impl_cubic {
    ($fp: ty, $two: expr, $three: expr) => {
        impl<'a> CubicSplineImp<'a, $fp> {
            #[inline]
            pub fn new(x: ArrayView1<'a, $fp>, y: ArrayView1<'a, $fp>) -> Self {
                assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
                assert!(x.len() >= 3, "该样条曲线至少需要三个点");
                assert!(
                    x.windows(2).into_iter().all(|v| v[0] < v[1]),
                    "x 值必须严格递增"
                );

                Self::new_no_check(x, y)
            }

            #[inline]
            fn new_no_check(x: ArrayView1<'a, $fp>, y: ArrayView1<'a, $fp>) -> Self {
                Self { x, y }
            }

            /// 在 `xq` 处求样条值. 区间外的点沿用端点区间的多项式外推.
            pub fn interpolate(&self, xq: ArrayView1<$fp>) -> Array1<$fp> {
                let len = self.x.len();
                let coe = self.spline_coefficient();
                let xs = self.x.as_slice();

                xq.mapv(|q| {
                    let i = match xs {
                        Some(s) => s.partition_point(|&v| v <= q),
                        None => self.x.iter().take_while(|&&v| v <= q).count(),
                    }
                    .clamp(1, len - 1)
                        - 1;
                    let dx = q - self.x[i];
                    // 栈上常访变量
                    let (b, c, d) = (coe[(i, 0)], coe[(i, 1)], coe[(i, 2)]);
                    ((d * dx + c) * dx + b) * dx + self.y[i]
                })
            }

            fn array1_diff(arr: ArrayView1<$fp>) -> Array1<$fp> {
                let vector: Vec<$fp> = arr.windows(2).into_iter().map(|v| v[1] - v[0]).collect();
                Array1::from_vec(vector)
            }

            /// 三对角方程组的追赶法求解.
            fn solve_tridiagonal(
                sub: &[$fp],
                diag: &[$fp],
                sup: &[$fp],
                r: &[$fp],
            ) -> Vec<$fp> {
                let len = diag.len();
                let mut cp = vec![0.0 as $fp; len];
                let mut dp = vec![0.0 as $fp; len];
                cp[0] = sup[0] / diag[0];
                dp[0] = r[0] / diag[0];
                for i in 1..len {
                    let m = diag[i] - sub[i] * cp[i - 1];
                    cp[i] = sup[i] / m;
                    dp[i] = (r[i] - sub[i] * dp[i - 1]) / m;
                }
                let mut out = vec![0.0 as $fp; len];
                out[len - 1] = dp[len - 1];
                for i in (0..len - 1).rev() {
                    out[i] = dp[i] - cp[i] * out[i + 1];
                }
                out
            }

            /// 各节点处的二次系数 (二阶导数的一半), 边界条件为 not-a-knot:
            /// 首末两段各自与相邻段共用同一个三次多项式.
            fn quadratic_terms(dx: &Array1<$fp>, dy: &Array1<$fp>) -> Vec<$fp> {
                let len = dx.len() + 1;
                let slope = |i: usize| dy[i] / dx[i];

                // 三个点时整条曲线就是过这三点的抛物线.
                if len == 3 {
                    let c = (slope(1) - slope(0)) / (dx[0] + dx[1]);
                    return vec![c; 3];
                }

                // 消去 c[0] 与 c[len - 1], 只解内部节点.
                let m = len - 2;
                let mut sub = vec![0.0 as $fp; m];
                let mut diag = vec![0.0 as $fp; m];
                let mut sup = vec![0.0 as $fp; m];
                let mut r = vec![0.0 as $fp; m];
                for j in 0..m {
                    let i = j + 1;
                    sub[j] = dx[i - 1];
                    diag[j] = $two * (dx[i - 1] + dx[i]);
                    sup[j] = dx[i];
                    r[j] = $three * (slope(i) - slope(i - 1));
                }
                let (h0, h1) = (dx[0], dx[1]);
                diag[0] = (h0 + h1) * (h0 + $two * h1) / h1;
                sup[0] = (h1 * h1 - h0 * h0) / h1;
                let (ha, hb) = (dx[len - 3], dx[len - 2]);
                sub[m - 1] = (ha * ha - hb * hb) / ha;
                diag[m - 1] = (ha + hb) * ($two * ha + hb) / ha;
                sub[0] = 0.0 as $fp;
                sup[m - 1] = 0.0 as $fp;

                let inner = Self::solve_tridiagonal(&sub, &diag, &sup, &r);
                let mut quad = Vec::with_capacity(len);
                quad.push(((h0 + h1) * inner[0] - h0 * inner[1]) / h1);
                quad.extend_from_slice(&inner);
                quad.push(((ha + hb) * inner[m - 1] - hb * inner[m - 2]) / ha);
                quad
            }

            /// 每个区间的 `(一次, 二次, 三次)` 系数, 形状为 `(len - 1, 3)`.
            fn spline_coefficient(&self) -> Array2<$fp> {
                let len = self.x.len();
                let dx = Self::array1_diff(self.x.view());
                let dy = Self::array1_diff(self.y.view());
                let quad = Self::quadratic_terms(&dx, &dy);

                let mut coe: Array2<$fp> = Array2::zeros((len - 1, 3));
                for i in 0..(len - 1) {
                    coe[(i, 1)] = quad[i];
                    coe[(i, 2)] = (quad[i + 1] - quad[i]) / ($three * dx[i]);
                    coe[(i, 0)] =
                        dy[i] / dx[i] - dx[i] * ($two * quad[i] + quad[i + 1]) / $three;
                }
                coe
            }
        }
    };
}

pub(crate) struct CubicSplineImp<'a, T: Float> {
    x: ArrayView1<'a, T>,
    y: ArrayView1<'a, T>,
}

impl_cubic!(f32, 2.0_f32, 3.0_f32);
impl_cubic!(f64, 2.0_f64, 3.0_f64);

//! 二维仿射变换.
//!
//! 坐标约定: `x` 为列, `y` 为行. 配准得到的 [`Affine2`] 将 **测试** 图像的像素坐标
//! 映射到 **模板** 图像的像素坐标. 形变时对模板坐标系中的每个像素使用其逆变换
//! 在测试图像中采样.

use ndarray::{arr2, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::AlignMethod;
use crate::consts::coerce::{MAX_ROTATION_DEG, MAX_SCALE_DRIFT};

/// 行列式绝对值小于该值时视为奇异矩阵.
const SINGULAR_EPS: f64 = 1e-12;

/// 仅保留平移失败.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoercionError {
    /// 缩放因子偏离 1 过多. 参数为两个轴上的缩放因子.
    #[error("scale ({0:.4}, {1:.4}) drifts too far from 1")]
    Scale(f64, f64),

    /// 旋转角过大. 参数单位为度.
    #[error("rotation of {0:.3} degrees is too large")]
    Rotation(f64),
}

/// 2x3 仿射矩阵 `[[a, b, tx], [c, d, ty]]`.
///
/// `x' = a * x + b * y + tx`, `y' = c * x + d * y + ty`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine2 {
    m: [[f64; 3]; 2],
}

/// 仿射矩阵分解得到的几何参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Decomposition {
    /// `x` 轴缩放.
    pub scale_x: f64,

    /// `y` 轴缩放.
    pub scale_y: f64,

    /// 旋转角 (弧度).
    pub rotation: f64,

    /// 剪切系数.
    pub shear: f64,

    /// 平移 `(tx, ty)`.
    pub translation: (f64, f64),
}

impl Affine2 {
    /// 恒等变换.
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    /// 由矩阵直接创建.
    #[inline]
    pub const fn new(m: [[f64; 3]; 2]) -> Self {
        Self { m }
    }

    /// 纯平移.
    #[inline]
    pub const fn from_translation(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        }
    }

    /// 矩阵元素.
    #[inline]
    pub const fn matrix(&self) -> &[[f64; 3]; 2] {
        &self.m
    }

    /// 对点 `(x, y)` 进行变换.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [[a, b, tx], [c, d, ty]] = self.m;
        (a * x + b * y + tx, c * x + d * y + ty)
    }

    /// 线性部分的行列式.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    /// 平移部分 `(tx, ty)`.
    #[inline]
    pub fn translation(&self) -> (f64, f64) {
        (self.m[0][2], self.m[1][2])
    }

    /// 逆变换. 矩阵奇异 (或含非有限值) 时返回 `None`.
    pub fn invert(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPS {
            return None;
        }
        let [[a, b, tx], [c, d, ty]] = self.m;
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Self {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }

    /// 分解为 `R(θ) * [[sx, m], [0, sy]]` 的形式.
    pub fn decompose(&self) -> Decomposition {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let scale_x = a.hypot(c);
        let rotation = c.atan2(a);
        let (sin, cos) = rotation.sin_cos();
        let m = b * cos + d * sin;
        let scale_y = d * cos - b * sin;
        let shear = if scale_y.abs() < SINGULAR_EPS {
            0.0
        } else {
            m / scale_y
        };
        Decomposition {
            scale_x,
            scale_y,
            rotation,
            shear,
            translation: (tx, ty),
        }
    }

    /// 仅保留平移.
    ///
    /// 先检查缩放因子与旋转角是否可以忽略, 否则返回错误.
    pub fn coerce_to_translation(&self) -> Result<Self, CoercionError> {
        let dec = self.decompose();
        if (dec.scale_x - 1.0).abs() >= MAX_SCALE_DRIFT
            || (dec.scale_y - 1.0).abs() >= MAX_SCALE_DRIFT
        {
            return Err(CoercionError::Scale(dec.scale_x, dec.scale_y));
        }
        let deg = dec.rotation.to_degrees();
        if deg.abs() >= MAX_ROTATION_DEG {
            return Err(CoercionError::Rotation(deg));
        }
        let (tx, ty) = dec.translation;
        Ok(Self::from_translation(tx, ty))
    }

    /// 转换为 `2x3` 数组, 用于持久化.
    pub fn to_array(&self) -> Array2<f64> {
        arr2(&self.m)
    }

    /// 从 `2x3` 数组还原. 形状不符时返回 `None`.
    pub fn from_array(arr: ArrayView2<f64>) -> Option<Self> {
        if arr.dim() != (2, 3) {
            return None;
        }
        let mut m = [[0.0; 3]; 2];
        for ((r, c), v) in arr.indexed_iter() {
            m[r][c] = *v;
        }
        Some(Self { m })
    }
}

impl Default for Affine2 {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 配准结果: 仿射矩阵及产生它的配准方法.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// 测试坐标到模板坐标的映射.
    pub affine: Affine2,

    /// 配准方法.
    pub method: AlignMethod,
}

impl Transform {
    /// 直接初始化.
    #[inline]
    pub const fn new(affine: Affine2, method: AlignMethod) -> Self {
        Self { affine, method }
    }
}

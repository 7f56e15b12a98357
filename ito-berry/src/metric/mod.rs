//! 相似度评分.
//!
//! 每个评分器都是纯函数 `(模板区域, 测试区域) -> 评分`, 输入为已经对齐,
//! 已经裁剪到相同形状的 `(行, 列, 光谱)` 立方体. 所有评分都包含一个 `score` 标量
//! (完全一致时为 1), 以及各自的诊断字段.
//!
//! [`Score`] 以 `kind` 字段为标签序列化为 JSON. 非有限浮点数写作 `null`,
//! 读回时还原为 `NaN`.

use ndarray::ArrayView3;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::Idx3d;

mod axial;
mod combined;
mod lateral;
mod reflectance;
mod rmse;
mod ssim;

pub use axial::AxialXCorrScore;
pub use combined::{CombinedScore, FeatureRow};
pub use lateral::LateralXCorrScore;
pub use reflectance::ReflectanceScore;
pub use rmse::RmseScore;
pub use ssim::SSimScore;

/// 评分运行时错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// 结果中出现 NaN (或输入退化), 参数为评分器名.
    #[error("NaN value found in {0}")]
    Defect(&'static str),

    /// 模板与测试区域形状不一致.
    #[error("shape mismatch: template {template:?}, test {test:?}")]
    ShapeMismatch {
        /// 模板形状.
        template: Idx3d,
        /// 测试形状.
        test: Idx3d,
    },

    /// 区域过小, 不足以计算该评分.
    #[error("region {shape:?} is too small for {metric} (need {min} along every axis)")]
    RegionTooSmall {
        /// 评分器名.
        metric: &'static str,
        /// 区域形状.
        shape: Idx3d,
        /// 每个轴所需的最小长度.
        min: usize,
    },

    /// 空输入.
    #[error("empty region")]
    Empty,
}

/// 评分结果.
pub type MetricResult<T> = Result<T, MetricError>;

/// 检查两个区域形状一致且非空.
pub(crate) fn check_pair(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<()> {
    if template.dim() != test.dim() {
        return Err(MetricError::ShapeMismatch {
            template: template.dim(),
            test: test.dim(),
        });
    }
    if template.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(())
}

/// 将 `null` 读作 `NaN`.
pub(crate) fn nullable_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
}

/// 所有评分类型的封闭集合.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Score {
    /// 横向 (空间) 互相关.
    Lateral(LateralXCorrScore),

    /// 轴向 (光谱) 互相关.
    Axial(AxialXCorrScore),

    /// 结构相似度.
    SSim(SSimScore),

    /// 归一化均方根误差.
    Rmse(RmseScore),

    /// 平均反射率比.
    Reflectance(ReflectanceScore),

    /// 组合评分.
    Combined(CombinedScore),
}

impl Score {
    /// 标量评分.
    pub fn score(&self) -> f64 {
        match self {
            Self::Lateral(s) => s.score,
            Self::Axial(s) => s.score,
            Self::SSim(s) => s.score,
            Self::Rmse(s) => s.score,
            Self::Reflectance(s) => s.score,
            Self::Combined(s) => s.score,
        }
    }

    /// 若为组合评分, 返回其引用.
    #[inline]
    pub fn as_combined(&self) -> Option<&CombinedScore> {
        match self {
            Self::Combined(s) => Some(s),
            _ => None,
        }
    }

    /// 序列化为 JSON 字符串.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 从 JSON 字符串还原.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

macro_rules! impl_from_score {
    ($($variant: ident => $ty: ty),* $(,)?) => {
        $(
            impl From<$ty> for Score {
                #[inline]
                fn from(s: $ty) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

impl_from_score!(
    Lateral => LateralXCorrScore,
    Axial => AxialXCorrScore,
    SSim => SSimScore,
    Rmse => RmseScore,
    Reflectance => ReflectanceScore,
    Combined => CombinedScore,
);

#[cfg(test)]
mod tests {
    use super::{check_pair, MetricError, ReflectanceScore, RmseScore, Score};
    use ndarray::Array3;

    #[test]
    fn test_json_is_tagged() {
        let s = Score::from(ReflectanceScore {
            score: 0.75,
            reflectance_ratio: 1.25,
        });
        let js = s.to_json().unwrap();
        assert!(js.contains("\"kind\":\"Reflectance\""));
        assert!(js.contains("\"reflectanceRatio\":1.25"));
        assert_eq!(Score::from_json(&js).unwrap(), s);
    }

    #[test]
    fn test_json_nan_becomes_null() {
        let s = Score::from(RmseScore { score: f64::NAN });
        let js = s.to_json().unwrap();
        assert!(js.contains("null"));
        assert!(Score::from_json(&js).unwrap().score().is_nan());
    }

    #[test]
    fn test_check_pair() {
        let a = Array3::<f32>::zeros((2, 3, 4));
        let b = Array3::<f32>::zeros((2, 3, 5));
        assert!(matches!(
            check_pair(a.view(), b.view()),
            Err(MetricError::ShapeMismatch { .. })
        ));
        let e = Array3::<f32>::zeros((0, 3, 4));
        assert_eq!(check_pair(e.view(), e.view()), Err(MetricError::Empty));
        assert!(check_pair(a.view(), a.view()).is_ok());
    }
}

//! 配准与评分流程.
//!
//! 1. [`Registrar`]: 对每个测量复用或计算形变结果并持久化;
//! 2. [`Scorer`]: 对每个已有形变结果的测量计算组合评分并追加到评分表;
//! 3. [`Analyzer`]: 依次执行上述两步.

use thiserror::Error;

use crate::config::{RegistrationConfig, ScoringConfig};
use crate::consts::DEFAULT_SCORE_NAME;
use crate::measurement::{AnalysisError, MeasurementLoader};
use crate::metric::MetricError;
use crate::transform::CoercionError;
use crate::warp::WarpError;

mod register;
mod score;
mod table;

pub use register::{RegistrationReport, Registrar};
pub use score::{Scorer, ScoringReport};
pub use table::{ScoreRow, ScoreTable};

/// 单个测量处理失败的原因. 只中止该测量.
#[derive(Debug, Error)]
pub enum ItemError {
    /// 读取或写入测量数据失败.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// 评分失败.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// 形变失败.
    #[error(transparent)]
    Warp(#[from] WarpError),

    /// 变换无法约束为纯平移.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// 与模板没有共同的有效区域.
    #[error("no valid region shared with the template")]
    NoValidRegion,
}

/// 先配准后评分, 评分名为 `"score"`.
pub struct Analyzer {
    registrar: Registrar,
    scorer: Scorer,
}

impl Analyzer {
    /// 初始化. 评分名会被替换为默认评分名.
    pub fn new(registration: RegistrationConfig, scoring: ScoringConfig) -> Self {
        let scoring = ScoringConfig {
            score_name: DEFAULT_SCORE_NAME.to_string(),
            ..scoring
        };
        Self {
            registrar: Registrar::new(registration),
            scorer: Scorer::new(scoring),
        }
    }

    /// 评分阶段配置.
    #[inline]
    pub fn scoring_config(&self) -> &ScoringConfig {
        self.scorer.config()
    }

    /// 运行完整流程.
    ///
    /// 只有模板本身的分析结果不可用时才返回错误.
    pub fn run<L: MeasurementLoader>(
        &self,
        loader: &L,
    ) -> Result<(RegistrationReport, ScoringReport), AnalysisError> {
        let registered = self.registrar.run(loader)?;
        let scored = self.scorer.run(loader)?;
        Ok((registered, scored))
    }
}

/// 默认不做横向模糊. 需要模糊时用 [`Analyzer::new`] 显式传入
/// [`ScoringConfig::blur_sigma`].
impl Default for Analyzer {
    #[inline]
    fn default() -> Self {
        Self::new(
            RegistrationConfig::default(),
            ScoringConfig::default().blur_sigma(None),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Analyzer;
    use crate::config::ScoringConfig;
    use crate::consts::DEFAULT_SCORE_NAME;

    #[test]
    fn test_default_analyzer_does_not_blur() {
        let a = Analyzer::default();
        assert_eq!(a.scoring_config().blur_sigma, None);
        assert_eq!(a.scoring_config().score_name, DEFAULT_SCORE_NAME);

        let b = Analyzer::new(Default::default(), ScoringConfig::named("x").blur_sigma(Some(1.0)));
        assert_eq!(b.scoring_config().blur_sigma, Some(1.0));
        assert_eq!(b.scoring_config().score_name, DEFAULT_SCORE_NAME);
    }
}

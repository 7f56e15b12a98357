use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::{check_pair, nullable_f64, MetricError, MetricResult};
use crate::consts::LATERAL_CDR_INTERVAL;
use crate::signal::{argmax_2d, decay_rate_2d, normalized_xcorr_2d};

/// 横向 (空间) 互相关评分.
///
/// 只使用立方体中间的光谱平面. 互相关在零偏移处的索引为 `(H - 1, W - 1)`,
/// `shift` 为峰值索引减去零偏移索引. 若测试图像内容相对模板平移了 `(dy, dx)`,
/// 则 `shift` 为 `(-dy, -dx)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LateralXCorrScore {
    /// 互相关峰值.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,

    /// 峰值偏移 `[行, 列]`.
    pub shift: [i64; 2],

    /// 行方向的相关衰减率.
    #[serde(rename = "cdrY", deserialize_with = "nullable_f64")]
    pub cdr_y: f64,

    /// 列方向的相关衰减率.
    #[serde(rename = "cdrX", deserialize_with = "nullable_f64")]
    pub cdr_x: f64,
}

impl LateralXCorrScore {
    const NAME: &'static str = "LateralXCorrScore";

    /// 计算评分.
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        check_pair(template, test)?;
        let (h, w, d) = template.dim();
        let mid = d / 2;
        let corr = normalized_xcorr_2d(
            template.index_axis(Axis(2), mid),
            test.index_axis(Axis(2), mid),
        )
        .ok_or(MetricError::Defect(Self::NAME))?;

        let peak = argmax_2d(corr.view()).ok_or(MetricError::Empty)?;
        let score = corr[peak];
        if !score.is_finite() {
            return Err(MetricError::Defect(Self::NAME));
        }
        let (cdr_y, cdr_x) = decay_rate_2d(corr.view(), peak, LATERAL_CDR_INTERVAL);
        Ok(Self {
            score,
            shift: [
                peak.0 as i64 - (h as i64 - 1),
                peak.1 as i64 - (w as i64 - 1),
            ],
            cdr_y,
            cdr_x,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::LateralXCorrScore;
    use crate::metric::MetricError;
    use crate::test_utils::{float_eq, textured_cube};
    use ndarray::{s, Array3};

    #[test]
    fn test_identical_is_one() {
        let cube = textured_cube((32, 40, 5), 7);
        let s = LateralXCorrScore::create(cube.view(), cube.view()).unwrap();
        assert!(float_eq(s.score, 1.0, 1e-6), "{}", s.score);
        assert_eq!(s.shift, [0, 0]);
        assert!(s.cdr_y > 0.0 && s.cdr_x > 0.0);
    }

    #[test]
    fn test_integer_translation() {
        let big = textured_cube((48, 48, 3), 11);
        let template = big.slice(s![4..36, 4..36, ..]);
        // 测试内容相对模板向下 3 行, 向左 2 列.
        let test = big.slice(s![1..33, 6..38, ..]);
        let s = LateralXCorrScore::create(template, test).unwrap();
        assert_eq!(s.shift, [-3, 2]);
        assert!(s.score > 0.5);
    }

    #[test]
    fn test_constant_is_defect() {
        let flat = Array3::<f32>::ones((8, 8, 3));
        let cube = textured_cube((8, 8, 3), 1);
        assert_eq!(
            LateralXCorrScore::create(flat.view(), cube.view()),
            Err(MetricError::Defect("LateralXCorrScore"))
        );
    }
}

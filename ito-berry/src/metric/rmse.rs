use ndarray::{ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use super::{check_pair, nullable_f64, MetricError, MetricResult};

/// 归一化均方根误差评分, `score = 1 - nrmse`.
///
/// `nrmse = sqrt(mean((t - s)^2)) / sqrt(mean(t^2))`, 以模板 `t` 的欧氏范数归一化.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RmseScore {
    /// `1 - nrmse`.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,
}

impl RmseScore {
    const NAME: &'static str = "RmseScore";

    /// 计算评分.
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        check_pair(template, test)?;
        let (mut err, mut norm) = (0.0, 0.0);
        Zip::from(&template).and(&test).for_each(|&t, &s| {
            let (t, s) = (t as f64, s as f64);
            err += (t - s) * (t - s);
            norm += t * t;
        });
        // 两者同除以体素个数, 比值不变.
        let nrmse = (err / norm).sqrt();
        if nrmse.is_nan() {
            return Err(MetricError::Defect(Self::NAME));
        }
        Ok(Self { score: 1.0 - nrmse })
    }
}

#[cfg(test)]
mod tests {
    use super::RmseScore;
    use crate::metric::MetricError;
    use ndarray::Array3;

    #[test]
    fn test_identical_and_half() {
        let t = Array3::from_shape_fn((3, 4, 5), |(a, b, c)| (a + b + c) as f32 + 1.0);
        assert_eq!(RmseScore::create(t.view(), t.view()).unwrap().score, 1.0);
        let half = t.mapv(|v| v * 0.5);
        let s = RmseScore::create(t.view(), half.view()).unwrap();
        assert!((s.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_nan_is_defect() {
        let t = Array3::<f32>::ones((2, 2, 2));
        let mut s = t.clone();
        s[(0, 0, 0)] = f32::NAN;
        assert_eq!(
            RmseScore::create(t.view(), s.view()),
            Err(MetricError::Defect("RmseScore"))
        );
    }
}

use ndarray::{ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use super::{check_pair, nullable_f64, MetricResult};

/// 平均反射率比评分.
///
/// `ratio = mean(test / template)`, `score = 1 - |1 - ratio|`.
/// 比值不做有限性检查, 模板中的零值会使结果变为无穷.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReflectanceScore {
    /// `1 - |1 - ratio|`.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,

    /// 平均反射率比.
    #[serde(rename = "reflectanceRatio", deserialize_with = "nullable_f64")]
    pub reflectance_ratio: f64,
}

impl ReflectanceScore {
    /// 计算评分.
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        check_pair(template, test)?;
        let mut sum = 0.0;
        Zip::from(&template)
            .and(&test)
            .for_each(|&t, &s| sum += s as f64 / t as f64);
        let ratio = sum / template.len() as f64;
        Ok(Self {
            score: 1.0 - (1.0 - ratio).abs(),
            reflectance_ratio: ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ReflectanceScore;
    use ndarray::Array3;

    #[test]
    fn test_ratio() {
        let t = Array3::from_elem((3, 3, 3), 2.0f32);
        let s = t.mapv(|v| v * 1.2);
        let r = ReflectanceScore::create(t.view(), s.view()).unwrap();
        assert!((r.reflectance_ratio - 1.2).abs() < 1e-6);
        assert!((r.score - 0.8).abs() < 1e-6);
        let r = ReflectanceScore::create(t.view(), t.view()).unwrap();
        assert_eq!((r.score, r.reflectance_ratio), (1.0, 1.0));
    }
}

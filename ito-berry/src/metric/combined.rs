use std::time::Instant;

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use super::{
    nullable_f64, AxialXCorrScore, LateralXCorrScore, MetricResult, ReflectanceScore, RmseScore,
    SSimScore,
};

/// 五项评分的组合, `score` 为五项子评分的算术平均.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedScore {
    /// 子评分的平均值.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,

    /// 归一化均方根误差.
    pub nrmse: RmseScore,

    /// 横向互相关.
    pub latxcorr: LateralXCorrScore,

    /// 结构相似度.
    pub ssim: SSimScore,

    /// 轴向互相关.
    pub axxcorr: AxialXCorrScore,

    /// 平均反射率比.
    pub reflectance: ReflectanceScore,
}

/// 运行评分器并在 `debug` 级别记录耗时.
fn timed<T>(name: &str, f: impl FnOnce() -> MetricResult<T>) -> MetricResult<T> {
    let start = Instant::now();
    let out = f();
    log::debug!("{name} took {:.3?}", start.elapsed());
    out
}

impl CombinedScore {
    /// 依次计算 nrmse, ssim, latxcorr, axxcorr, reflectance 五项评分.
    ///
    /// 任一评分器失败则整体失败.
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        let nrmse = timed("nrmse", || RmseScore::create(template, test))?;
        let ssim = timed("ssim", || SSimScore::create(template, test))?;
        let latxcorr = timed("latxcorr", || LateralXCorrScore::create(template, test))?;
        let axxcorr = timed("axxcorr", || AxialXCorrScore::create(template, test))?;
        let reflectance = timed("reflectance", || ReflectanceScore::create(template, test))?;
        Ok(Self::from_parts(nrmse, latxcorr, ssim, axxcorr, reflectance))
    }

    /// 由已有子评分组合, 并计算平均值.
    pub fn from_parts(
        nrmse: RmseScore,
        latxcorr: LateralXCorrScore,
        ssim: SSimScore,
        axxcorr: AxialXCorrScore,
        reflectance: ReflectanceScore,
    ) -> Self {
        let score = (nrmse.score + latxcorr.score + ssim.score + axxcorr.score + reflectance.score)
            / 5.0;
        Self {
            score,
            nrmse,
            latxcorr,
            ssim,
            axxcorr,
            reflectance,
        }
    }

    /// 五项子评分 `(名称, 评分)`, 顺序与计算顺序一致.
    pub fn sub_scores(&self) -> [(&'static str, f64); 5] {
        [
            ("nrmse", self.nrmse.score),
            ("ssim", self.ssim.score),
            ("latxcorr", self.latxcorr.score),
            ("axxcorr", self.axxcorr.score),
            ("reflectance", self.reflectance.score),
        ]
    }

    /// 展平为报表使用的特征行.
    pub fn features(&self) -> FeatureRow {
        let lat = &self.latxcorr;
        FeatureRow {
            lat_xcorr: lat.score,
            lat_xcorr_cdr: ((lat.cdr_y.powi(2) + lat.cdr_x.powi(2)) / 2.0).sqrt(),
            lat_xcorr_cdr_eccent: lat.cdr_y / lat.cdr_x,
            ax_xcorr: self.axxcorr.score,
            ax_xcorr_cdr: self.axxcorr.cdr,
            ax_xcorr_shift: self.axxcorr.shift,
            nrmse: self.nrmse.score,
            ssim: self.ssim.score,
            reflectance: self.reflectance.reflectance_ratio,
        }
    }
}

/// 组合评分的扁平数值视图.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRow {
    /// 横向互相关峰值.
    #[serde(rename = "latXCorr")]
    pub lat_xcorr: f64,

    /// 横向相关衰减率的均方根.
    #[serde(rename = "latXCorr_cdr")]
    pub lat_xcorr_cdr: f64,

    /// 横向相关衰减率的偏心率 `cdrY / cdrX`.
    #[serde(rename = "latXCorr_cdr_eccent")]
    pub lat_xcorr_cdr_eccent: f64,

    /// 轴向互相关峰值.
    #[serde(rename = "axXCorr")]
    pub ax_xcorr: f64,

    /// 轴向相关衰减率.
    #[serde(rename = "axXCorr_cdr")]
    pub ax_xcorr_cdr: f64,

    /// 光谱偏移.
    #[serde(rename = "axXCorr_shift")]
    pub ax_xcorr_shift: f64,

    /// `1 - nrmse`.
    pub nrmse: f64,

    /// 结构相似度.
    pub ssim: f64,

    /// 原始平均反射率比.
    pub reflectance: f64,
}

impl FeatureRow {
    /// 列名, 与 [`FeatureRow::values`] 一一对应.
    pub const COLUMNS: [&'static str; 9] = [
        "latXCorr",
        "latXCorr_cdr",
        "latXCorr_cdr_eccent",
        "axXCorr",
        "axXCorr_cdr",
        "axXCorr_shift",
        "nrmse",
        "ssim",
        "reflectance",
    ];

    /// 各列的值.
    pub fn values(&self) -> [f64; 9] {
        [
            self.lat_xcorr,
            self.lat_xcorr_cdr,
            self.lat_xcorr_cdr_eccent,
            self.ax_xcorr,
            self.ax_xcorr_cdr,
            self.ax_xcorr_shift,
            self.nrmse,
            self.ssim,
            self.reflectance,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::CombinedScore;
    use crate::metric::Score;
    use crate::test_utils::{float_eq, textured_cube};

    #[test]
    fn test_identical_cubes() {
        let cube = textured_cube((50, 50, 20), 42);
        let c = CombinedScore::create(cube.view(), cube.view()).unwrap();
        assert!(float_eq(c.score, 1.0, 1e-5), "{}", c.score);
        for (name, s) in c.sub_scores() {
            assert!(float_eq(s, 1.0, 1e-5), "{name}: {s}");
        }
        assert_eq!(c.latxcorr.shift, [0, 0]);
        assert_eq!(c.axxcorr.shift, 0.0);
    }

    #[test]
    fn test_half_reflectance() {
        let cube = textured_cube((50, 50, 20), 42);
        let half = cube.mapv(|v| v * 0.5);
        let c = CombinedScore::create(cube.view(), half.view()).unwrap();
        assert!(float_eq(c.reflectance.reflectance_ratio, 0.5, 1e-5));
        assert!(float_eq(c.reflectance.score, 0.5, 1e-5));
        // 互相关对整体缩放不敏感.
        assert!(float_eq(c.latxcorr.score, 1.0, 1e-5));
        assert!(float_eq(c.axxcorr.score, 1.0, 1e-5));
    }

    #[test]
    fn test_score_is_unweighted_mean() {
        let a = textured_cube((12, 12, 12), 1);
        let b = textured_cube((12, 12, 12), 2).mapv(|v| 0.3 * v) + &a;
        let c = CombinedScore::create(a.view(), b.view()).unwrap();
        let mean = c.sub_scores().iter().map(|(_, s)| s).sum::<f64>() / 5.0;
        assert!(float_eq(c.score, mean, 1e-12));
    }

    #[test]
    fn test_json_round_trip_and_features() {
        let cube = textured_cube((12, 12, 12), 8);
        let c = CombinedScore::create(cube.view(), cube.view()).unwrap();
        let js = Score::from(c.clone()).to_json().unwrap();
        let back = Score::from_json(&js).unwrap();
        assert_eq!(back.as_combined(), Some(&c));
        let f = c.features();
        assert!(float_eq(f.reflectance, 1.0, 1e-9));
        assert!(float_eq(f.lat_xcorr_cdr_eccent, c.latxcorr.cdr_y / c.latxcorr.cdr_x, 1e-12));
    }
}

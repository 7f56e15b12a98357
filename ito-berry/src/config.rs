//! 配准与评分的配置.

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::align::AlignMethod;
use crate::consts::{ANALYSIS_NAME, DEFAULT_BLUR_SIGMA, DEFAULT_SCORE_NAME, DEFAULT_WORKERS, XCORR_MIN_PEAK};

/// 指定校准数据根目录的环境变量.
pub const CALIBRATION_DIR_ENV: &str = "ITO_CALIBRATION_DIR";

/// 获取校准数据根目录.
///
/// 1. 若环境变量 `$ITO_CALIBRATION_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/ITOCalibration`;
/// 3. 无法确定用户主目录时返回 `None`.
pub fn calibration_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(CALIBRATION_DIR_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_calibration_dir_with::<&str, _>([]),
    }
}

/// 返回 `$HOME/ITOCalibration` 下由 `it` 逐级拼接的路径.
pub fn home_calibration_dir_with<P: AsRef<std::path::Path>, I: IntoIterator<Item = P>>(
    it: I,
) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push(ANALYSIS_NAME);
    ans.extend(it);
    Some(ans)
}

/// 配准阶段配置.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// 是否复用已缓存的形变结果.
    pub use_cached: bool,

    /// 配准方法.
    pub method: AlignMethod,

    /// 调试图像输出目录.
    pub debug_dir: Option<PathBuf>,

    /// 是否把仿射变换约束为纯平移.
    pub coerce_to_translation: bool,

    /// 互相关配准可接受的最小峰值.
    pub xcorr_min_peak: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            use_cached: true,
            method: AlignMethod::default(),
            debug_dir: None,
            coerce_to_translation: false,
            xcorr_min_peak: XCORR_MIN_PEAK,
        }
    }
}

impl RegistrationConfig {
    /// 设置是否复用缓存.
    #[inline]
    pub fn use_cached(mut self, yes: bool) -> Self {
        self.use_cached = yes;
        self
    }

    /// 设置配准方法.
    #[inline]
    pub fn method(mut self, method: AlignMethod) -> Self {
        self.method = method;
        self
    }

    /// 设置调试图像目录.
    #[inline]
    pub fn debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// 设置是否约束为纯平移.
    #[inline]
    pub fn coerce_to_translation(mut self, yes: bool) -> Self {
        self.coerce_to_translation = yes;
        self
    }

    /// 设置互相关最小峰值.
    #[inline]
    pub fn xcorr_min_peak(mut self, peak: f64) -> Self {
        self.xcorr_min_peak = peak;
        self
    }
}

/// 评分阶段配置.
#[derive(Clone, Debug)]
pub struct ScoringConfig {
    /// 评分名.
    pub score_name: String,

    /// 横向高斯模糊标准差, `None` 表示不模糊.
    pub blur_sigma: Option<f64>,

    /// 是否并行评分.
    pub parallel: bool,

    /// 并行 worker 个数.
    pub workers: NonZeroUsize,

    /// 同名评分已存在时是否覆盖.
    pub overwrite: bool,

    /// 调试图像输出目录. 设置后强制顺序评分.
    pub debug_dir: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_name: DEFAULT_SCORE_NAME.to_string(),
            blur_sigma: Some(DEFAULT_BLUR_SIGMA),
            parallel: false,
            workers: NonZeroUsize::new(DEFAULT_WORKERS).unwrap_or(NonZeroUsize::MIN),
            overwrite: true,
            debug_dir: None,
        }
    }
}

impl ScoringConfig {
    /// 使用评分名 `name`, 其余为默认值.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            score_name: name.into(),
            ..Self::default()
        }
    }

    /// 设置模糊标准差.
    #[inline]
    pub fn blur_sigma(mut self, sigma: Option<f64>) -> Self {
        self.blur_sigma = sigma;
        self
    }

    /// 设置是否并行.
    #[inline]
    pub fn parallel(mut self, yes: bool) -> Self {
        self.parallel = yes;
        self
    }

    /// 设置 worker 个数.
    #[inline]
    pub fn workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    /// 设置是否覆盖.
    #[inline]
    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    /// 设置调试图像目录.
    #[inline]
    pub fn debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// 实际使用的 worker 个数. 未开启并行或需要调试输出时为 1.
    pub fn effective_workers(&self) -> usize {
        if self.parallel && self.debug_dir.is_none() {
            self.workers.get()
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistrationConfig, ScoringConfig};
    use crate::align::AlignMethod;
    use std::num::NonZeroUsize;

    #[test]
    fn test_defaults() {
        let r = RegistrationConfig::default();
        assert!(r.use_cached && !r.coerce_to_translation);
        assert_eq!(r.method, AlignMethod::Xcorr);

        let s = ScoringConfig::default();
        assert_eq!(s.score_name, "score");
        assert_eq!(s.blur_sigma, Some(2.0));
        assert_eq!(s.workers.get(), 4);
        assert!(s.overwrite);
    }

    #[test]
    fn test_debug_forces_sequential() {
        let s = ScoringConfig::named("x")
            .parallel(true)
            .workers(NonZeroUsize::new(3).unwrap());
        assert_eq!(s.effective_workers(), 3);
        assert_eq!(s.debug_dir(Some("/tmp".into())).effective_workers(), 1);
        assert_eq!(ScoringConfig::default().effective_workers(), 1);
    }
}

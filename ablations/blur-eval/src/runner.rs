//! 程序运行函数.

use crate::profile::Profile;
use crate::result::BlurEvalResult;
use ito_berry::config::{RegistrationConfig, ScoringConfig};
use ito_berry::measurement::{Measurement, MeasurementLoader};
use ito_berry::pipeline::{Registrar, Scorer};
use std::env;
use std::num::NonZeroUsize;
use utils::{loader, synthetic::SyntheticSeries};

/// 参与评估的横向模糊标准差.
const SIGMAS: [Option<f64>; 4] = [None, Some(1.0), Some(2.0), Some(4.0)];

/// 实际运行.
///
/// 设置了 `$ITO_REFERENCE` 且校准数据根目录存在时使用真实数据, 否则使用合成序列.
pub fn run() -> BlurEvalResult {
    if let Ok(reference) = env::var("ITO_REFERENCE") {
        if let Some(res) = loader::dir_loader_from_env_or_home(&reference) {
            let loader = res.expect("Loading calibration directory error");
            return evaluate("calibration directory", &loader);
        }
    }
    let loader = SyntheticSeries::default().loader();
    evaluate("synthetic series", &loader)
}

/// 先配准一次, 然后对每个模糊参数清空评分并重新评分.
pub fn evaluate<L: MeasurementLoader>(source: &str, loader: &L) -> BlurEvalResult {
    let report = Registrar::new(RegistrationConfig::default())
        .run(loader)
        .expect("Template analysis results unavailable");
    println!(
        "Registered {} measurements ({} skipped, {} failed)",
        report.registered(),
        report.skipped.len(),
        report.failed.len()
    );

    let workers = NonZeroUsize::new(utils::cpus()).unwrap_or(NonZeroUsize::MIN);
    let tag = loader.template().id_tag();
    let profiles = SIGMAS
        .into_iter()
        .map(|sigma| {
            for m in loader.measurements() {
                if let Err(e) = m.clear_scores(tag) {
                    if !e.is_not_found() {
                        log::warn!("{}: cannot clear scores: {e}", m.name());
                    }
                }
            }
            let mut profile = Profile::new(sigma);
            let config = ScoringConfig::named("blurEval")
                .blur_sigma(sigma)
                .parallel(true)
                .workers(workers);
            let scored = Scorer::new(config)
                .run(loader)
                .expect("Template analysis results unavailable");
            profile.record(&scored);
            profile.finish()
        })
        .collect();
    BlurEvalResult::new(source, profiles)
}

use std::sync::Arc;

use super::ItemError;
use crate::align::AlignmentEngine;
use crate::config::RegistrationConfig;
use crate::data::{AnalysisResults, IdTag};
use crate::debug::DebugSink;
use crate::measurement::{AnalysisError, Measurement, MeasurementLoader};
use crate::store::TransformedData;
use crate::transform::{Affine2, Transform};
use crate::warp::{warp_plane, VolumeWarper};

/// 配准阶段报告.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// 复用了缓存形变结果的测量.
    pub reused: Vec<IdTag>,

    /// 新计算并保存了形变结果的测量.
    pub computed: Vec<IdTag>,

    /// 配准失败 (没有可信的变换) 的测量.
    pub skipped: Vec<IdTag>,

    /// 因其他错误中止的测量.
    pub failed: Vec<(IdTag, ItemError)>,
}

impl RegistrationReport {
    /// 当前拥有形变结果的测量个数.
    #[inline]
    pub fn registered(&self) -> usize {
        self.reused.len() + self.computed.len()
    }
}

/// 配准器.
pub struct Registrar {
    config: RegistrationConfig,
    engine: AlignmentEngine,
    debug: Option<DebugSink>,
}

fn open_debug(dir: Option<&std::path::Path>) -> Option<DebugSink> {
    let dir = dir?;
    match DebugSink::new(dir) {
        Ok(sink) => Some(sink),
        Err(e) => {
            log::warn!("debug output disabled, cannot create {}: {e}", dir.display());
            None
        }
    }
}

impl Registrar {
    /// 按配置创建配准引擎.
    pub fn new(config: RegistrationConfig) -> Self {
        let engine = AlignmentEngine::with_min_peak(config.method, config.xcorr_min_peak);
        Self::with_engine(config, engine)
    }

    /// 使用给定的配准引擎. `config.method` 与 `config.xcorr_min_peak` 被忽略.
    pub fn with_engine(config: RegistrationConfig, engine: AlignmentEngine) -> Self {
        let debug = open_debug(config.debug_dir.as_deref());
        Self {
            engine: engine.with_debug(debug.clone()),
            config,
            debug,
        }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// 对加载器中的所有测量执行配准.
    ///
    /// 1. 开启缓存时, 已有当前模板形变结果的测量直接复用;
    /// 2. 其余测量一次性交给配准引擎;
    /// 3. 得到的变换 (按需约束为纯平移后) 用于形变, 并以覆盖方式保存.
    ///
    /// 只有模板的分析结果不可用时才返回错误.
    pub fn run<L: MeasurementLoader>(&self, loader: &L) -> Result<RegistrationReport, AnalysisError> {
        let template = loader.template();
        let template_tag = template.id_tag();
        let template_results = template.analysis_results()?;
        if let Some(sink) = &self.debug {
            let mean = template_results.mean_reflectance().mapv(f64::from);
            sink.save_gray("template_mean", mean.view());
        }

        let mut report = RegistrationReport::default();
        let mut pending: Vec<(&L::Item, Arc<AnalysisResults>)> = Vec::new();
        for m in loader.measurements() {
            if self.config.use_cached && m.store().contains(template_tag) {
                log::debug!("{}: reusing transform for `{template_tag}`", m.name());
                report.reused.push(m.id_tag().clone());
                continue;
            }
            match m.analysis_results() {
                Ok(res) => pending.push((m, res)),
                Err(e) => {
                    log::warn!("{}: cannot load analysis results: {e}", m.name());
                    report.failed.push((m.id_tag().clone(), e.into()));
                }
            }
        }
        if pending.is_empty() {
            return Ok(report);
        }

        log::info!(
            "aligning {} measurements with {}",
            pending.len(),
            self.engine.method()
        );
        let transforms = self.engine.match_all(
            &template_results,
            pending.iter().map(|(m, res)| (m.name(), res.as_ref())),
        );

        let warper = VolumeWarper::new(template_results.shape());
        for ((m, res), transform) in pending.into_iter().zip(transforms) {
            let tag = m.id_tag().clone();
            let outcome = match transform {
                None => {
                    report.skipped.push(tag);
                    m.release_analysis();
                    continue;
                }
                Some(t) => self.warp_and_save(&warper, m, &res, t, template_tag),
            };
            drop(res);
            m.release_analysis();
            match outcome {
                Ok(()) => report.computed.push(tag),
                Err(e) => {
                    log::warn!("{}: registration aborted: {e}", m.name());
                    report.failed.push((tag, e));
                }
            }
        }
        log::info!(
            "registration: {} reused, {} computed, {} skipped, {} failed",
            report.reused.len(),
            report.computed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn warp_and_save<M: Measurement>(
        &self,
        warper: &VolumeWarper,
        m: &M,
        res: &AnalysisResults,
        transform: Transform,
        template_tag: &IdTag,
    ) -> Result<(), ItemError> {
        let transform = if self.config.coerce_to_translation {
            let affine: Affine2 = transform.affine.coerce_to_translation()?;
            Transform::new(affine, transform.method)
        } else {
            transform
        };

        let warped = warper.warp(&transform.affine, res)?;
        if let Some(sink) = &self.debug {
            let sink = sink.scoped(m.name());
            if let Some(plane) = warp_plane(&transform.affine, res.mean_reflectance(), warped.mask.dim()) {
                sink.save_gray("warped_mean", plane.mapv(f64::from).view());
            }
            sink.save_mask("mask", warped.mask.view());
        }

        let data = TransformedData::new(template_tag.clone(), transform, warped);
        m.save_transformed_data(&data, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Registrar;
    use crate::config::RegistrationConfig;
    use crate::measurement::{MemMeasurement, Measurement, MeasurementLoader, VecLoader};
    use crate::test_utils::{analysis_from_image, smooth_image};
    use ndarray::{s, Array2};

    fn loader() -> VecLoader<MemMeasurement> {
        let big = smooth_image((70, 70), 17, 1.5);
        let crop = |r: usize, c: usize| big.slice(s![r..r + 50, c..c + 50]).to_owned();
        let template = MemMeasurement::new("template", "t", analysis_from_image(&crop(10, 10), 6, "r"));
        let moved = MemMeasurement::new("moved", "a", analysis_from_image(&crop(13, 8), 6, "r"));
        let flat = MemMeasurement::new("flat", "b", analysis_from_image(&Array2::ones((50, 50)), 6, "r"));
        VecLoader::new(template, vec![moved, flat])
    }

    #[test]
    fn test_registration_caches_and_skips() {
        let loader = loader();
        let reg = Registrar::new(RegistrationConfig::default());
        let report = reg.run(&loader).unwrap();
        assert_eq!(report.computed.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());

        let [moved, flat] = [&loader.measurements()[0], &loader.measurements()[1]];
        let tag = loader.template().id_tag();
        let data = moved.load_transformed_data(tag).unwrap();
        let (tx, ty) = data.transform.affine.translation();
        assert!((tx + 2.0).abs() < 0.2 && (ty - 3.0).abs() < 0.2, "{tx} {ty}");
        assert!(data.mask.iter().any(|&m| m));
        assert!(flat.load_transformed_data(tag).unwrap_err().is_not_found());

        let again = reg.run(&loader).unwrap();
        assert_eq!(again.reused, vec![moved.id_tag().clone()]);
        assert!(again.computed.is_empty());
    }

    #[test]
    fn test_coercion_keeps_translation() {
        let loader = loader();
        let reg = Registrar::new(RegistrationConfig::default().coerce_to_translation(true));
        let report = reg.run(&loader).unwrap();
        assert_eq!(report.computed.len(), 1);
        let data = loader.measurements()[0]
            .load_transformed_data(loader.template().id_tag())
            .unwrap();
        let m = data.transform.affine.matrix();
        assert_eq!((m[0][0], m[0][1], m[1][0], m[1][1]), (1.0, 0.0, 0.0, 1.0));
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;

use ndarray::{ArrayView3, Axis};

use super::table::ScoreTable;
use super::ItemError;
use crate::config::ScoringConfig;
use crate::data::IdTag;
use crate::debug::DebugSink;
use crate::measurement::{AnalysisError, Measurement, MeasurementLoader};
use crate::metric::{CombinedScore, MetricError, Score};
use crate::signal::blur_lateral;

/// 评分阶段报告.
#[derive(Debug, Default)]
pub struct ScoringReport {
    /// 成功评分的测量, 按加载器顺序.
    pub table: ScoreTable,

    /// 没有形变结果, 因而未评分的测量.
    pub unscored: Vec<IdTag>,

    /// 评分中止的测量.
    pub failed: Vec<(IdTag, ItemError)>,
}

/// 单个测量的评分结果.
type Outcome = Result<Option<CombinedScore>, ItemError>;

/// 每个 worker 共享的只读上下文.
///
/// 模板立方体只分配一次, 所有 worker 通过视图读取; 唯一的可变共享状态是
/// 评分写入, 由 `append_lock` 保护.
struct WorkerContext<'a> {
    template: ArrayView3<'a, f32>,
    template_tag: &'a IdTag,
    config: &'a ScoringConfig,
    append_lock: &'a Mutex<()>,
    debug: Option<&'a DebugSink>,
}

impl WorkerContext<'_> {
    /// 读取形变结果, 裁剪到共同有效区域, 模糊后评分并写入评分表.
    ///
    /// 没有形变结果时返回 `Ok(None)`.
    fn score_one<M: Measurement>(&self, m: &M) -> Outcome {
        let data = match m.load_transformed_data(self.template_tag) {
            Ok(d) => d,
            Err(e) if e.is_not_found() => {
                log::debug!("{}: no transformed data for `{}`", m.name(), self.template_tag);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if data.cube.dim() != self.template.dim() {
            return Err(MetricError::ShapeMismatch {
                template: self.template.dim(),
                test: data.cube.dim(),
            }
            .into());
        }

        let rect = data
            .valid_region(self.template)
            .ok_or(ItemError::NoValidRegion)?;
        let template = self.template.slice(rect.slice3());
        let mut test = data.cube.slice(rect.slice3()).to_owned();
        if let Some(sigma) = self.config.blur_sigma {
            blur_lateral(&mut test, sigma);
        }
        if let Some(sink) = self.debug {
            let sink = sink.scoped(m.name());
            if let Some(mean) = test.mean_axis(Axis(2)) {
                sink.save_gray("scored_mean", mean.mapv(f64::from).view());
            }
        }

        let score = CombinedScore::create(template, test.view())?;
        log::debug!("{}: combined score {:.4} over {:?}", m.name(), score.score, rect);
        {
            let _guard = self
                .append_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            m.append_score(
                self.template_tag,
                &self.config.score_name,
                &Score::from(score.clone()),
                self.config.overwrite,
            )?;
        }
        Ok(Some(score))
    }
}

/// 评分器.
pub struct Scorer {
    config: ScoringConfig,
    debug: Option<DebugSink>,
}

impl Scorer {
    /// 初始化.
    pub fn new(config: ScoringConfig) -> Self {
        let debug = config.debug_dir.as_deref().and_then(|dir| match DebugSink::new(dir) {
            Ok(sink) => Some(sink),
            Err(e) => {
                log::warn!("debug output disabled, cannot create {}: {e}", dir.display());
                None
            }
        });
        Self { config, debug }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// 对加载器中所有已有形变结果的测量评分.
    ///
    /// 只有模板的分析结果不可用时才返回错误; 单个测量的失败记录在报告中.
    pub fn run<L: MeasurementLoader>(&self, loader: &L) -> Result<ScoringReport, AnalysisError> {
        let template = loader.template();
        let mut cube = template.analysis_results()?.full_cube();
        if let Some(sigma) = self.config.blur_sigma {
            blur_lateral(&mut cube, sigma);
        }

        let append_lock = Mutex::new(());
        let ctx = WorkerContext {
            template: cube.view(),
            template_tag: template.id_tag(),
            config: &self.config,
            append_lock: &append_lock,
            debug: self.debug.as_ref(),
        };
        let items = loader.measurements();
        let outcomes = match self.config.effective_workers() {
            1 => items.iter().map(|m| ctx.score_one(m)).collect(),
            workers => score_parallel(&ctx, items, workers),
        };

        let mut report = ScoringReport::default();
        for (m, outcome) in items.iter().zip(outcomes) {
            match outcome {
                Ok(Some(score)) => report.table.push(m.name(), m.id_tag().clone(), score),
                Ok(None) => report.unscored.push(m.id_tag().clone()),
                Err(e) => {
                    log::warn!("{}: scoring aborted: {e}", m.name());
                    report.failed.push((m.id_tag().clone(), e));
                }
            }
        }
        log::info!(
            "scoring `{}`: {} scored, {} unscored, {} failed",
            self.config.score_name,
            report.table.len(),
            report.unscored.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// 固定大小的 worker 池. 原子游标分发互不相交的下标, 结果按下标放回.
fn score_parallel<M: Measurement>(ctx: &WorkerContext<'_>, items: &[M], workers: usize) -> Vec<Outcome> {
    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        for _ in 0..workers.min(items.len()) {
            let tx = tx.clone();
            let cursor = &cursor;
            s.spawn(move || loop {
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(m) = items.get(i) else {
                    break;
                };
                if tx.send((i, ctx.score_one(m))).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<Outcome>> = (0..items.len()).map(|_| None).collect();
    for (i, outcome) in rx {
        slots[i] = Some(outcome);
    }
    slots.into_iter().map(|o| o.unwrap_or(Ok(None))).collect()
}

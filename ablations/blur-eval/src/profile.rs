//! 单个模糊参数下的评分统计.

use ito_berry::pipeline::ScoringReport;
use std::time::{Duration, Instant};

/// 累计计时器. 初始化时即开始计时.
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 结束计时, 并将这一区间的时间累加.
    #[inline]
    fn elapsed(&mut self) {
        self.consumed += self.since.elapsed();
    }

    /// 累计时间 (毫秒).
    #[inline]
    fn total_ms(&self) -> u128 {
        self.consumed.as_millis()
    }
}

/// 均值与总体标准差的在线累计.
#[derive(Clone, Debug, Default)]
pub struct Moments {
    n: u64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    /// 加入一个样本. 非有限值被忽略.
    #[inline]
    pub fn push(&mut self, v: f64) {
        if v.is_finite() {
            self.n += 1;
            self.sum += v;
            self.sum_sq += v * v;
        }
    }

    /// 均值, 没有样本时为 `None`.
    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    /// 总体标准差, 没有样本时为 `None`.
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        Some((self.sum_sq / self.n as f64 - mean * mean).max(0.0).sqrt())
    }
}

/// 子评分名, 与 `CombinedScore::sub_scores` 顺序一致.
pub const SUB_SCORES: [&str; 5] = ["nrmse", "ssim", "latxcorr", "axxcorr", "reflectance"];

/// 单个模糊参数下的统计.
#[derive(Clone, Debug)]
pub struct Profile {
    sigma: Option<f64>,
    scored: u64,
    unscored: u64,
    failed: u64,
    combined: Moments,
    subs: [Moments; 5],
    timer: AccTimer,
}

impl Profile {
    /// 初始化并开始计时.
    pub fn new(sigma: Option<f64>) -> Self {
        Self {
            sigma,
            scored: 0,
            unscored: 0,
            failed: 0,
            combined: Moments::default(),
            subs: Default::default(),
            timer: AccTimer::new(),
        }
    }

    /// 记录一次评分报告.
    pub fn record(&mut self, report: &ScoringReport) {
        self.unscored += report.unscored.len() as u64;
        self.failed += report.failed.len() as u64;
        for row in report.table.rows() {
            self.scored += 1;
            self.combined.push(row.score.score);
            for (m, (_, v)) in self.subs.iter_mut().zip(row.score.sub_scores()) {
                m.push(v);
            }
        }
    }

    /// 结束计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.timer.elapsed();
        self
    }

    /// 模糊标准差.
    #[inline]
    pub fn sigma(&self) -> Option<f64> {
        self.sigma
    }

    /// `(成功, 未评分, 失败)` 个数.
    #[inline]
    pub fn counts(&self) -> (u64, u64, u64) {
        (self.scored, self.unscored, self.failed)
    }

    /// 组合评分统计.
    #[inline]
    pub fn combined(&self) -> &Moments {
        &self.combined
    }

    /// 子评分统计, 与 [`SUB_SCORES`] 一一对应.
    #[inline]
    pub fn subs(&self) -> &[Moments; 5] {
        &self.subs
    }

    /// 总耗时 (毫秒).
    #[inline]
    pub fn total_ms(&self) -> u128 {
        self.timer.total_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::Moments;

    #[test]
    fn test_moments() {
        let mut m = Moments::default();
        assert!(m.mean().is_none());
        for v in [1.0, 2.0, 3.0, f64::NAN] {
            m.push(v);
        }
        assert!((m.mean().unwrap() - 2.0).abs() < 1e-12);
        assert!((m.std().unwrap() - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}

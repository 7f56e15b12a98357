//! 实验结果.

use crate::profile::{Moments, Profile, SUB_SCORES};
use std::io::{self, Write};

#[inline]
fn moments_to_display(m: &Moments) -> String {
    match (m.mean(), m.std()) {
        (Some(mean), Some(std)) => format!("{mean:.6} ± {std:.6}"),
        _ => "/".to_string(),
    }
}

/// 将 `p` 的结果写进 `w` 中.
fn describe_into<W: Write>(p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    match p.sigma() {
        Some(s) => writeln!(w, "Blur sigma {s} px:")?,
        None => writeln!(w, "No blur:")?,
    }
    let (scored, unscored, failed) = p.counts();
    writeln!(w, "{S4}Scored / unscored / failed: {scored} / {unscored} / {failed}")?;
    writeln!(w, "{S4}Combined: {}", moments_to_display(p.combined()))?;
    for (name, m) in SUB_SCORES.iter().zip(p.subs()) {
        writeln!(w, "{S4}{name:<12}{}", moments_to_display(m))?;
    }
    write!(w, "{S4}Scoring took {} ms", p.total_ms())?;
    Ok(())
}

/// 模糊参数评估的最终结果.
pub struct BlurEvalResult {
    source: String,
    data: Vec<Profile>,
}

impl BlurEvalResult {
    /// 初始化. `source` 描述数据来源.
    pub fn new(source: impl Into<String>, data: Vec<Profile>) -> Self {
        Self {
            source: source.into(),
            data,
        }
    }

    /// 组合评分标准差最小的模糊参数.
    pub fn most_stable(&self) -> Option<&Profile> {
        self.data
            .iter()
            .filter(|p| p.combined().std().is_some())
            .min_by(|a, b| {
                let (a, b) = (a.combined().std(), b.combined().std());
                a.unwrap_or(f64::MAX).total_cmp(&b.unwrap_or(f64::MAX))
            })
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut w = stdout.lock();
        writeln!(w, "Data source: {}", self.source)?;
        utils::sep_to(&mut w)?;
        for profile in self.data.iter() {
            describe_into(profile, &mut w)?;
            writeln!(w)?;
            utils::sep_to(&mut w)?;
        }
        if let Some(p) = self.most_stable() {
            writeln!(w, "Most stable combined score: sigma = {:?}", p.sigma())?;
        }
        Ok(())
    }
}

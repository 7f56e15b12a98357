//! 模板与测试测量之间的二维仿射配准.
//!
//! 配准只使用两次测量的平均反射率图. 得到的 [`Transform`] 将测试图像坐标映射到模板
//! 图像坐标 (约定见 [`crate::transform`]).

use std::fmt;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::consts::XCORR_MIN_PEAK;
use crate::data::AnalysisResults;
use crate::debug::DebugSink;
use crate::transform::{Affine2, Transform};

mod features;
mod xcorr;

pub use features::FeatureAligner;
pub use xcorr::XcorrAligner;

/// 配准方法.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlignMethod {
    /// 基于 FFT 互相关, 只估计平移.
    #[default]
    Xcorr,

    /// 基于角点特征匹配, 估计完整仿射.
    Features,
}

impl AlignMethod {
    /// 方法名, 会被写入缓存.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Xcorr => "xcorr",
            Self::Features => "features",
        }
    }

    /// 由方法名解析.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "xcorr" => Some(Self::Xcorr),
            "features" => Some(Self::Features),
            _ => None,
        }
    }
}

impl fmt::Display for AlignMethod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单一配准算法.
pub trait Aligner: Send + Sync {
    /// 对应的配准方法.
    fn method(&self) -> AlignMethod;

    /// 估计把 `test` 映射到 `template` 的仿射变换. 失败时返回 `None`.
    ///
    /// `debug` 存在时可以输出可视化结果, 但不能影响返回值.
    fn estimate(
        &self,
        template: ArrayView2<f32>,
        test: ArrayView2<f32>,
        debug: Option<&DebugSink>,
    ) -> Option<Affine2>;
}

/// 配准引擎: 选定一种算法, 并对一批测量逐个配准.
pub struct AlignmentEngine {
    aligner: Box<dyn Aligner>,
    debug: Option<DebugSink>,
}

impl AlignmentEngine {
    /// 按方法创建默认参数的引擎.
    pub fn new(method: AlignMethod) -> Self {
        Self::with_min_peak(method, XCORR_MIN_PEAK)
    }

    /// 按方法创建引擎, `min_peak` 仅对 [`AlignMethod::Xcorr`] 有效.
    pub fn with_min_peak(method: AlignMethod, min_peak: f64) -> Self {
        let aligner: Box<dyn Aligner> = match method {
            AlignMethod::Xcorr => Box::new(XcorrAligner::new(min_peak)),
            AlignMethod::Features => Box::<FeatureAligner>::default(),
        };
        Self::with_aligner(aligner)
    }

    /// 使用自定义算法.
    pub fn with_aligner(aligner: Box<dyn Aligner>) -> Self {
        Self {
            aligner,
            debug: None,
        }
    }

    /// 打开调试可视化.
    pub fn with_debug(mut self, sink: Option<DebugSink>) -> Self {
        self.debug = sink;
        self
    }

    /// 配准方法.
    #[inline]
    pub fn method(&self) -> AlignMethod {
        self.aligner.method()
    }

    /// 配准单个测量. `label` 用于日志与调试文件名.
    pub fn match_one(
        &self,
        template: &AnalysisResults,
        test: &AnalysisResults,
        label: &str,
    ) -> Option<Transform> {
        let sink = self.debug.as_ref().map(|s| s.scoped(label));
        let affine = self.aligner.estimate(
            template.mean_reflectance(),
            test.mean_reflectance(),
            sink.as_ref(),
        );
        match affine {
            Some(a) => {
                log::debug!("{label}: {} alignment {:?}", self.method(), a.matrix());
                Some(Transform::new(a, self.method()))
            }
            None => {
                log::warn!("{label}: {} alignment failed", self.method());
                None
            }
        }
    }

    /// 依次配准一批测量, 结果与输入一一对应.
    pub fn match_all<'a, I>(&self, template: &AnalysisResults, tests: I) -> Vec<Option<Transform>>
    where
        I: IntoIterator<Item = (&'a str, &'a AnalysisResults)>,
    {
        tests
            .into_iter()
            .map(|(label, test)| self.match_one(template, test, label))
            .collect()
    }
}

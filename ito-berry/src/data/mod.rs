//! 测量数据的基础结构: 分析结果, 分析设置, 身份标签以及有效区域掩膜.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::{Idx2d, Idx3d};

mod id_tag;
pub mod mask;

pub use id_tag::IdTag;
pub use mask::Rect;

/// 生成分析结果时使用的设置.
///
/// 缓存的分析结果只有在设置完全一致时才能复用,
/// 否则不同测量之间的比较没有意义.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// 归一化时使用的参考材料.
    pub reference_material: String,

    /// 光谱低通滤波器阶数.
    pub filter_order: u32,

    /// 光谱低通滤波器截止频率. `None` 表示不滤波.
    pub filter_cutoff: Option<f64>,

    /// 光谱去趋势多项式次数.
    pub polynomial_order: u32,

    /// 起始波长 (nm).
    pub wavelength_start: u32,

    /// 终止波长 (nm).
    pub wavelength_stop: u32,
}

impl AnalysisSettings {
    /// 推荐设置. ITO 薄膜的参考面为空气.
    pub fn recommended() -> Self {
        Self {
            reference_material: "Air".to_string(),
            filter_order: 6,
            filter_cutoff: Some(0.15),
            polynomial_order: 0,
            wavelength_start: 510,
            wavelength_stop: 690,
        }
    }
}

impl Default for AnalysisSettings {
    #[inline]
    fn default() -> Self {
        Self::recommended()
    }
}

/// 单次测量的分析结果.
///
/// `reflectance` 以 `(行, 列, 光谱)` 存储 **去除逐像素均值后** 的反射率变化,
/// `mean_reflectance` 为对应的逐像素平均反射率. 两者相加才是完整的反射率立方体.
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    reflectance: Array3<f32>,
    mean_reflectance: Array2<f32>,
    settings: AnalysisSettings,
    reference_id: String,
}

impl AnalysisResults {
    /// 直接初始化.
    ///
    /// 若 `reflectance` 与 `mean_reflectance` 的平面形状不一致, 则程序 panic.
    pub fn new(
        reflectance: Array3<f32>,
        mean_reflectance: Array2<f32>,
        settings: AnalysisSettings,
        reference_id: impl Into<String>,
    ) -> Self {
        let (h, w, _) = reflectance.dim();
        assert_eq!((h, w), mean_reflectance.dim(), "反射率立方体与均值图形状不一致");
        Self {
            reflectance,
            mean_reflectance,
            settings,
            reference_id: reference_id.into(),
        }
    }

    /// 从完整的反射率立方体创建, 逐像素均值会被拆分到 `mean_reflectance`.
    ///
    /// 若立方体光谱维为空, 则程序 panic.
    pub fn from_full_cube(
        cube: Array3<f32>,
        settings: AnalysisSettings,
        reference_id: impl Into<String>,
    ) -> Self {
        let mean = cube.mean_axis(Axis(2)).expect("光谱维不能为空");
        let mut reflectance = cube;
        reflectance -= &mean.view().insert_axis(Axis(2));
        Self::new(reflectance, mean, settings, reference_id)
    }

    /// 去均值后的反射率立方体.
    #[inline]
    pub fn reflectance(&self) -> ArrayView3<'_, f32> {
        self.reflectance.view()
    }

    /// 逐像素平均反射率.
    #[inline]
    pub fn mean_reflectance(&self) -> ArrayView2<'_, f32> {
        self.mean_reflectance.view()
    }

    /// 生成该结果时使用的设置.
    #[inline]
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// 生成该结果时使用的参考采集的身份.
    #[inline]
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// 立方体形状 `(行, 列, 光谱)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.reflectance.dim()
    }

    /// 平面形状 `(行, 列)`.
    #[inline]
    pub fn frame_shape(&self) -> Idx2d {
        self.mean_reflectance.dim()
    }

    /// 重新加回均值, 得到完整的反射率立方体.
    pub fn full_cube(&self) -> Array3<f32> {
        let mut cube = self.reflectance.clone();
        cube += &self.mean_reflectance.view().insert_axis(Axis(2));
        cube
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisResults, AnalysisSettings};
    use ndarray::Array3;

    #[test]
    fn test_full_cube_restores_input() {
        let cube = Array3::from_shape_fn((4, 5, 6), |(h, w, s)| {
            (h * 31 + w * 7 + s * s) as f32 * 0.01 + 0.5
        });
        let res = AnalysisResults::from_full_cube(cube.clone(), AnalysisSettings::default(), "ref");
        let mean = res.reflectance().mean_axis(ndarray::Axis(2)).unwrap();
        assert!(mean.iter().all(|v| v.abs() < 1e-5));
        let back = res.full_cube();
        for (a, b) in back.iter().zip(cube.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(res.frame_shape(), (4, 5));
        assert_eq!(res.reference_id(), "ref");
    }

    #[test]
    #[should_panic]
    fn test_shape_mismatch_panics() {
        AnalysisResults::new(
            Array3::zeros((3, 3, 2)),
            ndarray::Array2::zeros((3, 4)),
            AnalysisSettings::default(),
            "ref",
        );
    }
}

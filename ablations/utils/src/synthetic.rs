//! 合成校准测量.
//!
//! 一张大幅的薄膜厚度图上截取多个窗口, 每个窗口相对模板有随机的整数漂移,
//! 亮度逐次衰减并叠加白噪声. 光谱为厚度决定相位的正弦干涉条纹.

use ito_berry::data::{AnalysisResults, AnalysisSettings};
use ito_berry::measurement::{MemMeasurement, VecLoader};
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 合成序列参数.
#[derive(Clone, Debug)]
pub struct SyntheticSeries {
    /// 测试测量个数.
    pub count: usize,

    /// 立方体形状 `(行, 列, 光谱)`.
    pub shape: (usize, usize, usize),

    /// 最大横向漂移 (像素).
    pub max_drift: usize,

    /// 每次测量的亮度衰减比例.
    pub fade: f32,

    /// 白噪声幅度.
    pub noise: f32,

    /// 随机种子.
    pub seed: u64,
}

impl Default for SyntheticSeries {
    fn default() -> Self {
        Self {
            count: 8,
            shape: (96, 96, 40),
            max_drift: 4,
            fade: 0.02,
            noise: 0.01,
            seed: 42,
        }
    }
}

const REFERENCE_ID: &str = "synthetic:reference";

impl SyntheticSeries {
    /// 生成加载器. 模板无漂移, 无衰减.
    pub fn loader(&self) -> VecLoader<MemMeasurement> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (h, w, _) = self.shape;
        let m = self.max_drift;
        let thickness = thickness_map(&mut rng, (h + 2 * m, w + 2 * m));

        let template = self.measurement(&mut rng, &thickness, "template", (m, m), 1.0);
        let tests = (0..self.count)
            .map(|i| {
                let dr = rng.random_range(0..=2 * m);
                let dc = rng.random_range(0..=2 * m);
                let gain = 1.0 - self.fade * (i + 1) as f32;
                self.measurement(&mut rng, &thickness, &format!("cell{i:02}"), (dr, dc), gain)
            })
            .collect();
        VecLoader::new(template, tests)
    }

    fn measurement(
        &self,
        rng: &mut StdRng,
        thickness: &Array2<f32>,
        name: &str,
        (top, left): (usize, usize),
        gain: f32,
    ) -> MemMeasurement {
        let (h, w, d) = self.shape;
        let cube = Array3::from_shape_fn((h, w, d), |(r, c, k)| {
            let t = thickness[(r + top, c + left)];
            let wave = (k as f32 * 0.35 * t + 2.0 * t).sin();
            gain * (0.8 + 0.3 * t + 0.1 * wave)
        });
        let cube = cube.mapv(|v| v + self.noise * (rng.random::<f32>() - 0.5));
        let res = AnalysisResults::from_full_cube(cube, AnalysisSettings::recommended(), REFERENCE_ID);
        MemMeasurement::new(name, &format!("synthetic:{name}"), res)
    }
}

/// 若干随机正弦叠加得到的平滑厚度图, 取值约在 `[0, 1]`.
fn thickness_map(rng: &mut StdRng, shape: (usize, usize)) -> Array2<f32> {
    let waves: Vec<(f32, f32, f32)> = (0..6)
        .map(|_| {
            (
                rng.random_range(0.05..0.3),
                rng.random_range(0.05..0.3),
                rng.random_range(0.0..std::f32::consts::TAU),
            )
        })
        .collect();
    Array2::from_shape_fn(shape, |(r, c)| {
        let s: f32 = waves
            .iter()
            .map(|&(fr, fc, p)| (fr * r as f32 + fc * c as f32 + p).sin())
            .sum();
        0.5 + s / (2.0 * waves.len() as f32)
    })
}

#[cfg(test)]
mod tests {
    use super::SyntheticSeries;
    use ito_berry::measurement::{Measurement, MeasurementLoader};

    #[test]
    fn test_series_shape() {
        let series = SyntheticSeries {
            count: 3,
            shape: (20, 24, 8),
            ..SyntheticSeries::default()
        };
        let loader = series.loader();
        assert_eq!(loader.measurements().len(), 3);
        let res = loader.measurements()[2].analysis_results().unwrap();
        assert_eq!(res.shape(), (20, 24, 8));
        assert_ne!(loader.template().id_tag(), loader.measurements()[0].id_tag());
    }
}

use ndarray::{Array1, ArrayView1, ArrayView2, ArrayView3, Axis};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{check_pair, nullable_f64, MetricError, MetricResult};
use crate::consts::{AXIAL_CDR_INTERVAL, AXIAL_UPSAMPLE};
use crate::fitting::resample_cubic;
use crate::signal::{argmax, decay_rate_1d, mean_std, Correlator1d};

/// 轴向 (光谱) 互相关评分.
///
/// 每个像素的光谱先归一化为零均值, 单位方差, 再逐像素沿光谱轴做互相关并对全部像素取平均.
/// `shift` 由平均光谱 10 倍上采样后的互相关得到, 单位为原始光谱采样点.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxialXCorrScore {
    /// 平均互相关曲线的峰值.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,

    /// 光谱偏移.
    #[serde(deserialize_with = "nullable_f64")]
    pub shift: f64,

    /// 相关衰减率.
    #[serde(deserialize_with = "nullable_f64")]
    pub cdr: f64,
}

/// 逐行累加的中间结果.
struct Partial {
    cross: Vec<Complex64>,
    template_sum: Array1<f64>,
    test_sum: Array1<f64>,
}

impl Partial {
    fn new(out_len: usize, depth: usize) -> Self {
        Self {
            cross: vec![Complex64::default(); out_len],
            template_sum: Array1::zeros(depth),
            test_sum: Array1::zeros(depth),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.cross
            .iter_mut()
            .zip(other.cross)
            .for_each(|(a, b)| *a += b);
        self.template_sum += &other.template_sum;
        self.test_sum += &other.test_sum;
        self
    }

    fn add_row(mut self, cor: &Correlator1d, t_row: ArrayView2<f32>, s_row: ArrayView2<f32>) -> Self {
        let depth = t_row.ncols();
        let inv_depth = 1.0 / depth as f64;
        for (t, s) in t_row.outer_iter().zip(s_row.outer_iter()) {
            let t = normalize(t);
            let s = normalize(s);
            let st = cor.spectrum(t.iter().copied());
            let ss = cor.spectrum(s.iter().map(|v| v * inv_depth));
            Correlator1d::accumulate(&mut self.cross, &st, &ss);
            self.template_sum += &t;
            self.test_sum += &s;
        }
        self
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

        /// 逐行并行累加全部像素的频域互相关与归一化光谱.
        fn accumulate(cor: &Correlator1d, template: ArrayView3<f32>, test: ArrayView3<f32>) -> Partial {
            let depth = template.len_of(Axis(2));
            let init = || Partial::new(cor.out_len(), depth);
            template
                .axis_iter(Axis(0))
                .into_par_iter()
                .zip(test.axis_iter(Axis(0)).into_par_iter())
                .fold(init, |acc, (t, s)| acc.add_row(cor, t, s))
                .reduce(init, Partial::merge)
        }
    } else {
        /// 逐行累加全部像素的频域互相关与归一化光谱.
        fn accumulate(cor: &Correlator1d, template: ArrayView3<f32>, test: ArrayView3<f32>) -> Partial {
            let depth = template.len_of(Axis(2));
            template
                .axis_iter(Axis(0))
                .zip(test.axis_iter(Axis(0)))
                .fold(Partial::new(cor.out_len(), depth), |acc, (t, s)| acc.add_row(cor, t, s))
        }
    }
}

/// 归一化为零均值, 单位 (总体) 方差. 常数光谱会产生非有限值.
fn normalize(spectrum: ArrayView1<f32>) -> Array1<f64> {
    let (mean, std) = mean_std(spectrum.iter().map(|&v| v as f64));
    spectrum.mapv(|v| (v as f64 - mean) / std)
}

impl AxialXCorrScore {
    const NAME: &'static str = "AxialXCorrScore";

    /// 计算评分.
    ///
    /// 光谱维长度小于 3 时返回 [`MetricError::RegionTooSmall`].
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        check_pair(template, test)?;
        let (h, w, depth) = template.dim();
        if depth < 3 {
            return Err(MetricError::RegionTooSmall {
                metric: Self::NAME,
                shape: template.dim(),
                min: 3,
            });
        }

        let cor = Correlator1d::new(depth, depth);
        let total = accumulate(&cor, template, test);

        let pixels = (h * w) as f64;
        let corr = cor.finish(total.cross) / pixels;
        let peak = argmax(corr.iter().copied()).ok_or(MetricError::Empty)?;
        let score = corr[peak];
        if !score.is_finite() {
            return Err(MetricError::Defect(Self::NAME));
        }
        let cdr = decay_rate_1d(corr.view(), peak, AXIAL_CDR_INTERVAL);

        // 平均光谱上采样后再互相关, 得到亚采样点精度的偏移.
        let up_len = depth * AXIAL_UPSAMPLE;
        let up_template = resample_cubic((total.template_sum / pixels).view(), up_len);
        let up_test = resample_cubic((total.test_sum / pixels).view(), up_len) / up_len as f64;
        let up_cor = Correlator1d::new(up_len, up_len);
        let up_corr = up_cor.correlate(up_template.iter().copied(), up_test.iter().copied());
        let up_peak = argmax(up_corr.iter().copied()).ok_or(MetricError::Empty)?;
        let shift =
            (up_peak as f64 - up_cor.zero_shift() as f64) / AXIAL_UPSAMPLE as f64;

        Ok(Self { score, shift, cdr })
    }
}

#[cfg(test)]
mod tests {
    use super::AxialXCorrScore;
    use crate::metric::MetricError;
    use crate::test_utils::{float_eq, textured_cube};
    use ndarray::{s, Array3};

    #[test]
    fn test_identical_is_one() {
        let cube = textured_cube((10, 12, 20), 3);
        let s = AxialXCorrScore::create(cube.view(), cube.view()).unwrap();
        assert!(float_eq(s.score, 1.0, 1e-6), "{}", s.score);
        assert_eq!(s.shift, 0.0);
        assert!(s.cdr >= 0.0);
    }

    #[test]
    fn test_spectral_shift_sign() {
        // 每个像素的光谱为同一个高斯峰; 测试光谱整体后移两个采样点.
        let depth = 24;
        let peak = |center: f64| {
            Array3::from_shape_fn((4, 5, depth), move |(_, _, k)| {
                (-((k as f64 - center).powi(2)) / 8.0).exp() as f32
            })
        };
        let template = peak(10.0);
        let test = peak(12.0);
        let s = AxialXCorrScore::create(template.view(), test.view()).unwrap();
        assert!((s.shift + 2.0).abs() < 0.3, "{}", s.shift);
    }

    #[test]
    fn test_too_shallow() {
        let cube = textured_cube((6, 6, 4), 5);
        let shallow = cube.slice(s![.., .., ..2]);
        assert!(matches!(
            AxialXCorrScore::create(shallow, shallow),
            Err(MetricError::RegionTooSmall { min: 3, .. })
        ));
    }

    #[test]
    fn test_flat_spectrum_is_defect() {
        let flat = Array3::<f32>::ones((3, 3, 8));
        assert_eq!(
            AxialXCorrScore::create(flat.view(), flat.view()),
            Err(MetricError::Defect("AxialXCorrScore"))
        );
    }
}

use ndarray::ArrayView2;

use super::{AlignMethod, Aligner};
use crate::consts::XCORR_MIN_PEAK;
use crate::debug::DebugSink;
use crate::signal::{argmax_2d, normalized_xcorr_2d, parabolic_offset};
use crate::transform::Affine2;

/// 互相关平移配准.
///
/// 两幅平均反射率图归一化后做 `full` 互相关, 峰值经三点抛物线拟合细化到亚像素.
/// 结果只包含平移.
#[derive(Copy, Clone, Debug)]
pub struct XcorrAligner {
    min_peak: f64,
}

impl XcorrAligner {
    /// `min_peak`: 可以接受的最小互相关峰值.
    #[inline]
    pub const fn new(min_peak: f64) -> Self {
        Self { min_peak }
    }

    /// 可以接受的最小互相关峰值.
    #[inline]
    pub const fn min_peak(&self) -> f64 {
        self.min_peak
    }
}

impl Default for XcorrAligner {
    #[inline]
    fn default() -> Self {
        Self::new(XCORR_MIN_PEAK)
    }
}

impl Aligner for XcorrAligner {
    #[inline]
    fn method(&self) -> AlignMethod {
        AlignMethod::Xcorr
    }

    fn estimate(
        &self,
        template: ArrayView2<f32>,
        test: ArrayView2<f32>,
        debug: Option<&DebugSink>,
    ) -> Option<Affine2> {
        if template.dim() != test.dim() {
            return None;
        }
        let corr = normalized_xcorr_2d(template, test)?;
        if let Some(sink) = debug {
            sink.save_gray("xcorr", corr.view());
        }
        if corr.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let (pr, pc) = argmax_2d(corr.view())?;
        let peak = corr[(pr, pc)];
        if peak < self.min_peak {
            log::debug!("xcorr peak {peak:.4} below {:.4}", self.min_peak);
            return None;
        }

        let (ph, pw) = corr.dim();
        let dr = if pr > 0 && pr + 1 < ph {
            parabolic_offset(corr[(pr - 1, pc)], peak, corr[(pr + 1, pc)])
        } else {
            0.0
        };
        let dc = if pc > 0 && pc + 1 < pw {
            parabolic_offset(corr[(pr, pc - 1)], peak, corr[(pr, pc + 1)])
        } else {
            0.0
        };

        let (h, w) = test.dim();
        let shift_r = pr as f64 + dr - (h - 1) as f64;
        let shift_c = pc as f64 + dc - (w - 1) as f64;
        Some(Affine2::from_translation(shift_c, shift_r))
    }
}

#[cfg(test)]
mod tests {
    use super::XcorrAligner;
    use crate::align::Aligner;
    use crate::test_utils::smooth_image;
    use ndarray::{s, Array2};

    #[test]
    fn test_identity() {
        let img = smooth_image((40, 48), 3, 1.5);
        let a = XcorrAligner::default()
            .estimate(img.view(), img.view(), None)
            .unwrap();
        let (tx, ty) = a.translation();
        assert!(tx.abs() < 1e-6 && ty.abs() < 1e-6);
    }

    #[test]
    fn test_translation_maps_test_onto_template() {
        let big = smooth_image((70, 70), 9, 1.5);
        let template = big.slice(s![10..60, 10..60]);
        let test = big.slice(s![14..64, 7..57]);
        let a = XcorrAligner::default()
            .estimate(template, test, None)
            .unwrap();
        // test(r, c) == template(r + 4, c - 3)
        let (x, y) = a.apply(20.0, 20.0);
        assert!((x - 17.0).abs() < 0.2 && (y - 24.0).abs() < 0.2, "{x} {y}");
    }

    #[test]
    fn test_rejects_bad_input() {
        let img = smooth_image((20, 20), 1, 1.0);
        let al = XcorrAligner::default();
        assert!(al.estimate(img.view(), img.slice(s![..19, ..]), None).is_none());
        let flat = Array2::<f32>::ones((20, 20));
        assert!(al.estimate(img.view(), flat.view(), None).is_none());
        assert!(XcorrAligner::new(1.5).estimate(img.view(), img.view(), None).is_none());
    }
}

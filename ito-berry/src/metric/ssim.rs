use ndarray::{s, Array3, ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use super::{check_pair, nullable_f64, MetricError, MetricResult};
use crate::consts::ssim::{DATA_RANGE, K1, K2, SIGMA, TRUNCATE};
use crate::signal::{gaussian_filter, gaussian_kernel};

/// 三维结构相似度评分 (高斯加权, Wang et al.).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SSimScore {
    /// 平均 SSIM.
    #[serde(deserialize_with = "nullable_f64")]
    pub score: f64,
}

fn smooth(mut arr: Array3<f64>) -> Array3<f64> {
    gaussian_filter(&mut arr, SIGMA, TRUNCATE, &[0, 1, 2]);
    arr
}

impl SSimScore {
    const NAME: &'static str = "SSimScore";

    /// 计算评分.
    ///
    /// 任一轴长度小于高斯窗宽 (11) 时返回 [`MetricError::RegionTooSmall`].
    /// 结果为 NaN 时返回 [`MetricError::Defect`].
    pub fn create(template: ArrayView3<f32>, test: ArrayView3<f32>) -> MetricResult<Self> {
        check_pair(template, test)?;
        let win = gaussian_kernel(SIGMA, TRUNCATE).len();
        let (h, w, d) = template.dim();
        if h < win || w < win || d < win {
            return Err(MetricError::RegionTooSmall {
                metric: Self::NAME,
                shape: template.dim(),
                min: win,
            });
        }

        let x = template.mapv(|v| v as f64);
        let y = test.mapv(|v| v as f64);
        let ux = smooth(x.clone());
        let uy = smooth(y.clone());
        let uxx = smooth(&x * &x);
        let uyy = smooth(&y * &y);
        let uxy = smooth(&x * &y);
        drop((x, y));

        let np = win.pow(3) as f64;
        let cov_norm = np / (np - 1.0);
        let c1 = (K1 * DATA_RANGE).powi(2);
        let c2 = (K2 * DATA_RANGE).powi(2);

        let pad = (win - 1) / 2;
        let interior = s![pad..h - pad, pad..w - pad, pad..d - pad];
        let mut sum = 0.0;
        Zip::from(ux.slice(interior))
            .and(uy.slice(interior))
            .and(uxx.slice(interior))
            .and(uyy.slice(interior))
            .and(uxy.slice(interior))
            .for_each(|&mx, &my, &mxx, &myy, &mxy| {
                let vx = cov_norm * (mxx - mx * mx);
                let vy = cov_norm * (myy - my * my);
                let vxy = cov_norm * (mxy - mx * my);
                let a = (2.0 * mx * my + c1) * (2.0 * vxy + c2);
                let b = (mx * mx + my * my + c1) * (vx + vy + c2);
                sum += a / b;
            });
        let count = (h - 2 * pad) * (w - 2 * pad) * (d - 2 * pad);
        let score = sum / count as f64;
        if score.is_nan() {
            return Err(MetricError::Defect(Self::NAME));
        }
        Ok(Self { score })
    }
}

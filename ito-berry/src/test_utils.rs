//! 测试用的确定性合成数据.

use ndarray::{Array2, Array3};

use crate::data::{AnalysisResults, AnalysisSettings};
use crate::signal::gaussian_filter;

/// 浮点数近似相等.
pub fn float_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

/// splitmix64, 把任意整数映射到 `[0, 1)`.
fn hash01(mut z: u64) -> f64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

fn key(seed: u64, r: usize, c: usize) -> u64 {
    seed.wrapping_mul(0x1000_0000_01B3) ^ ((r as u64) << 32) ^ c as u64
}

/// 白噪声图像, 取值 `[0, 1)`.
pub fn noise_image((h, w): (usize, usize), seed: u64) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| hash01(key(seed, r, c)) as f32)
}

/// 经高斯平滑的噪声图像, 取值大致为 `[0.5, 1.5]`, 适合做亚像素配准.
pub fn smooth_image(shape: (usize, usize), seed: u64, sigma: f64) -> Array2<f32> {
    let mut img = noise_image(shape, seed).mapv(|v| v as f64);
    gaussian_filter(&mut img, sigma, 4.0, &[0, 1]);
    let (lo, hi) = img
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    img.mapv(|v| (0.5 + (v - lo) / (hi - lo)) as f32)
}

/// 带纹理的反射率立方体, 所有体素为正, 每个像素的光谱方差非零.
pub fn textured_cube((h, w, d): (usize, usize, usize), seed: u64) -> Array3<f32> {
    let base = noise_image((h, w), seed);
    let phase = noise_image((h, w), seed ^ 0xABCD);
    Array3::from_shape_fn((h, w, d), |(r, c, k)| {
        let wave = (k as f32 * 0.7 + phase[(r, c)] * std::f32::consts::TAU).sin();
        let jitter = hash01(key(seed.wrapping_add(k as u64 + 1), r, c)) as f32;
        1.0 + 0.5 * base[(r, c)] + 0.2 * wave + 0.05 * jitter
    })
}

/// 由平面图像生成分析结果: 每个像素的光谱为一段正弦, 均值为图像值.
pub fn analysis_from_image(img: &Array2<f32>, depth: usize, reference_id: &str) -> AnalysisResults {
    let (h, w) = img.dim();
    let cube = Array3::from_shape_fn((h, w, depth), |(r, c, k)| {
        img[(r, c)] * (1.0 + 0.1 * (k as f32 * 0.6).sin())
    });
    AnalysisResults::from_full_cube(cube, AnalysisSettings::default(), reference_id)
}

#[cfg(test)]
mod tests {
    use super::{smooth_image, textured_cube};

    #[test]
    fn test_generators_are_deterministic() {
        assert_eq!(textured_cube((4, 5, 6), 3), textured_cube((4, 5, 6), 3));
        assert_ne!(textured_cube((4, 5, 6), 3), textured_cube((4, 5, 6), 4));
        let img = smooth_image((16, 16), 1, 1.0);
        assert!(img.iter().all(|v| (0.5..=1.5).contains(v)));
    }
}

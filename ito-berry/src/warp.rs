//! 将测试测量的反射率立方体形变到模板坐标系.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip};
#[cfg(feature = "rayon")]
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use thiserror::Error;

use crate::consts::WARP_FILL;
use crate::data::mask::dilate_n4;
use crate::data::AnalysisResults;
use crate::transform::Affine2;
use crate::{Idx2d, Idx3d};

/// 形变错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WarpError {
    /// 仿射矩阵不可逆.
    #[error("affine transform is singular")]
    Singular,

    /// 测试立方体与模板的光谱维不一致, 或测试立方体为空.
    #[error("cannot warp cube {test:?} into template {template:?}")]
    ShapeMismatch {
        /// 模板形状.
        template: Idx3d,
        /// 测试形状.
        test: Idx3d,
    },
}

/// 形变结果.
#[derive(Debug, Clone)]
pub struct WarpOutput {
    /// 模板坐标系下的完整反射率立方体, 无效体素为 `NaN`.
    pub cube: Array3<f32>,

    /// 无效区域 (模板坐标系中没有测试数据覆盖的像素, 并向外膨胀一次).
    pub mask: Array2<bool>,
}

/// 双线性插值的四个采样点 `(行, 列, 权重)`. 越界采样点权重为 0.
type Taps = [(usize, usize, f32); 4];

#[inline]
fn bilinear_taps(x: f64, y: f64, (h, w): Idx2d) -> Taps {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let tap = |dy: f64, dx: f64, weight: f64| {
        let (yy, xx) = (y0 + dy, x0 + dx);
        if weight > 0.0 && yy >= 0.0 && xx >= 0.0 && yy < h as f64 && xx < w as f64 {
            (yy as usize, xx as usize, weight as f32)
        } else {
            (0, 0, 0.0)
        }
    };
    [
        tap(0.0, 0.0, (1.0 - fx) * (1.0 - fy)),
        tap(0.0, 1.0, fx * (1.0 - fy)),
        tap(1.0, 0.0, (1.0 - fx) * fy),
        tap(1.0, 1.0, fx * fy),
    ]
}

/// 最近邻采样, 越界时返回 `None`.
#[inline]
fn nearest(x: f64, y: f64, (h, w): Idx2d) -> Option<Idx2d> {
    let (xx, yy) = ((x + 0.5).floor(), (y + 0.5).floor());
    (yy >= 0.0 && xx >= 0.0 && yy < h as f64 && xx < w as f64).then(|| (yy as usize, xx as usize))
}

/// 立方体形变器. 输出平面形状为模板的 `(行, 列)`.
#[derive(Copy, Clone, Debug)]
pub struct VolumeWarper {
    template: Idx3d,
}

impl VolumeWarper {
    /// `template`: 模板立方体形状 `(行, 列, 光谱)`.
    #[inline]
    pub const fn new(template: Idx3d) -> Self {
        Self { template }
    }

    /// 对测试测量 `test` 应用 `affine` (测试坐标到模板坐标).
    ///
    /// 1. 求逆得到模板坐标到测试坐标的采样映射;
    /// 2. 最近邻形变平均反射率图, 越界填充 [`WARP_FILL`];
    /// 3. 由填充值得到掩膜, 并以十字结构元膨胀一次;
    /// 4. 每个光谱平面以双线性插值 (越界为 0) 形变, 再加回形变后的平均反射率;
    /// 5. 掩膜内的体素置为 `NaN`.
    pub fn warp(&self, affine: &Affine2, test: &AnalysisResults) -> Result<WarpOutput, WarpError> {
        let (th, tw, td) = self.template;
        let (sh, sw, sd) = test.shape();
        if sd != td || sh * sw == 0 {
            return Err(WarpError::ShapeMismatch {
                template: self.template,
                test: test.shape(),
            });
        }
        let inv = affine.invert().ok_or(WarpError::Singular)?;
        let src = (sh, sw);

        let coords = Array2::from_shape_fn((th, tw), |(r, c)| inv.apply(c as f64, r as f64));
        let mean = test.mean_reflectance();
        let warped_mean = coords.mapv(|(x, y)| nearest(x, y, src).map_or(WARP_FILL, |p| mean[p]));
        let mask = dilate_n4(warped_mean.mapv(|v| v == WARP_FILL).view());

        let mut cube = Array3::<f32>::zeros((th, tw, td));
        let reflectance = test.reflectance();
        let fill_row = |r: usize, row: ArrayViewMut2<f32>| {
            warp_row(
                row,
                coords.row(r),
                warped_mean.row(r),
                mask.row(r),
                reflectance,
            )
        };
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                cube.axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(r, row)| fill_row(r, row));
            } else {
                cube.axis_iter_mut(Axis(0))
                    .enumerate()
                    .for_each(|(r, row)| fill_row(r, row));
            }
        }
        Ok(WarpOutput { cube, mask })
    }
}

/// 形变输出立方体的一行 `(列, 光谱)`.
fn warp_row(
    mut row: ArrayViewMut2<f32>,
    coords: ArrayView1<(f64, f64)>,
    mean: ArrayView1<f32>,
    mask: ArrayView1<bool>,
    reflectance: ArrayView3<f32>,
) {
    let (sh, sw, _) = reflectance.dim();
    Zip::from(row.axis_iter_mut(Axis(0)))
        .and(coords)
        .and(mean)
        .and(mask)
        .for_each(|mut spectrum, &(x, y), &m, &invalid| {
            if invalid {
                spectrum.fill(f32::NAN);
                return;
            }
            let taps = bilinear_taps(x, y, (sh, sw));
            for (k, out) in spectrum.iter_mut().enumerate() {
                *out = taps
                    .iter()
                    .fold(0.0, |acc, &(r, c, wt)| acc + wt * reflectance[(r, c, k)])
                    + m;
            }
        });
}

/// 对平面图像应用 `affine` 后以双线性插值 (越界为 0) 采样到 `frame` 形状.
pub fn warp_plane(affine: &Affine2, img: ArrayView2<f32>, frame: Idx2d) -> Option<Array2<f32>> {
    let inv = affine.invert()?;
    let src = img.dim();
    Some(Array2::from_shape_fn(frame, |(r, c)| {
        let (x, y) = inv.apply(c as f64, r as f64);
        bilinear_taps(x, y, src)
            .iter()
            .fold(0.0, |acc, &(rr, cc, wt)| acc + wt * img[(rr, cc)])
    }))
}

//! 无效区域掩膜的形态学与区域操作.

use std::ops::Range;

use ndarray::{s, Array2, ArrayBase, ArrayView2, Data, Ix3, SliceInfo, SliceInfoElem};
use serde::{Deserialize, Serialize};

use crate::Idx2d;

/// 轴对齐矩形区域, 以 `(行, 列)` 为坐标.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// 起始行.
    pub top: usize,

    /// 起始列.
    pub left: usize,

    /// 行数.
    pub height: usize,

    /// 列数.
    pub width: usize,
}

impl Rect {
    /// 覆盖整个 `(h, w)` 平面的矩形.
    #[inline]
    pub const fn full((h, w): Idx2d) -> Self {
        Self {
            top: 0,
            left: 0,
            height: h,
            width: w,
        }
    }

    /// 行范围.
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.top..self.top + self.height
    }

    /// 列范围.
    #[inline]
    pub fn cols(&self) -> Range<usize> {
        self.left..self.left + self.width
    }

    /// 面积 (像素个数).
    #[inline]
    pub const fn area(&self) -> usize {
        self.height * self.width
    }

    /// 是否为空.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// 对 3D 立方体 `(行, 列, 光谱)` 裁剪出该矩形对应的全部光谱.
    pub fn slice3(&self) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        s![self.rows(), self.cols(), ..]
    }
}

/// 以十字形 (4-邻域) 结构元对掩膜进行一次二值膨胀. 图像外的像素视为未置位.
pub fn dilate_n4(mask: ArrayView2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        mask[(r, c)]
            || (r > 0 && mask[(r - 1, c)])
            || (r + 1 < h && mask[(r + 1, c)])
            || (c > 0 && mask[(r, c - 1)])
            || (c + 1 < w && mask[(r, c + 1)])
    })
}

/// 由立方体中的非有限值得到平面掩膜. 任一光谱通道非有限即视为无效.
pub fn non_finite_mask<S: Data<Elem = f32>>(cube: &ArrayBase<S, Ix3>) -> Array2<bool> {
    let (h, w, _) = cube.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        cube.slice(s![r, c, ..]).iter().any(|v| !v.is_finite())
    })
}

/// 获取不包含任何无效像素的最大轴对齐矩形.
///
/// 面积相同时取先被扫描到的 (行优先) 矩形, 因此结果对相同输入是稳定的.
/// 若不存在有效像素, 则返回 `None`.
pub fn largest_valid_rect(invalid: ArrayView2<bool>) -> Option<Rect> {
    let (h, w) = invalid.dim();
    let mut heights = vec![0usize; w];
    let mut stack: Vec<usize> = Vec::with_capacity(w + 1);
    let mut best: Option<Rect> = None;

    for row in 0..h {
        for (col, height) in heights.iter_mut().enumerate() {
            *height = if invalid[(row, col)] { 0 } else { *height + 1 };
        }

        // 直方图最大矩形. 栈中高度单调不减.
        stack.clear();
        for col in 0..=w {
            let cur = if col == w { 0 } else { heights[col] };
            while let Some(&top) = stack.last() {
                if heights[top] <= cur {
                    break;
                }
                stack.pop();
                let height = heights[top];
                let left = stack.last().map_or(0, |&l| l + 1);
                let candidate = Rect {
                    top: row + 1 - height,
                    left,
                    height,
                    width: col - left,
                };
                if best.map_or(true, |b| candidate.area() > b.area()) {
                    best = Some(candidate);
                }
            }
            stack.push(col);
        }
    }
    best.filter(|r| !r.is_empty())
}

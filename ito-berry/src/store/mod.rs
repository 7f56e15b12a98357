//! 形变结果与评分的持久化.
//!
//! 每个测量拥有一个 [`ResultStore`], 以模板身份标签为键保存 [`TransformedData`].
//! 形变结果一旦写入就不再改变, 之后只有评分表会增长 (或被显式覆盖, 清空).

use std::collections::BTreeMap;
use std::io;

use ndarray::{Array2, Array3, ArrayView3};
use ndarray_npy::{ReadNpzError, WriteNpzError};
use thiserror::Error;

use crate::align::AlignMethod;
use crate::data::mask::{largest_valid_rect, non_finite_mask};
use crate::data::{IdTag, Rect};
use crate::metric::Score;
use crate::transform::Transform;
use crate::warp::WarpOutput;

mod dir;
mod mem;

pub use dir::DirStore;
pub use mem::MemStore;

/// 持久化错误.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 没有对应模板的形变结果.
    #[error("no transformed data for template `{0}`")]
    NotFound(IdTag),

    /// 对应模板的形变结果已经存在.
    #[error("transformed data for template `{0}` already exists")]
    AlreadyExists(IdTag),

    /// 同名评分已经存在.
    #[error("score `{name}` for template `{tag}` already exists")]
    ScoreExists {
        /// 模板身份标签.
        tag: IdTag,
        /// 评分名.
        name: String,
    },

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// 读取 npz 失败.
    #[error(transparent)]
    ReadNpz(#[from] ReadNpzError),

    /// 写入 npz 失败.
    #[error(transparent)]
    WriteNpz(#[from] WriteNpzError),

    /// 二进制头编解码失败.
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// 评分 JSON 编解码失败.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// 文件内容不符合预期.
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

/// 持久化结果.
pub type StoreResult<T> = Result<T, StoreError>;

/// 一个 (测量, 模板) 对的形变结果.
#[derive(Debug, Clone)]
pub struct TransformedData {
    /// 模板身份标签.
    pub template_id_tag: IdTag,

    /// 测试到模板的变换.
    pub transform: Transform,

    /// 模板坐标系下的完整反射率立方体, 无效体素为 `NaN`.
    pub cube: Array3<f32>,

    /// 无效区域掩膜.
    pub mask: Array2<bool>,

    /// 评分名到评分的映射.
    pub scores: BTreeMap<String, Score>,
}

impl TransformedData {
    /// 由形变结果创建, 评分表为空.
    pub fn new(template_id_tag: IdTag, transform: Transform, warped: WarpOutput) -> Self {
        Self {
            template_id_tag,
            transform,
            cube: warped.cube,
            mask: warped.mask,
            scores: BTreeMap::new(),
        }
    }

    /// 配准方法.
    #[inline]
    pub fn method(&self) -> AlignMethod {
        self.transform.method
    }

    /// 与模板立方体共同的有效区域: 既不在掩膜内, 模板体素也全部有限的最大矩形.
    ///
    /// 若两者平面形状不一致或不存在有效像素, 则返回 `None`.
    pub fn valid_region(&self, template: ArrayView3<f32>) -> Option<Rect> {
        let (h, w, _) = template.dim();
        if (h, w) != self.mask.dim() {
            return None;
        }
        let mut invalid = non_finite_mask(&template);
        invalid.zip_mut_with(&self.mask, |a, &m| *a |= m);
        largest_valid_rect(invalid.view())
    }
}

/// 单个测量的形变结果存储.
///
/// 实现必须可以在多个线程之间共享; 评分写入的互斥由调用方负责.
pub trait ResultStore: Send + Sync {
    /// 保存形变结果 (连同其评分表). 已存在且 `overwrite` 为 `false` 时返回
    /// [`StoreError::AlreadyExists`].
    fn save(&self, data: &TransformedData, overwrite: bool) -> StoreResult<()>;

    /// 读取模板 `template` 对应的形变结果.
    fn load(&self, template: &IdTag) -> StoreResult<TransformedData>;

    /// 所有已保存形变结果的模板标签, 升序.
    fn list(&self) -> StoreResult<Vec<IdTag>>;

    /// 只修改评分表, 添加名为 `name` 的评分.
    fn append_score(
        &self,
        template: &IdTag,
        name: &str,
        score: &Score,
        overwrite: bool,
    ) -> StoreResult<()>;

    /// 清空评分表.
    fn clear_scores(&self, template: &IdTag) -> StoreResult<()>;

    /// 是否已有模板 `template` 的形变结果.
    fn contains(&self, template: &IdTag) -> bool {
        self.list().map_or(false, |tags| tags.contains(template))
    }
}

/// 在评分表中插入评分, 处理覆盖语义.
pub(crate) fn insert_score(
    scores: &mut BTreeMap<String, Score>,
    template: &IdTag,
    name: &str,
    score: &Score,
    overwrite: bool,
) -> StoreResult<()> {
    if !overwrite && scores.contains_key(name) {
        return Err(StoreError::ScoreExists {
            tag: template.clone(),
            name: name.to_string(),
        });
    }
    scores.insert(name.to_string(), score.clone());
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::TransformedData;
    use crate::align::AlignMethod;
    use crate::data::{IdTag, Rect};
    use crate::transform::{Affine2, Transform};
    use crate::warp::WarpOutput;
    use ndarray::{Array2, Array3};

    /// 带有 NaN 与掩膜的测试记录.
    pub(crate) fn sample_record(tag: &str) -> TransformedData {
        let mut cube = Array3::from_shape_fn((6, 7, 3), |(r, c, k)| (r * 100 + c * 10 + k) as f32);
        let mut mask = Array2::from_elem((6, 7), false);
        for c in 0..7 {
            mask[(0, c)] = true;
            cube[(0, c, 0)] = f32::NAN;
            cube[(0, c, 1)] = f32::NAN;
            cube[(0, c, 2)] = f32::NAN;
        }
        TransformedData::new(
            IdTag::from_raw(tag),
            Transform::new(Affine2::new([[1.0, 0.01, -2.5], [0.0, 0.99, 1.25]]), AlignMethod::Features),
            WarpOutput { cube, mask },
        )
    }

    #[test]
    fn test_valid_region_excludes_mask_and_template_nan() {
        let rec = sample_record("t");
        let mut template = Array3::<f32>::ones((6, 7, 3));
        template[(5, 6, 1)] = f32::NAN;
        let rect = rec.valid_region(template.view()).unwrap();
        assert_eq!(
            rect,
            Rect {
                top: 1,
                left: 0,
                height: 5,
                width: 6
            }
        );
        assert!(rec.valid_region(Array3::<f32>::ones((5, 7, 3)).view()).is_none());
    }
}

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, Ix2, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use serde::{Deserialize, Serialize};

use super::{insert_score, ResultStore, StoreError, StoreResult, TransformedData};
use crate::align::AlignMethod;
use crate::data::IdTag;
use crate::metric::Score;
use crate::transform::{Affine2, Transform};

const NPZ_SUFFIX: &str = ".transformed.npz";
const META_SUFFIX: &str = ".meta.bin";
const SCORES_SUFFIX: &str = ".scores.json";

const TRANSFORM_ENTRY: &str = "transform.npy";
const CUBE_ENTRY: &str = "cube.npy";
const MASK_ENTRY: &str = "mask.npy";

/// `<tag>.meta.bin` 的内容.
#[derive(Debug, Serialize, Deserialize)]
struct RecordMeta {
    template_id_tag: IdTag,
    method: String,
}

/// 目录存储. 每条记录由同一目录下的三个文件组成:
///
/// + `<tag>.transformed.npz`: 变换矩阵 (2x3, f64), 形变立方体 (f32), 掩膜 (u8);
/// + `<tag>.meta.bin`: bincode 编码的模板标签与配准方法名;
/// + `<tag>.scores.json`: 评分表.
///
/// 添加评分只重写 `<tag>.scores.json`.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// 在 `dir` 下存储, 目录不存在时会被创建.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self::at(dir))
    }

    /// 在 `dir` 下存储, 不创建目录. 目录不存在时 [`ResultStore::list`] 为空.
    pub fn at<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 存储目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, tag: &IdTag, suffix: &str) -> PathBuf {
        self.dir.join(format!("{tag}{suffix}"))
    }

    fn exists(&self, tag: &IdTag) -> bool {
        self.path(tag, NPZ_SUFFIX).is_file()
    }

    fn write_arrays(&self, data: &TransformedData) -> StoreResult<()> {
        let file = File::create(self.path(&data.template_id_tag, NPZ_SUFFIX))?;
        let mut npz = NpzWriter::new(file);
        npz.add_array(TRANSFORM_ENTRY, &data.transform.affine.to_array())?;
        npz.add_array(CUBE_ENTRY, &data.cube)?;
        npz.add_array(MASK_ENTRY, &data.mask.mapv(u8::from))?;
        npz.finish()?;
        Ok(())
    }

    fn write_meta(&self, data: &TransformedData) -> StoreResult<()> {
        let meta = RecordMeta {
            template_id_tag: data.template_id_tag.clone(),
            method: data.method().name().to_string(),
        };
        let file = File::create(self.path(&data.template_id_tag, META_SUFFIX))?;
        bincode::serialize_into(BufWriter::new(file), &meta)?;
        Ok(())
    }

    fn read_meta(&self, tag: &IdTag) -> StoreResult<(IdTag, AlignMethod)> {
        let file = File::open(self.path(tag, META_SUFFIX))?;
        let meta: RecordMeta = bincode::deserialize_from(BufReader::new(file))?;
        let method = AlignMethod::from_name(&meta.method)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown method `{}`", meta.method)))?;
        Ok((meta.template_id_tag, method))
    }

    /// 先写临时文件再改名, 避免并发读到一半的评分表.
    fn write_scores(&self, tag: &IdTag, scores: &BTreeMap<String, Score>) -> StoreResult<()> {
        let path = self.path(tag, SCORES_SUFFIX);
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            serde_json::to_writer_pretty(BufWriter::new(file), scores)?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_scores(&self, tag: &IdTag) -> StoreResult<BTreeMap<String, Score>> {
        let path = self.path(tag, SCORES_SUFFIX);
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl ResultStore for DirStore {
    fn save(&self, data: &TransformedData, overwrite: bool) -> StoreResult<()> {
        let tag = &data.template_id_tag;
        if !overwrite && self.exists(tag) {
            return Err(StoreError::AlreadyExists(tag.clone()));
        }
        fs::create_dir_all(&self.dir)?;
        self.write_arrays(data)?;
        self.write_meta(data)?;
        self.write_scores(tag, &data.scores)?;
        log::debug!("saved transformed data `{tag}` to {}", self.dir.display());
        Ok(())
    }

    fn load(&self, template: &IdTag) -> StoreResult<TransformedData> {
        if !self.exists(template) {
            return Err(StoreError::NotFound(template.clone()));
        }
        let (stored_tag, method) = self.read_meta(template)?;
        if &stored_tag != template {
            return Err(StoreError::Corrupted(format!(
                "record `{template}` belongs to template `{stored_tag}`"
            )));
        }

        let mut npz = NpzReader::new(File::open(self.path(template, NPZ_SUFFIX))?)?;
        let matrix = npz.by_name::<OwnedRepr<f64>, Ix2>(TRANSFORM_ENTRY)?;
        let affine = Affine2::from_array(matrix.view()).ok_or_else(|| {
            StoreError::Corrupted(format!("transform of `{template}` is {:?}", matrix.dim()))
        })?;
        let cube: Array3<f32> = npz.by_name::<OwnedRepr<f32>, Ix3>(CUBE_ENTRY)?;
        let mask: Array2<u8> = npz.by_name::<OwnedRepr<u8>, Ix2>(MASK_ENTRY)?;
        let (h, w, _) = cube.dim();
        if mask.dim() != (h, w) {
            return Err(StoreError::Corrupted(format!(
                "mask {:?} does not match cube {:?}",
                mask.dim(),
                cube.dim()
            )));
        }

        Ok(TransformedData {
            template_id_tag: stored_tag,
            transform: Transform::new(affine, method),
            cube,
            mask: mask.mapv(|v| v != 0),
            scores: self.read_scores(template)?,
        })
    }

    fn list(&self) -> StoreResult<Vec<IdTag>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut tags = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(tag) = name.to_str().and_then(|n| n.strip_suffix(NPZ_SUFFIX)) {
                tags.push(IdTag::from_raw(tag));
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn append_score(
        &self,
        template: &IdTag,
        name: &str,
        score: &Score,
        overwrite: bool,
    ) -> StoreResult<()> {
        if !self.exists(template) {
            return Err(StoreError::NotFound(template.clone()));
        }
        let mut scores = self.read_scores(template)?;
        insert_score(&mut scores, template, name, score, overwrite)?;
        self.write_scores(template, &scores)
    }

    fn clear_scores(&self, template: &IdTag) -> StoreResult<()> {
        if !self.exists(template) {
            return Err(StoreError::NotFound(template.clone()));
        }
        self.write_scores(template, &BTreeMap::new())
    }

    #[inline]
    fn contains(&self, template: &IdTag) -> bool {
        self.exists(template)
    }
}

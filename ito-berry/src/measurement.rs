//! 测量与测量加载器.
//!
//! 核心流程只通过 [`Measurement`] 读取分析结果, 并通过它访问该测量的形变结果存储.
//! 本模块提供两种实现:
//!
//! + [`DirMeasurement`]: 数据存放在测量的主目录下;
//! + [`MemMeasurement`]: 全部数据保存在内存中.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{Ix2, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::ANALYSIS_NAME;
use crate::data::{AnalysisResults, AnalysisSettings, IdTag};
use crate::metric::Score;
use crate::store::{DirStore, MemStore, ResultStore, StoreError, TransformedData};

/// 读取或写入测量数据时的错误.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 缓存的分析结果与请求的设置不一致.
    #[error("analysis of `{0}` was produced with different settings")]
    SettingsMismatch(String),

    /// 缓存的分析结果使用了不同的参考采集.
    #[error("analysis of `{name}` uses reference `{found}`, expected `{expected}`")]
    ReferenceMismatch {
        /// 测量名.
        name: String,
        /// 请求的参考采集.
        expected: String,
        /// 缓存中的参考采集.
        found: String,
    },

    /// 没有缓存的分析结果.
    #[error("no analysis results for `{0}`")]
    Missing(String),

    /// 测量以只读方式打开.
    #[error("measurement `{0}` is read-only")]
    ReadOnly(String),

    /// 底层存储错误.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AnalysisError {
    /// 是否为 "没有对应形变结果".
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

/// 测量结果.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// 一次测量.
///
/// # 注意
///
/// 分析结果可能很大. 实现可以惰性加载, 并在 [`Measurement::release_analysis`]
/// 之后丢弃自身持有的副本; 已经交出去的 `Arc` 不受影响.
pub trait Measurement: Send + Sync {
    /// 身份标签.
    fn id_tag(&self) -> &IdTag;

    /// 便于阅读的名称.
    fn name(&self) -> &str;

    /// 分析结果 (去均值反射率立方体与平均反射率图).
    fn analysis_results(&self) -> AnalysisResult<Arc<AnalysisResults>>;

    /// 释放缓存的分析结果.
    fn release_analysis(&self) {}

    /// 形变结果存储.
    fn store(&self) -> &dyn ResultStore;

    /// 写操作之前的检查.
    fn writable(&self) -> AnalysisResult<()> {
        Ok(())
    }

    /// 读取模板 `template` 对应的形变结果.
    fn load_transformed_data(&self, template: &IdTag) -> AnalysisResult<TransformedData> {
        Ok(self.store().load(template)?)
    }

    /// 保存形变结果.
    fn save_transformed_data(&self, data: &TransformedData, overwrite: bool) -> AnalysisResult<()> {
        self.writable()?;
        Ok(self.store().save(data, overwrite)?)
    }

    /// 已有形变结果的模板标签.
    fn list_transformed_data(&self) -> AnalysisResult<Vec<IdTag>> {
        Ok(self.store().list()?)
    }

    /// 添加评分.
    fn append_score(
        &self,
        template: &IdTag,
        name: &str,
        score: &Score,
        overwrite: bool,
    ) -> AnalysisResult<()> {
        self.writable()?;
        Ok(self.store().append_score(template, name, score, overwrite)?)
    }

    /// 清空模板 `template` 对应的评分表.
    fn clear_scores(&self, template: &IdTag) -> AnalysisResult<()> {
        self.writable()?;
        Ok(self.store().clear_scores(template)?)
    }
}

/// 测量加载器: 一个模板加上一组待评分的测量.
pub trait MeasurementLoader {
    /// 测量类型.
    type Item: Measurement;

    /// 模板测量.
    fn template(&self) -> &Self::Item;

    /// 待评分的测量, 顺序即报表顺序.
    fn measurements(&self) -> &[Self::Item];
}

const HEADER_FILE: &str = "analysis.bin";
const CUBE_FILE: &str = "analysis.npz";
const TRANSFORMED_DIR: &str = "transformed";
const REFLECTANCE_ENTRY: &str = "reflectance.npy";
const MEAN_ENTRY: &str = "mean_reflectance.npy";

/// `analysis.bin` 的内容.
#[derive(Debug, Serialize, Deserialize)]
struct AnalysisHeader {
    settings: AnalysisSettings,
    reference_id: String,
}

/// 目录形式的测量.
///
/// 目录结构:
///
/// ```text
/// <home>/ITOCalibration/analysis.bin     设置与参考采集
/// <home>/ITOCalibration/analysis.npz     反射率立方体与平均反射率图
/// <home>/ITOCalibration/transformed/     DirStore
/// ```
pub struct DirMeasurement {
    home: PathBuf,
    name: String,
    acquisition_id: String,
    reference_id: String,
    settings: AnalysisSettings,
    read_only: bool,
    id_tag: OnceCell<IdTag>,
    cache: Mutex<Option<Arc<AnalysisResults>>>,
    store: DirStore,
}

impl DirMeasurement {
    /// 打开已有的测量.
    ///
    /// 缓存中的设置与参考采集必须与 `settings`, `reference_id` 一致.
    /// `read_only` 为 `true` 时不会创建任何文件或目录.
    pub fn open<P: AsRef<Path>>(
        home: P,
        acquisition_id: &str,
        settings: &AnalysisSettings,
        reference_id: &str,
        read_only: bool,
    ) -> AnalysisResult<Self> {
        let home = home.as_ref().to_path_buf();
        let name = display_name(&home);
        let header_path = home.join(ANALYSIS_NAME).join(HEADER_FILE);
        if !header_path.is_file() {
            return Err(AnalysisError::Missing(name));
        }
        let header = read_header(&header_path)?;
        if &header.settings != settings {
            return Err(AnalysisError::SettingsMismatch(name));
        }
        if header.reference_id != reference_id {
            return Err(AnalysisError::ReferenceMismatch {
                name,
                expected: reference_id.to_string(),
                found: header.reference_id,
            });
        }
        Self::with_header(home, name, acquisition_id, header, read_only)
    }

    /// 把分析结果写入 `home` 并打开.
    pub fn create<P: AsRef<Path>>(
        home: P,
        acquisition_id: &str,
        results: &AnalysisResults,
    ) -> AnalysisResult<Self> {
        let home = home.as_ref().to_path_buf();
        let root = home.join(ANALYSIS_NAME);
        fs::create_dir_all(&root).map_err(StoreError::from)?;

        let header = AnalysisHeader {
            settings: results.settings().clone(),
            reference_id: results.reference_id().to_string(),
        };
        let file = File::create(root.join(HEADER_FILE)).map_err(StoreError::from)?;
        bincode::serialize_into(BufWriter::new(file), &header).map_err(StoreError::from)?;

        let file = File::create(root.join(CUBE_FILE)).map_err(StoreError::from)?;
        let mut npz = NpzWriter::new(file);
        npz.add_array(REFLECTANCE_ENTRY, &results.reflectance())
            .map_err(StoreError::from)?;
        npz.add_array(MEAN_ENTRY, &results.mean_reflectance())
            .map_err(StoreError::from)?;
        npz.finish().map_err(StoreError::from)?;

        let name = display_name(&home);
        Self::with_header(home, name, acquisition_id, header, false)
    }

    fn with_header(
        home: PathBuf,
        name: String,
        acquisition_id: &str,
        header: AnalysisHeader,
        read_only: bool,
    ) -> AnalysisResult<Self> {
        let dir = home.join(ANALYSIS_NAME).join(TRANSFORMED_DIR);
        let store = if read_only {
            DirStore::at(dir)
        } else {
            DirStore::new(dir).map_err(StoreError::from)?
        };
        Ok(Self {
            home,
            name,
            acquisition_id: acquisition_id.to_string(),
            reference_id: header.reference_id,
            settings: header.settings,
            read_only,
            id_tag: OnceCell::new(),
            cache: Mutex::new(None),
            store,
        })
    }

    /// 测量主目录.
    #[inline]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// 分析设置.
    #[inline]
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    fn read_results(&self) -> AnalysisResult<AnalysisResults> {
        let path = self.home.join(ANALYSIS_NAME).join(CUBE_FILE);
        if !path.is_file() {
            return Err(AnalysisError::Missing(self.name.clone()));
        }
        let file = File::open(path).map_err(StoreError::from)?;
        let mut npz = NpzReader::new(file).map_err(StoreError::from)?;
        let reflectance = npz
            .by_name::<OwnedRepr<f32>, Ix3>(REFLECTANCE_ENTRY)
            .map_err(StoreError::from)?;
        let mean = npz
            .by_name::<OwnedRepr<f32>, Ix2>(MEAN_ENTRY)
            .map_err(StoreError::from)?;
        let (h, w, _) = reflectance.dim();
        if mean.dim() != (h, w) {
            return Err(StoreError::Corrupted(format!(
                "`{}`: mean reflectance {:?} does not match cube {:?}",
                self.name,
                mean.dim(),
                reflectance.dim()
            ))
            .into());
        }
        Ok(AnalysisResults::new(
            reflectance,
            mean,
            self.settings.clone(),
            self.reference_id.clone(),
        ))
    }
}

impl Measurement for DirMeasurement {
    fn id_tag(&self) -> &IdTag {
        self.id_tag
            .get_or_init(|| IdTag::derive(&self.acquisition_id, &self.reference_id))
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    fn analysis_results(&self) -> AnalysisResult<Arc<AnalysisResults>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(res) = cache.as_ref() {
            return Ok(Arc::clone(res));
        }
        let res = Arc::new(self.read_results()?);
        *cache = Some(Arc::clone(&res));
        Ok(res)
    }

    fn release_analysis(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[inline]
    fn store(&self) -> &dyn ResultStore {
        &self.store
    }

    fn writable(&self) -> AnalysisResult<()> {
        if self.read_only {
            Err(AnalysisError::ReadOnly(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

fn display_name(home: &Path) -> String {
    home.file_name()
        .map_or_else(|| home.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn read_header(path: &Path) -> AnalysisResult<AnalysisHeader> {
    let file = File::open(path).map_err(StoreError::from)?;
    Ok(bincode::deserialize_from(BufReader::new(file)).map_err(StoreError::from)?)
}

/// 内存中的测量.
pub struct MemMeasurement {
    name: String,
    id_tag: IdTag,
    results: Arc<AnalysisResults>,
    store: MemStore,
}

impl MemMeasurement {
    /// 由名称, 采集身份与分析结果创建. 身份标签由采集身份和分析结果的参考采集派生.
    pub fn new(name: impl Into<String>, acquisition_id: &str, results: AnalysisResults) -> Self {
        let id_tag = IdTag::derive(acquisition_id, results.reference_id());
        Self {
            name: name.into(),
            id_tag,
            results: Arc::new(results),
            store: MemStore::new(),
        }
    }

    /// 形变结果存储.
    #[inline]
    pub fn mem_store(&self) -> &MemStore {
        &self.store
    }
}

impl Measurement for MemMeasurement {
    #[inline]
    fn id_tag(&self) -> &IdTag {
        &self.id_tag
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn analysis_results(&self) -> AnalysisResult<Arc<AnalysisResults>> {
        Ok(Arc::clone(&self.results))
    }

    #[inline]
    fn store(&self) -> &dyn ResultStore {
        &self.store
    }
}

/// 由已构造好的测量组成的加载器.
pub struct VecLoader<M> {
    template: M,
    measurements: Vec<M>,
}

impl<M: Measurement> VecLoader<M> {
    /// 初始化.
    #[inline]
    pub fn new(template: M, measurements: Vec<M>) -> Self {
        Self {
            template,
            measurements,
        }
    }
}

impl<M: Measurement> MeasurementLoader for VecLoader<M> {
    type Item = M;

    #[inline]
    fn template(&self) -> &M {
        &self.template
    }

    #[inline]
    fn measurements(&self) -> &[M] {
        &self.measurements
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisError, DirMeasurement, MemMeasurement, Measurement};
    use crate::data::{AnalysisSettings, IdTag};
    use crate::store::tests::sample_record;
    use crate::test_utils::{analysis_from_image, smooth_image};
    use std::sync::Arc;

    fn fresh_home(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ito-berry-meas-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_dir_measurement_round_trip() {
        let home = fresh_home("round-trip").join("cell7");
        let res = analysis_from_image(&smooth_image((9, 11), 3, 1.0), 4, "pws:ref");
        let created = DirMeasurement::create(&home, "pws:cell7", &res).unwrap();
        assert_eq!(created.name(), "cell7");
        assert_eq!(created.id_tag(), &IdTag::derive("pws:cell7", "pws:ref"));

        let opened = DirMeasurement::open(&home, "pws:cell7", res.settings(), "pws:ref", true).unwrap();
        let back = opened.analysis_results().unwrap();
        assert_eq!(back.reflectance(), res.reflectance());
        assert_eq!(back.mean_reflectance(), res.mean_reflectance());
        let again = opened.analysis_results().unwrap();
        assert!(Arc::ptr_eq(&back, &again));
        opened.release_analysis();
        assert!(!Arc::ptr_eq(&back, &opened.analysis_results().unwrap()));

        assert!(matches!(
            opened.save_transformed_data(&sample_record("x"), true),
            Err(AnalysisError::ReadOnly(_))
        ));
        created.save_transformed_data(&sample_record("x"), true).unwrap();
        assert_eq!(opened.list_transformed_data().unwrap(), vec![IdTag::from_raw("x")]);
    }

    #[test]
    fn test_open_checks_header() {
        let home = fresh_home("header");
        let res = analysis_from_image(&smooth_image((5, 5), 1, 1.0), 3, "r1");
        assert!(matches!(
            DirMeasurement::open(&home, "a", res.settings(), "r1", true),
            Err(AnalysisError::Missing(_))
        ));
        DirMeasurement::create(&home, "a", &res).unwrap();

        let mut other = AnalysisSettings::recommended();
        other.filter_cutoff = None;
        assert!(matches!(
            DirMeasurement::open(&home, "a", &other, "r1", true),
            Err(AnalysisError::SettingsMismatch(_))
        ));
        assert!(matches!(
            DirMeasurement::open(&home, "a", res.settings(), "r2", true),
            Err(AnalysisError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn test_mem_measurement_not_found() {
        let res = analysis_from_image(&smooth_image((5, 5), 1, 1.0), 3, "r");
        let m = MemMeasurement::new("m", "acq:1", res);
        assert_eq!(m.id_tag().as_str(), "acq_1__r");
        let err = m.load_transformed_data(&IdTag::from_raw("t")).unwrap_err();
        assert!(err.is_not_found());
    }
}

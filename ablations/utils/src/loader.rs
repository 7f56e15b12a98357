//! 对 `ito-berry::measurement` 的更一层封装. 提供更直接的目录加载器.

use ito_berry::data::AnalysisSettings;
use ito_berry::measurement::{AnalysisError, DirMeasurement, VecLoader};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 获取校准数据根目录.
///
/// 1. 若环境变量 `$ITO_CALIBRATION_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/ITOCalibration`.
pub fn calibration_dir_from_env_or_home() -> Option<PathBuf> {
    ito_berry::config::calibration_dir_from_env_or_home()
}

/// 获取模板测量的目录名.
///
/// 1. 若环境变量 `$ITO_TEMPLATE` 非空, 则返回其值;
/// 2. 否则, 返回 `template`.
pub fn template_name_from_env() -> String {
    match env::var("ITO_TEMPLATE") {
        Ok(t) if !t.is_empty() => t,
        _ => "template".to_string(),
    }
}

/// 加载 `root` 下的所有测量. 每个子目录为一个测量, 目录名同时用作采集身份.
///
/// 名为 `template` 的子目录为模板, 其余按目录名排序. 没有分析结果的子目录会被跳过.
pub fn dir_loader<P: AsRef<Path>>(
    root: P,
    template: &str,
    settings: &AnalysisSettings,
    reference_id: &str,
) -> Result<VecLoader<DirMeasurement>, AnalysisError> {
    let root = root.as_ref();
    let open = |name: &str| DirMeasurement::open(root.join(name), name, settings, reference_id, false);

    let mut names: Vec<String> = fs::read_dir(root)
        .map_err(ito_berry::store::StoreError::from)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n != template)
        .collect();
    names.sort();

    let mut measurements = Vec::with_capacity(names.len());
    for name in names {
        match open(&name) {
            Ok(m) => measurements.push(m),
            Err(AnalysisError::Missing(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(VecLoader::new(open(template)?, measurements))
}

/// 从 `$ITO_CALIBRATION_DIR` 或者 `$HOME/ITOCalibration` 下以推荐设置加载测量.
pub fn dir_loader_from_env_or_home(reference_id: &str) -> Option<Result<VecLoader<DirMeasurement>, AnalysisError>> {
    let root = calibration_dir_from_env_or_home()?;
    root.is_dir().then(|| {
        dir_loader(
            &root,
            &template_name_from_env(),
            &AnalysisSettings::recommended(),
            reference_id,
        )
    })
}

//! 调试可视化旁路.
//!
//! 打开 `plot` feature 后, [`DebugSink`] 会把中间结果以 8-bit 灰度 PNG 写入指定目录;
//! 否则所有写入都是空操作. 写入失败只记录日志, 不影响调用方的结果.

use std::io;
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;

/// 调试图像输出目录.
#[derive(Debug, Clone)]
pub struct DebugSink {
    dir: PathBuf,
    prefix: String,
}

impl DebugSink {
    /// 在 `dir` 输出调试图像, 目录不存在时会被创建.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: String::new(),
        })
    }

    /// 输出目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 派生一个文件名带有 `label` 前缀的输出.
    pub fn scoped(&self, label: &str) -> Self {
        let prefix = if self.prefix.is_empty() {
            label.to_string()
        } else {
            format!("{}.{label}", self.prefix)
        };
        Self {
            dir: self.dir.clone(),
            prefix,
        }
    }

    /// 图像 `name` 对应的文件路径.
    pub fn path_of(&self, name: &str) -> PathBuf {
        if self.prefix.is_empty() {
            self.dir.join(format!("{name}.png"))
        } else {
            self.dir.join(format!("{}.{name}.png", self.prefix))
        }
    }

    /// 以线性拉伸到 `[0, 255]` 的方式保存灰度图. 非有限值写作 0.
    pub fn save_gray(&self, name: &str, img: ArrayView2<f64>) {
        let path = self.path_of(name);
        cfg_if::cfg_if! {
            if #[cfg(feature = "plot")] {
                if let Err(e) = write_png(&path, img) {
                    log::warn!("cannot write debug image {}: {e}", path.display());
                }
            } else {
                log::trace!("debug image {} skipped ({:?}), `plot` is off", path.display(), img.dim());
            }
        }
    }

    /// 保存二值掩膜, 置位像素为白色.
    pub fn save_mask(&self, name: &str, mask: ArrayView2<bool>) {
        let img = mask.mapv(|m| if m { 1.0 } else { 0.0 });
        self.save_gray(name, img.view());
    }
}

#[cfg(feature = "plot")]
fn write_png(path: &Path, img: ArrayView2<f64>) -> image::ImageResult<()> {
    let (lo, hi) = img
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (height, width) = img.dim();
    let mut buf = image::GrayImage::new(width as u32, height as u32);
    for ((h, w), &pix) in img.indexed_iter() {
        let g = if pix.is_finite() {
            ((pix - lo) / span * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            0
        };
        buf.put_pixel(w as u32, h as u32, image::Luma([g]));
    }
    buf.save(path)
}

#[cfg(test)]
mod tests {
    use super::DebugSink;

    #[test]
    fn test_scoped_paths() {
        let dir = std::env::temp_dir().join("ito-berry-debug-paths");
        let sink = DebugSink::new(&dir).unwrap();
        let p = sink.scoped("m1").scoped("xcorr").path_of("surface");
        assert_eq!(p, dir.join("m1.xcorr.surface.png"));
        assert_eq!(sink.path_of("a"), dir.join("a.png"));
    }

    #[cfg(feature = "plot")]
    #[test]
    fn test_writes_png() {
        let dir = std::env::temp_dir().join("ito-berry-debug-png");
        let sink = DebugSink::new(&dir).unwrap();
        let img = ndarray::Array2::from_shape_fn((8, 9), |(r, c)| (r * c) as f64);
        sink.save_gray("ramp", img.view());
        assert!(sink.path_of("ramp").exists());
    }
}

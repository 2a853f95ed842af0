use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;
use regex::Regex;

use crate::error::{Error, Result};
use crate::indexer::{LoadImage, SourceImage};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {wide_bar} {pos:>7}/{len:7} {per_sec} ETA {eta} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// 根据后缀名列表构造匹配扩展名的正则，多个后缀用逗号分隔
pub fn suffix_regex(suffix: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("(?i)^({})$", suffix.replace(',', "|")))
}

/// 由文件名生成图片 ID，例如 `1980.001.png` 转换为 `a1980_001`
///
/// 规则为添加前缀 `a`，将 `.` 替换为 `_`，并去掉最后四个字符（扩展名）
pub fn make_id(path: impl AsRef<Path>) -> String {
    let name = path.as_ref().file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = name.replace('.', "_");
    let keep = name.chars().count().saturating_sub(4);
    std::iter::once('a').chain(name.chars().take(keep)).collect()
}

/// 解码图片文件并转换为 RGB
pub fn load_image(path: impl AsRef<Path>, id: impl Into<String>) -> Result<SourceImage> {
    let path = path.as_ref();
    let id = id.into();
    let image = match image::open(path) {
        Ok(image) => image.to_rgb8(),
        Err(e) => return Err(Error::ImageLoad { id, reason: e.to_string() }),
    };
    Ok(SourceImage {
        id,
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw(),
        source: Some(path.to_string_lossy().into_owned()),
    })
}

/// 磁盘上的图片文件，在索引线程中解码
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub id: String,
    pub path: PathBuf,
}

impl LoadImage for ImageFile {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(self) -> Result<SourceImage> {
        load_image(&self.path, self.id)
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::region::Region;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// 图片尺寸非法，或像素缓冲区长度与尺寸不符
    #[error("invalid image dimension: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    /// 某个区域没有选中任何像素
    #[error("region {region} of a {width}x{height} image is empty")]
    EmptyRegion { region: Region, width: u32, height: u32 },

    /// 两个特征向量长度不一致
    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("image not found in index: {0}")]
    NotFound(String),

    /// 索引文件无法读取或已损坏
    #[error("corrupt index file {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// 查询使用的描述符配置与建立索引时不一致
    #[error("descriptor config mismatch: index uses {index}, query uses {query}")]
    ConfigMismatch { index: String, query: String },

    #[error("index is empty")]
    EmptyIndex,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 外部图片加载失败
    #[error("failed to load image {id}: {reason}")]
    ImageLoad { id: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptIndex { path: path.into(), reason: reason.to_string() }
    }
}

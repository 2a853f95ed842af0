use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorConfig, FeatureVector, Query};
use crate::error::{Error, Result};

pub type ImageId = String;

/// 索引文件头部的魔数
pub const MAGIC: [u8; 4] = *b"CSIX";
/// 索引文件格式版本
pub const VERSION: u32 = 1;

/// 图片的附加信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// 图片来源，通常为文件路径
    pub source: Option<String>,
    /// 计算区域划分时的图片尺寸
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ImageId,
    pub vector: FeatureVector,
    pub metadata: Metadata,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    config: &'a DescriptorConfig,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct Snapshot {
    config: DescriptorConfig,
    entries: Vec<IndexEntry>,
}

/// 图片 ID 到特征向量的映射，保持插入顺序
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    config: DescriptorConfig,
    dim: usize,
    entries: Vec<IndexEntry>,
    positions: HashMap<ImageId, usize>,
}

impl FeatureIndex {
    /// 创建一个空索引，之后加入的向量都必须由 `config` 生成
    pub fn new(config: DescriptorConfig) -> Result<Self> {
        config.validate()?;
        let dim = config.dim();
        Ok(Self { config, dim, entries: vec![], positions: HashMap::new() })
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// 特征向量长度
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// 添加或覆盖一条记录，覆盖时保留原有位置并返回旧记录
    pub fn put(
        &mut self,
        id: impl Into<ImageId>,
        vector: FeatureVector,
        metadata: Metadata,
    ) -> Result<Option<IndexEntry>> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        let id = id.into();
        match self.positions.get(&id) {
            Some(&pos) => {
                let entry = IndexEntry { id, vector, metadata };
                Ok(Some(std::mem::replace(&mut self.entries[pos], entry)))
            }
            None => {
                self.positions.insert(id.clone(), self.entries.len());
                self.entries.push(IndexEntry { id, vector, metadata });
                Ok(None)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&FeatureVector> {
        self.entry(id).map(|e| &e.vector)
    }

    pub fn entry(&self, id: &str) -> Result<&IndexEntry> {
        match self.positions.get(id) {
            Some(&pos) => Ok(&self.entries[pos]),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<IndexEntry> {
        let pos = self.positions.remove(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let entry = self.entries.remove(pos);
        for e in &self.entries[pos..] {
            if let Some(p) = self.positions.get_mut(&e.id) {
                *p -= 1;
            }
        }
        Ok(entry)
    }

    /// 按插入顺序遍历所有 `(id, vector)`，可重复调用
    pub fn all(&self) -> impl Iterator<Item = (&str, &FeatureVector)> + '_ {
        self.entries.iter().map(|e| (e.id.as_str(), &e.vector))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// 检查查询向量是否与索引使用相同的描述符配置
    pub fn check_query(&self, query: &Query) -> Result<()> {
        if query.config != self.config {
            return Err(Error::ConfigMismatch {
                index: self.config.to_string(),
                query: query.config.to_string(),
            });
        }
        if query.vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.vector.len() });
        }
        Ok(())
    }

    /// 保存到文件
    ///
    /// 先写入同目录下的临时文件，再重命名覆盖目标文件，读取方不会看到写了一半的索引
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let payload = bincode::serialize(&SnapshotRef { config: &self.config, entries: &self.entries })
            .map_err(io::Error::other)?;
        write_payload(path, &payload)?;
        info!("saved {} images to {}", self.len(), path.display());
        Ok(())
    }

    /// 从文件加载索引，文件无法读取或内容损坏时返回 `CorruptIndex`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::corrupt(path, e))?;
        let payload = read_payload(path, &data)?;

        let snapshot: Snapshot =
            bincode::deserialize(payload).map_err(|e| Error::corrupt(path, e))?;
        snapshot.config.validate().map_err(|e| Error::corrupt(path, e))?;

        let mut index = Self::new(snapshot.config).map_err(|e| Error::corrupt(path, e))?;
        for entry in snapshot.entries {
            if index.contains(&entry.id) {
                return Err(Error::corrupt(path, format!("duplicated image id {}", entry.id)));
            }
            if entry.vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::corrupt(path, format!("non-finite feature in {}", entry.id)));
            }
            index
                .put(entry.id, entry.vector, entry.metadata)
                .map_err(|e| Error::corrupt(path, e))?;
        }

        debug!("loaded {} images from {} ({})", index.len(), path.display(), index.config);
        Ok(index)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// 写入临时文件后重命名，失败时删除临时文件
fn write_payload(path: &Path, payload: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        writer.write_u64::<LittleEndian>(payload.len() as u64)?;
        writer.write_all(blake3::hash(payload).as_bytes())?;
        writer.write_all(payload)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        if tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("failed to remove {}: {}", tmp.display(), e);
            }
        }
        return Err(e.into());
    }
    Ok(())
}

/// 校验文件头并返回数据部分
fn read_payload<'a>(path: &Path, data: &'a [u8]) -> Result<&'a [u8]> {
    let mut cursor = Cursor::new(data);
    let header = (|| -> io::Result<_> {
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let len = cursor.read_u64::<LittleEndian>()?;
        let mut hash = [0u8; 32];
        cursor.read_exact(&mut hash)?;
        Ok((magic, version, len, hash))
    })();
    let (magic, version, len, hash) = header.map_err(|e| Error::corrupt(path, e))?;

    if magic != MAGIC {
        return Err(Error::corrupt(path, "bad magic number"));
    }
    if version != VERSION {
        return Err(Error::corrupt(path, format!("unsupported version {}", version)));
    }
    let payload = &data[cursor.position() as usize..];
    if payload.len() as u64 != len {
        return Err(Error::corrupt(
            path,
            format!("expected {} bytes of payload, found {}", len, payload.len()),
        ));
    }
    if blake3::hash(payload) != blake3::Hash::from_bytes(hash) {
        return Err(Error::corrupt(path, "checksum mismatch"));
    }
    Ok(payload)
}

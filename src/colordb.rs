use std::fs;
use std::io;

use indicatif::ProgressBar;
use log::info;

use crate::config::ConfDir;
use crate::descriptor::{DescriptorConfig, DescriptorPipeline};
use crate::error::{Error, Result};
use crate::index::{FeatureIndex, IndexEntry};
use crate::indexer::{IndexReport, Indexer, LoadImage, SourceImage};
use crate::pixels::PixelBuffer;
use crate::search::{Neighbor, SearchParams, Searcher};

pub struct ColorDBBuilder {
    conf_dir: ConfDir,
    descriptor: Option<DescriptorConfig>,
    default_descriptor: Option<DescriptorConfig>,
    create: bool,
    pb: ProgressBar,
}

impl ColorDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self {
            conf_dir,
            descriptor: None,
            default_descriptor: None,
            create: false,
            pb: ProgressBar::hidden(),
        }
    }

    /// 指定描述符配置，已有索引的配置与之不同时打开失败
    pub fn descriptor(mut self, config: Option<DescriptorConfig>) -> Self {
        self.descriptor = config;
        self
    }

    /// 索引文件不存在时使用的描述符配置
    pub fn default_descriptor(mut self, config: DescriptorConfig) -> Self {
        self.default_descriptor = Some(config);
        self
    }

    /// 索引文件不存在时是否创建新索引
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn open(self) -> Result<ColorDB> {
        let path = self.conf_dir.index();
        let index = if path.exists() {
            let index = FeatureIndex::load(&path)?;
            info!("opened index {} with {} images", path.display(), index.len());
            if let Some(config) = &self.descriptor {
                if config != index.config() {
                    return Err(Error::ConfigMismatch {
                        index: index.config().to_string(),
                        query: config.to_string(),
                    });
                }
            }
            index
        } else if self.create {
            let config = self.descriptor.or(self.default_descriptor).ok_or_else(|| {
                Error::InvalidConfig("no descriptor config for a new index".to_string())
            })?;
            info!("creating new index {} ({})", path.display(), config);
            FeatureIndex::new(config)?
        } else {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("index file {} does not exist", path.display()),
            )));
        };

        let pipeline = DescriptorPipeline::new(index.config().clone())?;
        let indexer = Indexer::new(pipeline).progress(self.pb);
        Ok(ColorDB { conf_dir: self.conf_dir, index, indexer })
    }
}

/// 保存在配置目录中的颜色索引
pub struct ColorDB {
    conf_dir: ConfDir,
    index: FeatureIndex,
    indexer: Indexer,
}

impl ColorDB {
    pub fn index(&self) -> &FeatureIndex {
        &self.index
    }

    pub fn config(&self) -> &DescriptorConfig {
        self.index.config()
    }

    /// 添加图片到索引，需要调用 `save` 才会写入磁盘
    ///
    /// # Arguments
    ///
    /// * `images` - 待添加的图片，ID 重复时覆盖旧记录
    pub fn add_images<I, T>(&mut self, images: I) -> Result<IndexReport>
    where
        I: IntoIterator<Item = T>,
        T: LoadImage,
    {
        self.indexer.index_dataset(&mut self.index, images)
    }

    /// 搜索与给定图片相似的图片
    ///
    /// # Arguments
    ///
    /// * `image` - 查询图片
    /// * `searcher` - 距离与排序方式
    /// * `params` - 结果数量与排除项
    pub fn search_image(
        &self,
        image: &SourceImage,
        searcher: &Searcher,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>> {
        let pixels = PixelBuffer::new(image.width, image.height, &image.pixels)?;
        let query = self.indexer.pipeline().query(&pixels)?;
        searcher.search(&query, &self.index, params)
    }

    pub fn remove(&mut self, id: &str) -> Result<IndexEntry> {
        self.index.remove(id)
    }

    /// 将索引写入配置目录
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(self.conf_dir.path())?;
        self.index.save(self.conf_dir.index())
    }
}

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use rayon::prelude::*;

use crate::descriptor::{DescriptorPipeline, FeatureVector};
use crate::error::{Error, Result};
use crate::index::{FeatureIndex, ImageId, Metadata};
use crate::pixels::PixelBuffer;

/// 已解码的图片
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    /// 行优先的 RGB 数据
    pub pixels: Vec<u8>,
    pub source: Option<String>,
}

/// 可以延迟加载的图片，加载在工作线程中进行
pub trait LoadImage: Send {
    fn id(&self) -> &str;

    fn load(self) -> Result<SourceImage>;
}

impl LoadImage for SourceImage {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(self) -> Result<SourceImage> {
        Ok(self)
    }
}

/// 一次批量索引的结果
#[derive(Debug, Default)]
pub struct IndexReport {
    pub succeeded: Vec<ImageId>,
    pub failed: Vec<(ImageId, Error)>,
}

impl IndexReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Indexer {
    pipeline: DescriptorPipeline,
    batch_size: usize,
    pb: ProgressBar,
}

impl Indexer {
    pub const DEFAULT_BATCH_SIZE: usize = 1024;

    pub fn new(pipeline: DescriptorPipeline) -> Self {
        Self { pipeline, batch_size: Self::DEFAULT_BATCH_SIZE, pb: ProgressBar::hidden() }
    }

    /// 每批并行计算的图片数量，一批计算完成后才写入索引
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn pipeline(&self) -> &DescriptorPipeline {
        &self.pipeline
    }

    /// 计算单张图片的特征向量
    pub fn describe(&self, image: &SourceImage) -> Result<(FeatureVector, Metadata)> {
        let pixels = PixelBuffer::new(image.width, image.height, &image.pixels)?;
        let vector = self.pipeline.describe(&pixels)?;
        let metadata =
            Metadata { source: image.source.clone(), width: image.width, height: image.height };
        Ok((vector, metadata))
    }

    /// 批量索引图片
    ///
    /// 单张图片失败只会被记录在报告中，不会中断整个过程；
    /// 索引的描述符配置与当前配置不一致时直接返回错误
    pub fn index_dataset<I, T>(&self, index: &mut FeatureIndex, images: I) -> Result<IndexReport>
    where
        I: IntoIterator<Item = T>,
        T: LoadImage,
    {
        if index.config() != self.pipeline.config() {
            return Err(Error::ConfigMismatch {
                index: index.config().to_string(),
                query: self.pipeline.config().to_string(),
            });
        }

        let mut report = IndexReport::default();
        let mut images = images.into_iter();
        loop {
            let batch = images.by_ref().take(self.batch_size).collect::<Vec<_>>();
            if batch.is_empty() {
                break;
            }
            info!("indexing images: {} + {}", report.total(), batch.len());

            // 并行计算，按输入顺序依次写入
            let described = batch
                .into_par_iter()
                .progress_with(self.pb.clone())
                .map(|image| {
                    let id = image.id().to_owned();
                    let result = image.load().and_then(|image| self.describe(&image));
                    (id, result)
                })
                .collect::<Vec<_>>();

            for (id, result) in described {
                match result.and_then(|(vector, metadata)| index.put(id.clone(), vector, metadata)) {
                    Ok(_) => report.succeeded.push(id),
                    Err(e) => {
                        warn!("failed to index {}: {}", id, e);
                        report.failed.push((id, e));
                    }
                }
            }
        }

        info!("indexed {} images, {} failed", report.succeeded.len(), report.failed.len());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorConfig, Quantization};
    use crate::region::Region;

    fn config() -> DescriptorConfig {
        DescriptorConfig::new(Quantization::hsv(4, 4, 4), 0.75)
    }

    fn solid(id: &str, width: u32, height: u32, rgb: [u8; 3]) -> SourceImage {
        SourceImage {
            id: id.to_string(),
            width,
            height,
            pixels: rgb.repeat((width * height) as usize),
            source: Some(format!("{id}.png")),
        }
    }

    struct Broken(String);

    impl LoadImage for Broken {
        fn id(&self) -> &str {
            &self.0
        }

        fn load(self) -> Result<SourceImage> {
            Err(Error::ImageLoad { id: self.0, reason: "unsupported format".to_string() })
        }
    }

    enum Item {
        Ok(SourceImage),
        Broken(Broken),
    }

    impl LoadImage for Item {
        fn id(&self) -> &str {
            match self {
                Item::Ok(i) => i.id(),
                Item::Broken(b) => b.id(),
            }
        }

        fn load(self) -> Result<SourceImage> {
            match self {
                Item::Ok(i) => i.load(),
                Item::Broken(b) => b.load(),
            }
        }
    }

    #[test]
    fn test_index_dataset() {
        let indexer = Indexer::new(DescriptorPipeline::new(config()).unwrap()).batch_size(2);
        let mut index = FeatureIndex::new(config()).unwrap();
        let images = ["e", "d", "c", "b", "a"].map(|id| solid(id, 16, 12, [id.as_bytes()[0], 0, 0]));
        let report = indexer.index_dataset(&mut index, images).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.succeeded, ["e", "d", "c", "b", "a"]);
        let ids = index.all().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(ids, ["e", "d", "c", "b", "a"]);
        assert_eq!(index.entry("c").unwrap().metadata.width, 16);
    }

    #[test]
    fn test_partial_failure() {
        let indexer = Indexer::new(DescriptorPipeline::new(config()).unwrap());
        let mut index = FeatureIndex::new(config()).unwrap();

        let mut bad_buffer = solid("short", 8, 8, [0, 0, 0]);
        bad_buffer.pixels.pop();

        let images = vec![
            Item::Ok(solid("red", 8, 8, [255, 0, 0])),
            Item::Ok(solid("tiny", 1, 1, [255, 0, 0])),
            Item::Broken(Broken("broken".to_string())),
            Item::Ok(bad_buffer),
            Item::Ok(solid("blue", 8, 8, [0, 0, 255])),
        ];
        let report = indexer.index_dataset(&mut index, images).unwrap();

        assert_eq!(report.total(), 5);
        assert_eq!(report.succeeded, ["red", "blue"]);
        let failed = report.failed.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
        assert_eq!(failed, ["tiny", "broken", "short"]);
        assert!(matches!(report.failed[0].1, Error::EmptyRegion { region: Region::TopLeft, .. }));
        assert!(matches!(report.failed[1].1, Error::ImageLoad { .. }));
        assert!(matches!(report.failed[2].1, Error::InvalidDimension { .. }));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_config_mismatch() {
        let indexer = Indexer::new(DescriptorPipeline::new(config()).unwrap());
        let other = DescriptorConfig::new(Quantization::hsv(8, 4, 4), 0.75);
        let mut index = FeatureIndex::new(other).unwrap();
        let r = indexer.index_dataset(&mut index, vec![solid("a", 4, 4, [0, 0, 0])]);
        assert!(matches!(r, Err(Error::ConfigMismatch { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn test_duplicate_ids_overwrite() {
        let indexer = Indexer::new(DescriptorPipeline::new(config()).unwrap());
        let mut index = FeatureIndex::new(config()).unwrap();
        let images = vec![solid("a", 8, 8, [255, 0, 0]), solid("a", 8, 8, [0, 0, 255])];
        let report = indexer.index_dataset(&mut index, images).unwrap();
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(index.len(), 1);
        let expected = indexer.describe(&solid("a", 8, 8, [0, 0, 255])).unwrap().0;
        assert_eq!(index.get("a").unwrap(), &expected);
    }
}

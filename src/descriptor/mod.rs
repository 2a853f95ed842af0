mod color;

use std::fmt;
use std::ops::Range;

pub use color::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;
use crate::region::{Region, RegionMasks, RegionPartitioner};

pub type FeatureVector = Vec<f32>;

/// 一个描述符阶段，对每个区域输出定长的子向量
///
/// 输出按区域的规范顺序拼接，长度必须为 `Region::COUNT * region_len()`
pub trait Descriptor: Send + Sync {
    /// 阶段名称，距离计算按此名称设置权重
    fn name(&self) -> &'static str;

    /// 单个区域的子向量长度
    fn region_len(&self) -> usize;

    fn describe(&self, pixels: &PixelBuffer, masks: &RegionMasks) -> Result<Vec<f32>>;
}

/// 单个描述符阶段的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageConfig {
    Color(Quantization),
}

impl StageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Color(_) => "color",
        }
    }

    pub fn region_len(&self) -> usize {
        match self {
            Self::Color(q) => q.len(),
        }
    }

    fn build(&self) -> Result<Box<dyn Descriptor>> {
        match self {
            Self::Color(q) => Ok(Box::new(ColorHistogram::new(*q)?)),
        }
    }
}

impl fmt::Display for StageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(q) => write!(f, "color({})", q),
        }
    }
}

/// 描述符配置，会被完整记录在索引文件中
///
/// 只有配置完全相同时，两个特征向量才可以比较
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    /// 中心椭圆半轴占半宽/半高的比例
    pub ellipse_fraction: f32,
    pub stages: Vec<StageConfig>,
}

impl DescriptorConfig {
    /// 只包含颜色直方图阶段的配置
    pub fn new(quantization: Quantization, ellipse_fraction: f32) -> Self {
        Self { ellipse_fraction, stages: vec![StageConfig::Color(quantization)] }
    }

    /// 在现有阶段之后追加一个阶段
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidConfig("no descriptor stage".to_string()));
        }
        let mut names = self.stages.iter().map(|s| s.name()).collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.stages.len() {
            return Err(Error::InvalidConfig("duplicated descriptor stage".to_string()));
        }
        for stage in &self.stages {
            match stage {
                StageConfig::Color(q) => q.validate()?,
            }
        }
        RegionPartitioner::new(self.ellipse_fraction)?;
        Ok(())
    }

    /// 特征向量总长度
    pub fn dim(&self) -> usize {
        self.stages.iter().map(|s| s.region_len() * Region::COUNT).sum()
    }

    pub fn layout(&self) -> VectorLayout {
        let mut segments = Vec::with_capacity(self.stages.len() * Region::COUNT);
        let mut offset = 0;
        for stage in &self.stages {
            let len = stage.region_len();
            for region in Region::ALL {
                segments.push(Segment { stage: stage.name(), region, range: offset..offset + len });
                offset += len;
            }
        }
        VectorLayout { segments, len: offset }
    }
}

impl fmt::Display for DescriptorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ellipse={}", self.ellipse_fraction)?;
        for stage in &self.stages {
            write!(f, " {}", stage)?;
        }
        Ok(())
    }
}

/// 特征向量中属于某个阶段、某个区域的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub stage: &'static str,
    pub region: Region,
    pub range: Range<usize>,
}

/// 特征向量的分段布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorLayout {
    segments: Vec<Segment>,
    len: usize,
}

impl VectorLayout {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// 查询向量以及生成它的配置
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub config: DescriptorConfig,
    pub vector: FeatureVector,
}

/// 按固定顺序执行区域划分和所有描述符阶段
pub struct DescriptorPipeline {
    config: DescriptorConfig,
    partitioner: RegionPartitioner,
    stages: Vec<Box<dyn Descriptor>>,
}

impl DescriptorPipeline {
    pub fn new(config: DescriptorConfig) -> Result<Self> {
        config.validate()?;
        let partitioner = RegionPartitioner::new(config.ellipse_fraction)?;
        let stages = config.stages.iter().map(|s| s.build()).collect::<Result<Vec<_>>>()?;
        Ok(Self { config, partitioner, stages })
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// 使用给定的区域划分计算特征向量
    pub fn describe_with(&self, pixels: &PixelBuffer, masks: &RegionMasks) -> Result<FeatureVector> {
        let mut features = Vec::with_capacity(self.config.dim());
        for stage in &self.stages {
            let v = stage.describe(pixels, masks)?;
            debug_assert_eq!(v.len(), stage.region_len() * Region::COUNT, "{}", stage.name());
            features.extend(v);
        }
        Ok(features)
    }

    pub fn describe(&self, pixels: &PixelBuffer) -> Result<FeatureVector> {
        let masks = self.partitioner.partition(pixels.width(), pixels.height())?;
        self.describe_with(pixels, &masks)
    }

    pub fn query(&self, pixels: &PixelBuffer) -> Result<Query> {
        Ok(Query { config: self.config.clone(), vector: self.describe(pixels)? })
    }
}

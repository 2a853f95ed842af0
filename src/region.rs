use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::error::{Error, Result};

/// 图片被划分成的五个区域，声明顺序即特征向量中的拼接顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl Region {
    pub const COUNT: usize = 5;

    pub const ALL: [Region; Self::COUNT] =
        [Self::TopLeft, Self::TopRight, Self::BottomLeft, Self::BottomRight, Self::Center];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一张图片的区域划分结果
///
/// 每个像素只保存一个区域编号，因此五个区域天然互不相交且覆盖全图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMasks {
    width: u32,
    height: u32,
    /// 行优先排列的区域编号
    labels: Vec<u8>,
    counts: [usize; Region::COUNT],
}

impl RegionMasks {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 行优先排列的每个像素所属区域编号，编号即 `Region::index`
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn region_at(&self, x: u32, y: u32) -> Region {
        Region::ALL[self.labels[(y * self.width + x) as usize] as usize]
    }

    pub fn contains(&self, region: Region, x: u32, y: u32) -> bool {
        self.region_at(x, y) == region
    }

    /// 区域内的像素数量
    pub fn count(&self, region: Region) -> usize {
        self.counts[region.index()]
    }

    /// 区域内所有像素坐标 `(x, y)`，按行优先顺序
    pub fn pixels(&self, region: Region) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width;
        let label = region.index() as u8;
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, l)| **l == label)
            .map(move |(i, _)| (i as u32 % width, i as u32 / width))
    }

    /// 单个区域的布尔掩码，行优先排列
    pub fn mask(&self, region: Region) -> Vec<bool> {
        let label = region.index() as u8;
        self.labels.iter().map(|l| *l == label).collect()
    }
}

fn compute_masks(width: u32, height: u32, fraction: f64) -> RegionMasks {
    let (cx, cy) = (width as f64 / 2., height as f64 / 2.);
    let (ax, ay) = (cx * fraction, cy * fraction);
    let (half_w, half_h) = (width / 2, height / 2);

    let mut labels = Vec::with_capacity(width as usize * height as usize);
    let mut counts = [0; Region::COUNT];
    for y in 0..height {
        let dy = (y as f64 + 0.5 - cy) / ay;
        for x in 0..width {
            let dx = (x as f64 + 0.5 - cx) / ax;
            let region = if dx * dx + dy * dy <= 1. {
                Region::Center
            } else {
                match (x < half_w, y < half_h) {
                    (true, true) => Region::TopLeft,
                    (false, true) => Region::TopRight,
                    (true, false) => Region::BottomLeft,
                    (false, false) => Region::BottomRight,
                }
            };
            labels.push(region.index() as u8);
            counts[region.index()] += 1;
        }
    }

    RegionMasks { width, height, labels, counts }
}

/// 区域划分器
///
/// 划分结果只取决于宽高，因此按 `(width, height)` 缓存
pub struct RegionPartitioner {
    ellipse_fraction: f32,
    capacity: usize,
    cache: RwLock<HashMap<(u32, u32), Arc<RegionMasks>>>,
}

impl RegionPartitioner {
    pub const DEFAULT_CACHE_CAPACITY: usize = 64;

    /// # Arguments
    ///
    /// * `ellipse_fraction` - 中心椭圆半轴占半宽/半高的比例，取值 (0, 1]
    pub fn new(ellipse_fraction: f32) -> Result<Self> {
        if !(ellipse_fraction > 0. && ellipse_fraction <= 1.) {
            return Err(Error::InvalidConfig(format!(
                "ellipse fraction must be in (0, 1], got {ellipse_fraction}"
            )));
        }
        Ok(Self {
            ellipse_fraction,
            capacity: Self::DEFAULT_CACHE_CAPACITY,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// 设置缓存的尺寸种类上限，为 0 时不缓存
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn partition(&self, width: u32, height: u32) -> Result<Arc<RegionMasks>> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimension { width, height });
        }

        if let Some(masks) = self.cache.read().unwrap().get(&(width, height)) {
            return Ok(masks.clone());
        }

        debug!("computing region masks for {}x{}", width, height);
        let masks = Arc::new(compute_masks(width, height, self.ellipse_fraction as f64));

        if self.capacity > 0 {
            let mut cache = self.cache.write().unwrap();
            if cache.len() >= self.capacity && !cache.contains_key(&(width, height)) {
                // 尺寸种类很少，满了直接清空即可
                cache.clear();
            }
            cache.insert((width, height), masks.clone());
        }

        Ok(masks)
    }

    pub fn cached(&self) -> usize {
        self.cache.read().unwrap().len()
    }
}

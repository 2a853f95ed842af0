use std::fmt;

use clap::ValueEnum;
use palette::{FromColor, Hsv, Lab, LinSrgb, Srgb};
use serde::{Deserialize, Serialize};

use super::Descriptor;
use crate::error::{Error, Result};
use crate::pixels::{CHANNELS, PixelBuffer};
use crate::region::{Region, RegionMasks};

/// 计算直方图时使用的颜色空间
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorSpace {
    /// 色相 [0, 360)，饱和度与明度 [0, 1]
    Hsv,
    /// 原始 RGB，每个通道 [0, 256)
    Rgb,
    /// CIE Lab，L [0, 100]，a 与 b [-128, 128)
    Lab,
}

impl ColorSpace {
    /// 每个通道的取值范围 `[lo, hi)`
    pub fn ranges(self) -> [(f32, f32); CHANNELS] {
        match self {
            Self::Hsv => [(0., 360.), (0., 1.), (0., 1.)],
            Self::Rgb => [(0., 256.), (0., 256.), (0., 256.)],
            Self::Lab => [(0., 100.), (-128., 128.), (-128., 128.)],
        }
    }

    #[inline]
    pub fn convert(self, [r, g, b]: [u8; CHANNELS]) -> [f32; CHANNELS] {
        match self {
            Self::Rgb => [r as f32, g as f32, b as f32],
            Self::Hsv => {
                let hsv: Hsv = Hsv::from_color(Srgb::new(r, g, b).into_format::<f32>());
                [hsv.hue.into_positive_degrees(), hsv.saturation, hsv.value]
            }
            Self::Lab => {
                let lin: LinSrgb<f32> = Srgb::new(r, g, b).into_format::<f32>().into_linear();
                let lab: Lab = Lab::from_color(lin);
                [lab.l, lab.a, lab.b]
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hsv => "hsv",
            Self::Rgb => "rgb",
            Self::Lab => "lab",
        }
    }
}

/// 颜色量化参数：颜色空间以及每个通道的分箱数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantization {
    pub color_space: ColorSpace,
    pub bins: [u16; CHANNELS],
}

impl Quantization {
    /// 单个区域联合直方图的最大箱子数量
    pub const MAX_REGION_BINS: usize = 1 << 16;

    pub fn new(color_space: ColorSpace, bins: [u16; CHANNELS]) -> Self {
        Self { color_space, bins }
    }

    pub fn hsv(h: u16, s: u16, v: u16) -> Self {
        Self::new(ColorSpace::Hsv, [h, s, v])
    }

    /// 单个区域直方图的长度，溢出时为 `usize::MAX`
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    fn checked_len(&self) -> Option<usize> {
        self.bins.iter().try_fold(1usize, |acc, b| acc.checked_mul(*b as usize))
    }

    pub fn validate(&self) -> Result<()> {
        if self.bins.contains(&0) {
            return Err(Error::InvalidConfig(format!("bins must be positive, got {}", self)));
        }
        match self.checked_len() {
            Some(len) if len <= Self::MAX_REGION_BINS => Ok(()),
            _ => Err(Error::InvalidConfig(format!(
                "too many bins: {}, at most {} per region",
                self,
                Self::MAX_REGION_BINS
            ))),
        }
    }

    /// 计算单个像素落入的联合直方图下标
    #[inline]
    pub fn bin(&self, pixel: [u8; CHANNELS]) -> usize {
        let values = self.color_space.convert(pixel);
        let ranges = self.color_space.ranges();
        let mut index = 0;
        for c in 0..CHANNELS {
            let (lo, hi) = ranges[c];
            let n = self.bins[c] as usize;
            let t = (values[c] - lo) / (hi - lo);
            // 越界的值归入两端的箱子
            let b = ((t * n as f32).floor().max(0.) as usize).min(n - 1);
            index = index * n + b;
        }
        index
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.bins;
        write!(f, "{} {}x{}x{}", self.color_space.name(), a, b, c)
    }
}

/// 分区域颜色直方图
pub struct ColorHistogram {
    quantization: Quantization,
}

impl ColorHistogram {
    pub fn new(quantization: Quantization) -> Result<Self> {
        quantization.validate()?;
        Ok(Self { quantization })
    }
}

impl Descriptor for ColorHistogram {
    fn name(&self) -> &'static str {
        "color"
    }

    fn region_len(&self) -> usize {
        self.quantization.len()
    }

    fn describe(&self, pixels: &PixelBuffer, masks: &RegionMasks) -> Result<Vec<f32>> {
        let (width, height) = (masks.width(), masks.height());
        if pixels.width() != width || pixels.height() != height {
            return Err(Error::InvalidDimension { width: pixels.width(), height: pixels.height() });
        }
        if let Some(region) = Region::ALL.into_iter().find(|r| masks.count(*r) == 0) {
            return Err(Error::EmptyRegion { region, width, height });
        }

        let len = self.region_len();
        let mut hist = vec![0u32; Region::COUNT * len];
        for (i, label) in masks.labels().iter().enumerate() {
            let bin = self.quantization.bin(pixels.pixel(i));
            hist[*label as usize * len + bin] += 1;
        }

        // 按区域像素数归一化，使各区域直方图之和为 1
        let mut features = Vec::with_capacity(hist.len());
        for region in Region::ALL {
            let total = masks.count(region) as f32;
            let slice = &hist[region.index() * len..(region.index() + 1) * len];
            features.extend(slice.iter().map(|n| *n as f32 / total));
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use super::*;
    use crate::region::RegionPartitioner;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        rgb.repeat((width * height) as usize)
    }

    fn describe(q: Quantization, width: u32, height: u32, data: &[u8]) -> Result<Vec<f32>> {
        let masks = RegionPartitioner::new(0.75)?.partition(width, height)?;
        let pixels = PixelBuffer::new(width, height, data)?;
        ColorHistogram::new(q)?.describe(&pixels, &masks)
    }

    #[test]
    fn test_hsv_bin() {
        let q = Quantization::hsv(8, 12, 3);
        // 红色：h = 0, s = 1, v = 1
        assert_eq!(q.bin([255, 0, 0]), 11 * 3 + 2);
        // 黑色：全部落在第 0 个箱子
        assert_eq!(q.bin([0, 0, 0]), 0);
        // 蓝色：h = 240
        assert_eq!(q.bin([0, 0, 255]), (5 * 12 + 11) * 3 + 2);
    }

    #[test]
    fn test_rgb_bin() {
        let q = Quantization::new(ColorSpace::Rgb, [4, 4, 4]);
        assert_eq!(q.bin([255, 0, 0]), 3 * 16);
        assert_eq!(q.bin([0, 64, 255]), 4 + 3);
    }

    #[test]
    fn test_solid_color_histogram() {
        let q = Quantization::hsv(8, 12, 3);
        let v = describe(q, 32, 24, &solid(32, 24, [255, 0, 0])).unwrap();
        assert_eq!(v.len(), Region::COUNT * q.len());
        for region in v.chunks_exact(q.len()) {
            assert_eq!(region[35], 1.);
            assert_eq!(region.iter().sum::<f32>(), 1.);
        }
    }

    #[test]
    fn test_histogram_normalized() {
        let mut data = vec![0u8; 50 * 40 * 3];
        rand::rng().fill_bytes(&mut data);
        for space in [ColorSpace::Hsv, ColorSpace::Rgb, ColorSpace::Lab] {
            let q = Quantization::new(space, [4, 4, 4]);
            let v = describe(q, 50, 40, &data).unwrap();
            for region in v.chunks_exact(q.len()) {
                assert!((region.iter().sum::<f32>() - 1.).abs() < 1e-4);
                assert!(region.iter().all(|x| *x >= 0.));
            }
        }
    }

    #[test]
    fn test_histogram_deterministic() {
        let mut data = vec![0u8; 64 * 64 * 3];
        rand::rng().fill_bytes(&mut data);
        let q = Quantization::hsv(8, 12, 3);
        let a = describe(q, 64, 64, &data).unwrap();
        let b = describe(q, 64, 64, &data).unwrap();
        let a_bits = a.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        let b_bits = b.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(a_bits, b_bits);
    }

    #[test]
    fn test_lab_separates_colors() {
        let q = Quantization::new(ColorSpace::Lab, [4, 4, 4]);
        let red = describe(q, 16, 16, &solid(16, 16, [255, 0, 0])).unwrap();
        let blue = describe(q, 16, 16, &solid(16, 16, [0, 0, 255])).unwrap();
        assert_ne!(red, blue);
    }

    #[test]
    fn test_empty_region() {
        let q = Quantization::hsv(2, 2, 2);
        let r = describe(q, 1, 1, &[0, 0, 0]);
        assert!(matches!(r, Err(Error::EmptyRegion { region: Region::TopLeft, .. })));
    }

    #[test]
    fn test_mask_size_mismatch() {
        let masks = RegionPartitioner::new(0.75).unwrap().partition(8, 8).unwrap();
        let data = solid(4, 4, [1, 2, 3]);
        let pixels = PixelBuffer::new(4, 4, &data).unwrap();
        let hist = ColorHistogram::new(Quantization::hsv(2, 2, 2)).unwrap();
        assert!(matches!(hist.describe(&pixels, &masks), Err(Error::InvalidDimension { .. })));
    }

    #[test]
    fn test_zero_bins() {
        assert!(ColorHistogram::new(Quantization::hsv(0, 2, 2)).is_err());
    }

    #[test]
    fn test_too_many_bins() {
        let huge = Quantization::hsv(u16::MAX, u16::MAX, u16::MAX);
        assert!(matches!(huge.validate(), Err(Error::InvalidConfig(_))));
        assert!(ColorHistogram::new(huge).is_err());

        // 恰好等于上限时可以使用
        let max = Quantization::new(ColorSpace::Rgb, [256, 256, 1]);
        assert_eq!(max.len(), Quantization::MAX_REGION_BINS);
        assert!(max.validate().is_ok());
        assert!(Quantization::new(ColorSpace::Rgb, [256, 256, 2]).validate().is_err());
    }
}

use crate::error::{Error, Result};

pub const CHANNELS: usize = 3;

/// 只读的 RGB 像素缓冲区，行优先，每个像素 3 字节
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    width: u32,
    height: u32,
    data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    pub fn new(width: u32, height: u32, data: &'a [u8]) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * CHANNELS
        {
            return Err(Error::InvalidDimension { width, height });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 按行优先顺序返回第 `i` 个像素
    #[inline(always)]
    pub fn pixel(&self, i: usize) -> [u8; CHANNELS] {
        let p = &self.data[i * CHANNELS..(i + 1) * CHANNELS];
        [p[0], p[1], p[2]]
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; CHANNELS] {
        self.pixel((y * self.width + x) as usize)
    }
}

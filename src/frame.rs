// 该文件是 Guance （观测） 项目的一部分。
// src/frame.rs - NHWC 帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 原始像素排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
  Rgb,
  Bgr,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("缓冲区大小不匹配: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("行跨度 {stride} 小于行宽 {row} 字节")]
  InvalidStride { stride: usize, row: usize },
}

/// RGB 帧（H×W×3，NHWC 排列）
///
/// 帧由当前持有它的工作流步骤独占，标注器会就地修改像素。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  image: RgbImage,
}

impl Frame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      image: RgbImage::new(width as u32, height as u32),
    }
  }

  /// 从带行跨度的原始缓冲区构造帧，BGR 输入会转换为 RGB
  pub fn from_strided(
    width: usize,
    height: usize,
    stride: usize,
    order: PixelOrder,
    data: &[u8],
  ) -> Result<Self, FrameError> {
    let row = width * RGB_CHANNELS;
    if stride < row {
      return Err(FrameError::InvalidStride { stride, row });
    }

    let expected = if height == 0 {
      0
    } else {
      stride * (height - 1) + row
    };
    if data.len() < expected {
      return Err(FrameError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    let mut frame = Frame::with_shape(height, width);
    let slice: &mut [u8] = &mut frame.image;
    for h in 0..height {
      let src = &data[h * stride..h * stride + row];
      let dst = &mut slice[h * row..(h + 1) * row];
      match order {
        PixelOrder::Rgb => dst.copy_from_slice(src),
        PixelOrder::Bgr => {
          for (d, s) in dst
            .chunks_exact_mut(RGB_CHANNELS)
            .zip(src.chunks_exact(RGB_CHANNELS))
          {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
          }
        }
      }
    }

    Ok(frame)
  }

  /// 按行跨度写入目标缓冲区，行尾填充字节保持不变
  pub fn copy_to_strided(&self, stride: usize, dst: &mut [u8]) -> Result<(), FrameError> {
    let row = self.width() * RGB_CHANNELS;
    if stride < row {
      return Err(FrameError::InvalidStride { stride, row });
    }

    let height = self.height();
    let expected = if height == 0 {
      0
    } else {
      stride * (height - 1) + row
    };
    if dst.len() < expected {
      return Err(FrameError::BufferSizeMismatch {
        expected,
        actual: dst.len(),
      });
    }

    for (h, src) in self.image.chunks_exact(row.max(1)).enumerate().take(height) {
      dst[h * stride..h * stride + row].copy_from_slice(src);
    }
    Ok(())
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn image_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl AsNhwcFrame for Frame {
  fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

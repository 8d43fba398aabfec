// 该文件是 Guance （观测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  detector::{BoundingBox, Detection},
  frame::Frame,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色

/// 未指定字体时依次尝试的系统字体
const SYSTEM_FONTS: [&str; 5] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取失败 {}: {source}", path.display())]
  FontIo {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("字体文件无效: {}", .0.display())]
  FontInvalid(PathBuf),
}

/// 标注器：在帧上就地绘制检测框和标签
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    }
  }

  pub fn with_font_file<P: AsRef<Path>>(path: P) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| DrawError::FontIo {
      path: path.to_path_buf(),
      source,
    })?;
    let font = FontArc::try_from_vec(data).map_err(|_| DrawError::FontInvalid(path.to_path_buf()))?;
    debug!("加载字体: {}", path.display());
    Ok(Self::new(Some(font)))
  }

  /// 优先使用指定字体，否则查找系统字体；都不可用时只绘制边框
  pub fn discover(font: Option<&Path>) -> Self {
    if let Some(path) = font {
      match Self::with_font_file(path) {
        Ok(draw) => return draw,
        Err(e) => warn!("{}", e),
      }
    }

    for candidate in SYSTEM_FONTS {
      if Path::new(candidate).exists() {
        if let Ok(draw) = Self::with_font_file(candidate) {
          return draw;
        }
      }
    }

    warn!("没有可用字体，标注时只绘制边框");
    Self::new(None)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在帧上绘制全部检测结果
  pub fn annotate(&self, frame: &mut Frame, detections: &[Detection]) {
    let image = frame.image_mut();
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let color = Rgb(self.box_color);

    // 坐标先收拢到图像外两像素以内，之后的运算不会溢出，越界部分仍由 imageproc 裁剪
    let (x1, y1, x2, y2) = clamp_to_margin(&detection.bbox, image.width(), image.height());

    // 退化框按 1 像素绘制
    let width = (x2 - x1).max(1) as u32;
    let height = (y2 - y1).max(1) as u32;

    // 边框加粗为 2 像素
    draw_hollow_rect_mut(image, Rect::at(x1, y1).of_size(width, height), color);
    if width > 2 && height > 2 {
      let inner = Rect::at(x1 + 1, y1 + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = label_text(detection);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);

    // 标签放在边框左上角的上方
    let band_width = text_width + 2 * LABEL_PADDING as u32;
    let band_height = text_height + 2 * LABEL_PADDING as u32;
    let label_x = x1;
    let label_y = (y1 - band_height as i32).max(0);

    draw_filled_rect_mut(
      image,
      Rect::at(label_x, label_y).of_size(band_width.max(1), band_height.max(1)),
      color,
    );
    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x + LABEL_PADDING,
      label_y + LABEL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

/// 边框两像素宽，收拢到 `[-2, 尺寸 + 2]` 后图像内的绘制结果不变
fn clamp_to_margin(bbox: &BoundingBox, width: u32, height: u32) -> (i32, i32, i32, i32) {
  const MARGIN: i32 = 2;
  let max_x = width.min(i32::MAX as u32 - MARGIN as u32) as i32 + MARGIN;
  let max_y = height.min(i32::MAX as u32 - MARGIN as u32) as i32 + MARGIN;
  (
    bbox.x1.clamp(-MARGIN, max_x),
    bbox.y1.clamp(-MARGIN, max_y),
    bbox.x2.clamp(-MARGIN, max_x),
    bbox.y2.clamp(-MARGIN, max_y),
  )
}

/// 标注文本，形如 `person 0.87`
pub fn label_text(detection: &Detection) -> String {
  format!("{} {:.2}", detection.label, detection.confidence)
}

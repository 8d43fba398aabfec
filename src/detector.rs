// 该文件是 Guance （观测） 项目的一部分。
// src/detector.rs - 检测适配层
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

//! 检测适配层：把模型结果转换成带类别名称、整数像素框的 [`Detection`]。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  input::{ImageFileInput, ImageFileInputError},
  model::{DetectResult, InferOptions, Model},
};

/// 像素坐标边框，左上角 `(x1, y1)`，右下角 `(x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("file not found: {}", .0.display())]
  NotFound(PathBuf),
  #[error("failed to read image: {0}")]
  Io(#[from] std::io::Error),
  #[error("failed to decode image: {0}")]
  Decode(#[from] image::ImageError),
  #[error("model inference failed: {0}")]
  Model(Box<dyn std::error::Error + Send + Sync>),
}

impl From<ImageFileInputError> for DetectError {
  fn from(e: ImageFileInputError) -> Self {
    match e {
      ImageFileInputError::NotFound(path) => DetectError::NotFound(path),
      ImageFileInputError::IoError(e) => DetectError::Io(e),
      ImageFileInputError::ImageLoadError(e) => DetectError::Decode(e),
    }
  }
}

pub trait Detect {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;

  /// 读取图像文件并检测，返回原始帧与检测结果
  fn detect_path(&self, path: &Path) -> Result<(Frame, Vec<Detection>), DetectError> {
    let frame = ImageFileInput::open(path)?
      .next()
      .ok_or_else(|| DetectError::NotFound(path.to_path_buf()))?;
    let detections = self.detect(&frame)?;
    Ok((frame, detections))
  }

  /// 流式任务中的逐帧检测
  fn detect_stream(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    self.detect(frame)
  }
}

impl<D: Detect + ?Sized> Detect for Box<D> {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    (**self).detect(frame)
  }

  fn detect_stream(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    (**self).detect_stream(frame)
  }
}

/// 任意 [`Model`] 的检测适配器
pub struct ModelDetector<M> {
  model: M,
}

impl<M: Model> ModelDetector<M> {
  pub fn new(model: M) -> Self {
    Self { model }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  fn infer(&self, frame: &Frame, options: &InferOptions) -> Result<Vec<Detection>, DetectError> {
    let result = self
      .model
      .infer(frame, options)
      .map_err(|e| DetectError::Model(Box::new(e)))?;
    debug!("模型返回 {} 个目标", result.len());
    Ok(to_detections(&result))
  }
}

impl<M: Model> Detect for ModelDetector<M> {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    self.infer(frame, &InferOptions::default())
  }

  fn detect_stream(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    self.infer(frame, &InferOptions::streaming())
  }
}

/// 类别索引查名，框坐标截断为整数
pub fn to_detections(result: &DetectResult) -> Vec<Detection> {
  result
    .items
    .iter()
    .map(|item| {
      let label = result
        .names
        .get(item.class_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("class{}", item.class_id));
      let [x1, y1, x2, y2] = item.bbox;
      Detection {
        label,
        confidence: item.score,
        bbox: BoundingBox {
          x1: x1 as i32,
          y1: y1 as i32,
          x2: x2 as i32,
          y2: y2 as i32,
        },
      }
    })
    .collect()
}

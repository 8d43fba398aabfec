// 该文件是 Guance （观测） 项目的一部分。
// src/model.rs - 模型
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

//! 预训练检测模型的调用接口。
//!
//! 工作流只通过 [`Model::infer`] 使用模型，不关心网络结构、后处理和推理运行时。

use std::collections::BTreeMap;

use crate::frame::Frame;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 推理调用选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferOptions {
  /// 流式调用（逐帧）
  pub stream: bool,
  /// 输出详细推理日志
  pub verbose: bool,
  /// 由模型自行显示结果
  pub show: bool,
  /// 由模型自行保存结果
  pub save: bool,
}

impl InferOptions {
  pub fn streaming() -> Self {
    Self {
      stream: true,
      ..Self::default()
    }
  }
}

/// 类别索引到类别名称的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
  names: BTreeMap<u32, String>,
}

impl ClassNames {
  pub fn coco() -> Self {
    COCO_CLASSES.iter().copied().collect()
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl<'a> FromIterator<&'a str> for ClassNames {
  fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
    let names = iter
      .into_iter()
      .enumerate()
      .map(|(id, name)| (id as u32, name.to_string()))
      .collect();
    Self { names }
  }
}

impl FromIterator<(u32, String)> for ClassNames {
  fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub names: ClassNames,
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &Frame, options: &InferOptions) -> Result<DetectResult, Self::Error>;
}

#[cfg(feature = "model_yolov8")]
mod yolov8;
#[cfg(feature = "model_yolov8")]
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};

#[cfg(feature = "model_yolov8")]
mod nms;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_names_are_indexed_from_zero() {
    let names = ClassNames::coco();
    assert_eq!(names.len(), 80);
    assert_eq!(names.get(0), Some("person"));
    assert_eq!(names.get(79), Some("toothbrush"));
    assert_eq!(names.get(80), None);
  }

  #[test]
  fn sparse_names_keep_their_ids() {
    let names: ClassNames = vec![(3, "cat".to_string()), (7, "dog".to_string())]
      .into_iter()
      .collect();
    assert_eq!(names.get(3), Some("cat"));
    assert_eq!(names.get(0), None);
  }
}

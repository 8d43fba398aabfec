// 该文件是 Guance （观测） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use std::time::Instant;

use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{ClassNames, DetectItem, DetectResult, InferOptions, Model, nms::nms},
};

const YOLOV8_INPUT_W: u32 = 640;
const YOLOV8_INPUT_H: u32 = 640;
const YOLOV8_BOX_VALUES: usize = 4;
const YOLOV8_CONF_THRESH: f32 = 0.25;
const YOLOV8_IOU_THRESH: f32 = 0.7;
const YOLOV8_MAX_DET: usize = 300;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状无效: {0:?}")]
  OutputShape(Vec<usize>),
}

pub struct Yolov8Builder {
  model_path: String,
  names: ClassNames,
  conf_threshold: f32,
  iou_threshold: f32,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let model_path = url.path().to_string();
    if model_path.is_empty() {
      return Err(Yolov8Error::ModelPathError("模型路径为空".to_string()));
    }

    Ok(Yolov8Builder {
      model_path,
      names: ClassNames::coco(),
      conf_threshold: YOLOV8_CONF_THRESH,
      iou_threshold: YOLOV8_IOU_THRESH,
    })
  }
}

impl Yolov8Builder {
  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    info!("加载模型文件: {}", self.model_path);
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, YOLOV8_INPUT_H as usize, YOLOV8_INPUT_W as usize),
          ),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| Yolov8Error::ModelLoadError(format!("{}: {:#}", self.model_path, e)))?;
    info!("模型加载完成");
    debug!("类别数量: {}", self.names.len());

    Ok(Yolov8 {
      plan,
      names: self.names,
      conf_threshold: self.conf_threshold,
      iou_threshold: self.iou_threshold,
    })
  }
}

pub struct Yolov8 {
  plan: Plan,
  names: ClassNames,
  conf_threshold: f32,
  iou_threshold: f32,
}

impl Yolov8 {
  fn preprocess(&self, frame: &Frame) -> Tensor {
    let resized = imageops::resize(
      frame.image(),
      YOLOV8_INPUT_W,
      YOLOV8_INPUT_H,
      FilterType::Triangle,
    );

    tract_ndarray::Array4::from_shape_fn(
      (1, 3, YOLOV8_INPUT_H as usize, YOLOV8_INPUT_W as usize),
      |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    )
    .into_tensor()
  }

  fn postprocess(
    &self,
    output: &Tensor,
    frame_w: f32,
    frame_h: f32,
  ) -> Result<Vec<DetectItem>, Yolov8Error> {
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| Yolov8Error::InferenceError(format!("{:#}", e)))?;
    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
      return Err(Yolov8Error::OutputShape(shape));
    }
    let view = view
      .into_dimensionality::<tract_ndarray::Ix3>()
      .map_err(|_| Yolov8Error::OutputShape(shape.clone()))?;

    // 官方导出为 [1, 4 + nc, N]，部分转换工具会输出 [1, N, 4 + nc]
    let transposed = shape[1] > shape[2];
    let (values, anchors) = if transposed {
      (shape[2], shape[1])
    } else {
      (shape[1], shape[2])
    };
    if values <= YOLOV8_BOX_VALUES {
      return Err(Yolov8Error::OutputShape(shape));
    }
    let at = |value: usize, anchor: usize| {
      if transposed {
        view[[0, anchor, value]]
      } else {
        view[[0, value, anchor]]
      }
    };

    let scale_x = frame_w / YOLOV8_INPUT_W as f32;
    let scale_y = frame_h / YOLOV8_INPUT_H as f32;
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
      let (class_id, score) = (YOLOV8_BOX_VALUES..values)
        .map(|v| ((v - YOLOV8_BOX_VALUES) as u32, at(v, anchor)))
        .fold((0u32, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

      if score < self.conf_threshold {
        continue;
      }

      let cx = at(0, anchor);
      let cy = at(1, anchor);
      let w = at(2, anchor);
      let h = at(3, anchor);

      candidates.push(DetectItem {
        class_id,
        score,
        bbox: [
          (cx - w / 2.0) * scale_x,
          (cy - h / 2.0) * scale_y,
          (cx + w / 2.0) * scale_x,
          (cy + h / 2.0) * scale_y,
        ],
      });
    }

    debug!("置信度过滤后候选框数量: {}", candidates.len());
    Ok(nms(candidates, self.iou_threshold, YOLOV8_MAX_DET))
  }
}

impl Model for Yolov8 {
  type Error = Yolov8Error;

  fn infer(&self, input: &Frame, options: &InferOptions) -> Result<DetectResult, Self::Error> {
    let now = Instant::now();
    let tensor = self.preprocess(input);

    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| Yolov8Error::InferenceError(format!("{:#}", e)))?;
    let output = outputs
      .first()
      .ok_or_else(|| Yolov8Error::InferenceError("模型没有输出".to_string()))?;

    let items = self.postprocess(output, input.width() as f32, input.height() as f32)?;

    if options.verbose {
      info!(
        "{}x{} 推理完成: {} 个目标, 耗时 {:.2?}",
        input.width(),
        input.height(),
        items.len(),
        now.elapsed()
      );
    } else {
      debug!("推理完成: {} 个目标, 耗时 {:.2?}", items.len(), now.elapsed());
    }

    Ok(DetectResult {
      names: self.names.clone(),
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_requires_yolov8_scheme() {
    let url = Url::parse("onnx:model.onnx").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url),
      Err(Yolov8Error::ModelPathError(_))
    ));
  }

  #[test]
  fn builder_keeps_relative_path() {
    let url = Url::parse("yolov8:weights/yolov8n.onnx").unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "weights/yolov8n.onnx");
    assert_eq!(builder.names.len(), 80);
  }

  #[test]
  fn missing_model_file_fails_to_build() {
    let url = Url::parse("yolov8:/nonexistent/yolov8n.onnx").unwrap();
    let result = Yolov8Builder::from_url(&url).unwrap().build();
    assert!(matches!(result, Err(Yolov8Error::ModelLoadError(_))));
  }
}

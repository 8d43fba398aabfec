// 该文件是 Guance （观测） 项目的一部分。
// src/task/image.rs - 单张图像检测任务
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

use std::{
  fmt,
  io::{BufRead, Write},
  path::{Path, PathBuf},
  time::Instant,
};

use tracing::{info, warn};

use crate::{
  detector::{Detect, Detection},
  menu::Console,
  output::{Render, SaveImageFileOutput, draw::Draw},
  task::TaskError,
};

pub const ACKNOWLEDGE_PROMPT: &str = "Press Enter to close the result...";

/// 检测 → 标注 → 保存 → 显示 → 报告 → 等待确认
pub struct ImageTask<'a, D> {
  detector: &'a D,
  draw: &'a Draw,
  saver: SaveImageFileOutput,
}

impl<'a, D: Detect> ImageTask<'a, D> {
  pub fn new<P: Into<PathBuf>>(detector: &'a D, draw: &'a Draw, output_image: P) -> Self {
    Self {
      detector,
      draw,
      saver: SaveImageFileOutput::new(output_image),
    }
  }

  pub fn output_image(&self) -> &Path {
    self.saver.path()
  }

  pub fn run<R, W, V>(
    &mut self,
    console: &mut Console<R, W>,
    path: &Path,
    viewer: &mut V,
  ) -> Result<Vec<Detection>, TaskError>
  where
    R: BufRead,
    W: Write,
    V: Render,
    V::Error: fmt::Display,
  {
    if !path.exists() {
      return Err(TaskError::NotFound(path.to_path_buf()));
    }

    info!("开始图像任务: {}", path.display());
    let now = Instant::now();
    let (mut frame, detections) = self.detector.detect_path(path)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    self.draw.annotate(&mut frame, &detections);
    self
      .saver
      .render_frame(&frame)
      .map_err(|e| TaskError::Output(e.to_string()))?;

    if let Err(e) = viewer.render_frame(&frame) {
      warn!("结果显示失败: {}", e);
    }

    for detection in &detections {
      console.say(format_args!(
        "{} ({:.2})",
        detection.label, detection.confidence
      ))?;
    }
    console.say(format_args!(
      "Saved annotated image to '{}'",
      self.saver.path().display()
    ))?;

    // EOF 同样视为确认
    console.prompt(ACKNOWLEDGE_PROMPT)?;

    if let Err(e) = viewer.finish() {
      warn!("关闭结果窗口失败: {}", e);
    }

    Ok(detections)
  }
}

// 该文件是 Guance （观测） 项目的一部分。
// src/app.rs - 菜单工作流装配
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
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
};

use tracing::{error, info, warn};

use crate::{
  config::Settings,
  detector::Detect,
  input::Capture,
  menu::{Console, Workflows},
  output::{OutputWrapper, draw::Draw},
  task::{CancelToken, ImageTask, StopReason, StreamTask, TaskError},
};

#[cfg(feature = "gstreamer_input")]
use crate::input::GStreamerInputPipelineBuilder;
#[cfg(feature = "gstreamer_output")]
use crate::output::{GStreamerVideoOutput, VideoSink};

enum Source<'p> {
  Camera(String),
  File(&'p Path),
}

/// 用真实采集源与输出实现菜单工作流
pub struct App<D> {
  detector: D,
  draw: Draw,
  settings: Settings,
  cancel: CancelToken,
}

impl<D: Detect> App<D> {
  pub fn new(detector: D, settings: Settings, cancel: CancelToken) -> Self {
    let draw = Draw::discover(settings.font.as_deref());
    Self {
      detector,
      draw,
      settings,
      cancel,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn stream_task(&self) -> StreamTask<'_, D> {
    StreamTask::new(&self.detector, &self.draw, self.cancel.clone())
      .with_max_frames(self.settings.max_frames)
  }

  fn open_capture(&self, source: Source<'_>) -> Result<Box<dyn Capture>, TaskError> {
    #[cfg(feature = "gstreamer_input")]
    {
      let builder = match &source {
        Source::Camera(device) => GStreamerInputPipelineBuilder::camera(device),
        Source::File(path) => GStreamerInputPipelineBuilder::file(&path.to_string_lossy()),
      };
      builder
        .build()
        .map(|input| Box::new(input.with_cancel(self.cancel.clone())) as Box<dyn Capture>)
        .map_err(|e| TaskError::DeviceUnavailable(e.to_string()))
    }

    #[cfg(not(feature = "gstreamer_input"))]
    {
      let detail = match source {
        Source::Camera(device) => device,
        Source::File(path) => path.display().to_string(),
      };
      Err(TaskError::DeviceUnavailable(format!(
        "{}: built without the gstreamer_input feature",
        detail
      )))
    }
  }

  /// 图像结果窗口，无界面时丢弃
  fn viewer(&self) -> OutputWrapper {
    #[cfg(feature = "gstreamer_output")]
    {
      if !self.settings.headless {
        return OutputWrapper::GStreamerVideoOutput(GStreamerVideoOutput::new(
          VideoSink::Display,
          self.settings.fps,
        ));
      }
    }
    OutputWrapper::Discard
  }

  /// 流式输出，返回输出以及实际录制的文件
  fn stream_output(&self, record: Option<PathBuf>) -> (OutputWrapper, Option<PathBuf>) {
    #[cfg(feature = "gstreamer_output")]
    {
      let sink = match (self.settings.headless, record) {
        (false, None) => VideoSink::Display,
        (true, None) => return (OutputWrapper::Discard, None),
        (false, Some(path)) => VideoSink::DisplayAndFile(path),
        (true, Some(path)) => VideoSink::File(path),
      };
      let recorded = match &sink {
        VideoSink::File(path) | VideoSink::DisplayAndFile(path) => Some(path.clone()),
        VideoSink::Display => None,
      };
      let output =
        GStreamerVideoOutput::new(sink, self.settings.fps).with_cancel(self.cancel.clone());
      (OutputWrapper::GStreamerVideoOutput(output), recorded)
    }

    #[cfg(not(feature = "gstreamer_output"))]
    {
      if let Some(path) = record {
        warn!(
          "未启用 gstreamer_output，不保存视频: {}",
          path.display()
        );
      }
      (OutputWrapper::Discard, None)
    }
  }

  fn report_error<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    e: &TaskError,
  ) -> io::Result<()> {
    error!("任务失败: {}", e);
    console.say(format_args!("Error: {}", e))
  }
}

impl<D: Detect> Workflows for App<D> {
  fn run_image<R: BufRead, W: Write>(
    &mut self,
    console: &mut Console<R, W>,
    path: &Path,
  ) -> io::Result<()> {
    let mut viewer = self.viewer();
    let mut task = ImageTask::new(&self.detector, &self.draw, &self.settings.output_image);

    match task.run(console, path, &mut viewer) {
      Ok(detections) => {
        info!("图像任务完成，共 {} 个目标", detections.len());
        Ok(())
      }
      Err(TaskError::NotFound(path)) => {
        console.say(format_args!("Image not found: {}", path.display()))
      }
      Err(e) => Self::report_error(console, &e),
    }
  }

  fn run_webcam<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> io::Result<()> {
    let mut capture = match self.open_capture(Source::Camera(self.settings.camera_device())) {
      Ok(capture) => capture,
      Err(e) => return Self::report_error(console, &e),
    };

    let (mut output, _) = self.stream_output(None);
    let summary = self.stream_task().run(&mut capture, &mut output);
    console.say(&summary)
  }

  fn run_video<R: BufRead, W: Write>(
    &mut self,
    console: &mut Console<R, W>,
    path: &Path,
  ) -> io::Result<()> {
    if !path.exists() {
      return console.say(format_args!("Video not found: {}", path.display()));
    }

    let mut capture = match self.open_capture(Source::File(path)) {
      Ok(capture) => capture,
      Err(e) => return Self::report_error(console, &e),
    };

    let target = self.settings.video_output_path(path);
    let (mut output, recorded) = self.stream_output(Some(target));
    let summary = self.stream_task().run(&mut capture, &mut output);
    console.say(&summary)?;

    match (recorded, &summary.reason) {
      (Some(_), StopReason::Failed(_)) => {
        warn!("视频处理失败，输出文件可能不完整");
        Ok(())
      }
      (Some(saved), _) => console.say(format_args!(
        "Processed video saved in '{}'",
        saved.display()
      )),
      (None, _) => Ok(()),
    }
  }
}

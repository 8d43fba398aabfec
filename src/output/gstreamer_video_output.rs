// 该文件是 Guance （观测） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 显示窗口与视频文件输出
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

//! # GStreamer 视频输出模块
//!
//! 将标注后的帧推送到实时显示窗口、视频文件，或同时推送到两者。
//!
//! ## 支持的文件格式
//!
//! - **MP4** (H.264) - 默认格式
//! - **MKV** (Matroska)
//! - **AVI**
//! - **WebM** (VP8)
//!
//! 显示窗口中按下 `q`、`Q` 或 `Escape` 会触发取消令牌，
//! 流式任务在下一次循环检查时退出。
//!
//! ```no_run
//! use guance::output::{GStreamerVideoOutput, VideoSink};
//!
//! let output = GStreamerVideoOutput::new(VideoSink::File("runs/out.mp4".into()), 30);
//! ```

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{Frame, FrameError},
  output::Render,
  task::CancelToken,
};

/// 等待编码器写完文件的最长时间
const EOS_TIMEOUT_SECS: u64 = 5;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 帧无法写入协商的缓冲区布局
  #[error("Frame layout error: {0}")]
  FrameLayoutError(#[from] FrameError),
  /// 帧尺寸与管道协商的尺寸不一致
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (usize, usize),
    actual: (usize, usize),
  },
}

/// 输出目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSink {
  /// 实时显示窗口
  Display,
  /// 编码保存到视频文件
  File(PathBuf),
  /// 同时显示并保存
  DisplayAndFile(PathBuf),
}

impl VideoSink {
  fn has_display(&self) -> bool {
    matches!(self, VideoSink::Display | VideoSink::DisplayAndFile(_))
  }

  fn file(&self) -> Option<&Path> {
    match self {
      VideoSink::Display => None,
      VideoSink::File(path) | VideoSink::DisplayAndFile(path) => Some(path),
    }
  }

  /// 构建 appsrc 之后的管道描述
  pub fn pipeline_description(&self) -> String {
    const DISPLAY: &str = "videoconvert ! autovideosink name=display sync=false";
    match self {
      VideoSink::Display => format!("appsrc name=src ! {}", DISPLAY),
      VideoSink::File(path) => format!("appsrc name=src ! {}", encoder_chain(path)),
      VideoSink::DisplayAndFile(path) => format!(
        "appsrc name=src ! tee name=t t. ! queue ! {} t. ! queue ! {}",
        DISPLAY,
        encoder_chain(path)
      ),
    }
  }
}

/// 根据扩展名选择编码与封装
fn encoder_chain(path: &Path) -> String {
  let location = path.display();
  match path.extension().and_then(|e| e.to_str()) {
    Some("mkv") => format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux ! filesink location=\"{}\"",
      location
    ),
    Some("avi") => format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux ! filesink location=\"{}\"",
      location
    ),
    Some("webm") => format!(
      "videoconvert ! vp8enc ! webmmux ! filesink location=\"{}\"",
      location
    ),
    _ => format!(
      "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux ! filesink location=\"{}\"",
      location
    ),
  }
}

/// 判断导航事件是否为停止按键
fn is_stop_key(event: &gst::EventRef) -> bool {
  if event.type_() != gst::EventType::Navigation {
    return false;
  }
  let Some(s) = event.structure() else {
    return false;
  };
  s.get::<&str>("event").ok() == Some("key-press")
    && matches!(s.get::<&str>("key").ok(), Some("q" | "Q" | "Escape"))
}

/// 消息是否来自显示窗口元素或其内部子元素
fn is_from_display(src: Option<&gst::Object>, display: Option<&gst::Element>) -> bool {
  match (src, display) {
    (Some(src), Some(display)) => {
      src == display.upcast_ref::<gst::Object>() || src.has_as_ancestor(display)
    }
    _ => false,
  }
}

struct Running {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  display: Option<gst::Element>,
  info: gst_video::VideoInfo,
  shape: (usize, usize),
}

/// GStreamer 视频输出
///
/// 管道在收到第一帧时按帧尺寸创建。
pub struct GStreamerVideoOutput {
  sink: VideoSink,
  fps: i32,
  cancel: Option<CancelToken>,
  running: Option<Running>,
  frame_count: u64,
}

impl GStreamerVideoOutput {
  pub fn new(sink: VideoSink, fps: u32) -> Self {
    Self {
      sink,
      fps: fps.max(1) as i32,
      cancel: None,
      running: None,
      frame_count: 0,
    }
  }

  /// 显示窗口中的停止按键会触发该令牌
  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = Some(cancel);
    self
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  fn start(&self, width: usize, height: usize) -> Result<Running, GStreamerVideoOutputError> {
    gst::init()?;

    if let Some(parent) = self.sink.file().and_then(Path::parent) {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(|e| {
          GStreamerVideoOutputError::PipelineError(format!(
            "Failed to create {}: {}",
            parent.display(),
            e
          ))
        })?;
      }
    }

    let pipeline_desc = self.sink.pipeline_description();
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    // RGB 行跨度按 4 字节对齐，推送时按协商的布局写入
    let info =
      gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width as u32, height as u32)
        .fps(gst::Fraction::new(self.fps, 1))
        .build()?;
    let caps = info.to_caps()?;

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    if let (Some(cancel), Some(pad)) = (self.cancel.clone(), appsrc.static_pad("src")) {
      pad.add_probe(gst::PadProbeType::EVENT_UPSTREAM, move |_, info| {
        if let Some(gst::PadProbeData::Event(event)) = &info.data {
          if is_stop_key(event) {
            info!("显示窗口收到停止按键");
            cancel.cancel();
          }
        }
        gst::PadProbeReturn::Ok
      });
    }

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "Video output initialized: {}x{} @ {} fps -> {:?}",
      width, height, self.fps, self.sink
    );

    let display = if self.sink.has_display() {
      pipeline.by_name("display")
    } else {
      None
    };

    Ok(Running {
      pipeline,
      appsrc,
      display,
      info,
      shape: (width, height),
    })
  }

  fn push_frame(&mut self, frame: &Frame) -> Result<(), GStreamerVideoOutputError> {
    let running = self
      .running
      .as_ref()
      .ok_or_else(|| GStreamerVideoOutputError::PipelineError("Pipeline not started".to_string()))?;

    let actual = (frame.width(), frame.height());
    if actual != running.shape {
      return Err(GStreamerVideoOutputError::FrameSizeChanged {
        expected: running.shape,
        actual,
      });
    }

    let stride = running.info.stride()[0] as usize;
    let mut buffer = gst::Buffer::with_size(running.info.size())?;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      {
        let mut map = buffer_ref.map_writable()?;
        frame.copy_to_strided(stride, map.as_mut_slice())?;
      }
      let duration = 1_000_000_000 / self.fps as u64;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(self.frame_count * duration));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    running.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  /// 检查管道总线上的错误
  fn poll_bus(&self) -> Result<(), GStreamerVideoOutputError> {
    let Some(running) = self.running.as_ref() else {
      return Ok(());
    };
    let Some(bus) = running.pipeline.bus() else {
      return Ok(());
    };

    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
      if let gst::MessageView::Error(err) = msg.view() {
        let message = err.error().to_string();
        let from_display = is_from_display(msg.src(), running.display.as_ref());
        match &self.cancel {
          // 关闭显示窗口等同于停止按键，编码与写文件错误仍然上报
          Some(cancel) if from_display => {
            warn!("显示管道错误，停止处理: {}", message);
            cancel.cancel();
          }
          _ => return Err(GStreamerVideoOutputError::PipelineError(message)),
        }
      }
    }

    Ok(())
  }

  fn close(&mut self) -> Result<(), GStreamerVideoOutputError> {
    let Some(running) = self.running.take() else {
      return Ok(());
    };

    // 发送 EOS 以正确关闭文件
    let _ = running.appsrc.end_of_stream();
    if self.sink.file().is_some() {
      if let Some(bus) = running.pipeline.bus() {
        match bus.timed_pop_filtered(
          gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
          &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
          Some(msg) => debug!("视频输出收到 {:?}", msg.type_()),
          None => warn!("等待 EOS 超时，视频文件可能不完整"),
        }
      }
    }

    running.pipeline.set_state(gst::State::Null)?;
    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
    Ok(())
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_frame(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    if self.running.is_none() {
      self.running = Some(self.start(frame.width(), frame.height())?);
    }
    self.push_frame(frame)?;
    self.poll_bus()
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.close()
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      error!("Failed to stop GStreamer video output pipeline: {}", e);
    }
  }
}

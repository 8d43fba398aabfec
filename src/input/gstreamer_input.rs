// 该文件是 Guance （观测） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 支持两类采集源：
//! - 摄像头捕获（`v4l2src`）
//! - 视频文件读取（`filesrc ! decodebin`）
//!
//! ## 系统依赖
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use guance::input::{Capture, GStreamerInputPipelineBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut input = GStreamerInputPipelineBuilder::camera("/dev/video0").build()?;
//! while let Some(frame) = input.read() {
//!     println!("处理帧: {}x{}", frame.width(), frame.height());
//! }
//! input.release();
//! # Ok(())
//! # }
//! ```

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{Frame, FrameError, PixelOrder},
  input::Capture,
  task::CancelToken,
};

/// 等待管道进入 PLAYING 的最长时间
const OPEN_TIMEOUT_SECS: u64 = 5;
/// 等待样本时检查总线与取消令牌的间隔
const PULL_INTERVAL_MS: u64 = 100;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 采集源无法打开
  #[error("Failed to open source: {0}")]
  OpenFailed(String),
  /// 帧数据错误
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource { device: String },
  TargetFormat { format: String },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource { device } => {
        format!("v4l2src device={}", device)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl GStreamerInputPipelineBuilder {
  /// 摄像头采集，`device` 形如 `/dev/video0`
  pub fn camera(device: &str) -> Self {
    Self {
      items: vec![
        GStreamerInputBuilderItem::CameraSource {
          device: device.to_string(),
        },
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        },
      ],
      live: true,
    }
  }

  /// 视频文件解码
  pub fn file(path: &str) -> Self {
    Self {
      items: vec![
        GStreamerInputBuilderItem::FileSource(path.to_string()),
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        },
      ],
      live: false,
    }
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 摄像头只保留最新帧，文件需要逐帧处理
    format!(
      "{} ! appsink name=sink sync=false max-buffers=2 drop={}",
      basic_pipeline, self.live
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    GStreamerInput::launch(&self.description())
  }
}

/// GStreamer 视频输入
///
/// 管理 GStreamer 管道和 appsink，逐帧拉取 RGB 图像。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  cancel: Option<CancelToken>,
  released: bool,
}

impl GStreamerInput {
  fn launch(description: &str) -> Result<Self, GStreamerInputError> {
    gst::init()?;
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    let mut input = GStreamerInput {
      pipeline,
      appsink,
      cancel: None,
      released: false,
    };

    if let Err(e) = input.start() {
      input.release();
      return Err(e);
    }

    Ok(input)
  }

  /// 等待帧时触发该令牌会让 `read` 返回 `None`
  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = Some(cancel);
    self
  }

  fn start(&self) -> Result<(), GStreamerInputError> {
    let started = self
      .pipeline
      .set_state(gst::State::Playing)
      .map(|_| ())
      .and_then(|_| {
        let (result, _, _) = self
          .pipeline
          .state(gst::ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
        result.map(|_| ())
      });

    if started.is_err() {
      let message = self
        .bus_error()
        .unwrap_or_else(|| "pipeline refused to start".to_string());
      return Err(GStreamerInputError::OpenFailed(message));
    }

    debug!("GStreamer 输入管道已启动");
    Ok(())
  }

  fn bus_error(&self) -> Option<String> {
    self
      .pipeline
      .bus()
      .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
      .and_then(|msg| match msg.view() {
        gst::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
      })
  }

  /// 等待下一个样本，结束、总线错误或取消时停止等待
  fn pull_sample(&self) -> Result<Option<gst::Sample>, GStreamerInputError> {
    loop {
      let timeout = gst::ClockTime::from_mseconds(PULL_INTERVAL_MS);
      if let Some(sample) = self.appsink.try_pull_sample(timeout) {
        return Ok(Some(sample));
      }
      if self.appsink.is_eos() {
        debug!("appsink 没有更多样本");
        return Ok(None);
      }
      if let Some(message) = self.bus_error() {
        return Err(GStreamerInputError::PipelineError(message));
      }
      if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
        debug!("等待样本时收到取消");
        return Ok(None);
      }
    }
  }

  fn pull_frame(&self) -> Result<Option<Frame>, GStreamerInputError> {
    let Some(sample) = self.pull_sample()? else {
      return Ok(None);
    };

    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let order = match video_info.format() {
      gst_video::VideoFormat::Rgb => PixelOrder::Rgb,
      gst_video::VideoFormat::Bgr => PixelOrder::Bgr,
      _ => return Err(GStreamerInputError::UnsupportedFormat),
    };

    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;

    let frame = Frame::from_strided(
      video_info.width() as usize,
      video_info.height() as usize,
      video_info.stride()[0] as usize,
      order,
      map.as_slice(),
    )?;

    Ok(Some(frame))
  }
}

impl Capture for GStreamerInput {
  fn read(&mut self) -> Option<Frame> {
    if self.released {
      return None;
    }

    self
      .pull_frame()
      .map_err(|e| {
        error!("Failed to fetch sample: {}", e);
        e
      })
      .ok()
      .flatten()
  }

  fn release(&mut self) {
    if self.released {
      return;
    }
    self.released = true;

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    } else {
      info!("GStreamer 输入已释放");
    }
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    self.release();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_pipeline_drops_stale_frames() {
    let desc = GStreamerInputPipelineBuilder::camera("/dev/video0").description();
    assert_eq!(
      desc,
      "v4l2src device=/dev/video0 ! videoconvert ! video/x-raw,format=RGB ! \
       appsink name=sink sync=false max-buffers=2 drop=true"
    );
  }

  #[test]
  fn file_pipeline_keeps_every_frame() {
    let desc = GStreamerInputPipelineBuilder::file("clip.mp4").description();
    assert!(desc.starts_with("filesrc location=\"clip.mp4\" ! decodebin ! videoconvert"));
    assert!(desc.ends_with("drop=false"));
  }

  /// 不依赖摄像头的直播管道，样本只能由测试推送
  fn idle_input() -> Option<GStreamerInput> {
    if gst::init().is_err() {
      return None;
    }
    if gst::ElementFactory::find("appsrc").is_none()
      || gst::ElementFactory::find("appsink").is_none()
    {
      return None;
    }
    GStreamerInput::launch("appsrc name=src is-live=true ! appsink name=sink sync=false").ok()
  }

  #[test]
  fn upstream_error_ends_a_stalled_read() {
    let Some(mut input) = idle_input() else {
      return;
    };
    let message = gst::message::Error::builder(gst::CoreError::Failed, "unplugged")
      .src(&input.pipeline)
      .build();
    input.pipeline.post_message(message).unwrap();

    assert!(input.read().is_none());
    input.release();
  }

  #[test]
  fn cancellation_ends_a_stalled_read() {
    let Some(input) = idle_input() else {
      return;
    };
    let token = CancelToken::new();
    token.cancel();
    let mut input = input.with_cancel(token);

    assert!(input.read().is_none());
    input.release();
    assert!(input.read().is_none());
  }
}

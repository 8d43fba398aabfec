// 该文件是 Guance （观测） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;

use crate::frame::Frame;

/// 已标注帧的去向
pub trait Render {
  type Error;

  fn render_frame(&mut self, frame: &Frame) -> Result<(), Self::Error>;

  /// 刷新并关闭输出，之后不再接收帧
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub mod draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError, VideoSink};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
}

/// 工作流使用的显示/编码输出
pub enum OutputWrapper {
  /// 无界面运行时丢弃帧
  Discard,
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
}

impl Render for OutputWrapper {
  type Error = OutputError;

  #[cfg_attr(not(feature = "gstreamer_output"), allow(unused_variables))]
  fn render_frame(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Discard => Ok(()),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => {
        output.render_frame(frame).map_err(OutputError::from)
      }
    }
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Discard => Ok(()),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.finish().map_err(OutputError::from),
    }
  }
}

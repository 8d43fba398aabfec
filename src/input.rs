// 该文件是 Guance （观测） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use crate::frame::Frame;

/// 采集源：摄像头设备或视频文件
pub trait Capture {
  /// 读取下一帧，流结束或读取失败时返回 `None`
  fn read(&mut self) -> Option<Frame>;

  /// 释放底层设备或文件
  fn release(&mut self);
}

impl<C: Capture + ?Sized> Capture for Box<C> {
  fn read(&mut self) -> Option<Frame> {
    (**self).read()
  }

  fn release(&mut self) {
    (**self).release()
  }
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

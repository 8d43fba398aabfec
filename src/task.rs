// 该文件是 Guance （观测） 项目的一部分。
// src/task.rs - 任务定义
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

use std::path::PathBuf;

use thiserror::Error;

use crate::detector::DetectError;

pub mod cancel;
pub mod image;
pub mod stream;

pub use self::cancel::{CancelToken, install_ctrlc_handler};
pub use self::image::ImageTask;
pub use self::stream::{StopReason, StreamState, StreamSummary, StreamTask};

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("not found: {}", .0.display())]
  NotFound(PathBuf),
  #[error("device unavailable: {0}")]
  DeviceUnavailable(String),
  #[error("{0}")]
  Detect(#[from] DetectError),
  #[error("output error: {0}")]
  Output(String),
}

impl From<std::io::Error> for TaskError {
  fn from(e: std::io::Error) -> Self {
    TaskError::Output(e.to_string())
  }
}

// 该文件是 Guance （观测） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{frame::Frame, output::Render};

/// 固定文件名的图像输出，重复保存时覆盖旧文件
pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

impl SaveImageFileOutput {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, frame: &Frame) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    frame.image().save(&self.path)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_frame(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    self.save_image(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn creates_parent_directories_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out/result.png");
    let mut output = SaveImageFileOutput::new(&path);

    output
      .render_frame(&Frame::from(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))))
      .unwrap();
    output
      .render_frame(&Frame::from(RgbImage::from_pixel(6, 2, Rgb([0, 0, 255]))))
      .unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (6, 2));
    assert_eq!(saved.get_pixel(0, 0), &Rgb([0, 0, 255]));
  }

  #[test]
  fn unknown_extension_is_an_image_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut output = SaveImageFileOutput::new(dir.path().join("result.unknown"));
    let err = output
      .render_frame(&Frame::with_shape(2, 2))
      .unwrap_err();
    assert!(matches!(err, SaveImageFileError::ImageError(_)));
  }
}

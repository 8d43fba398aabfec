// 该文件是 Guance （观测） 项目的一部分。
// src/config.rs - 运行配置
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

pub const DEFAULT_OUTPUT_IMAGE: &str = "output.jpg";
pub const DEFAULT_OUTPUT_DIR: &str = "runs/detect/predict";
pub const DEFAULT_FPS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  /// 图像任务的标注结果，每次覆盖
  pub output_image: PathBuf,
  /// 视频任务的结果目录
  pub output_dir: PathBuf,
  /// 摄像头编号，对应 `/dev/video<N>`
  pub camera: u32,
  pub font: Option<PathBuf>,
  pub fps: u32,
  pub max_frames: Option<u64>,
  /// 不打开显示窗口
  pub headless: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      output_image: PathBuf::from(DEFAULT_OUTPUT_IMAGE),
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      camera: 0,
      font: None,
      fps: DEFAULT_FPS,
      max_frames: None,
      headless: false,
    }
  }
}

impl Settings {
  pub fn camera_device(&self) -> String {
    format!("/dev/video{}", self.camera)
  }

  /// 视频结果路径：`<output_dir>/<文件名>.mp4`
  pub fn video_output_path(&self, source: &Path) -> PathBuf {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "video".to_string());
    self.output_dir.join(format!("{}.mp4", stem))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_fixed_paths() {
    let settings = Settings::default();
    assert_eq!(settings.output_image, Path::new("output.jpg"));
    assert_eq!(settings.camera_device(), "/dev/video0");
    assert_eq!(settings.fps, 30);
  }

  #[test]
  fn video_output_uses_source_stem() {
    let settings = Settings::default();
    assert_eq!(
      settings.video_output_path(Path::new("/data/clips/traffic.avi")),
      Path::new("runs/detect/predict/traffic.mp4")
    );
  }
}

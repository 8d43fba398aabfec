// 该文件是 Guance （观测） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use guance::config::{DEFAULT_FPS, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_IMAGE, Settings};

/// Guance 交互式目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，形如 yolov8:yolov8n.onnx
  #[arg(long, value_name = "MODEL", default_value = "yolov8:yolov8n.onnx")]
  pub model: Url,

  /// 图像任务的标注结果文件
  #[arg(long, value_name = "PATH", default_value = DEFAULT_OUTPUT_IMAGE)]
  pub output_image: PathBuf,

  /// 视频任务的结果目录
  #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
  pub output_dir: PathBuf,

  /// 摄像头编号（/dev/video<N>）
  #[arg(long, value_name = "N", default_value_t = 0)]
  pub camera: u32,

  /// 标签字体文件（TTF/OTF），默认查找系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 显示与录制帧率
  #[arg(long, value_name = "N", default_value_t = DEFAULT_FPS)]
  pub fps: u32,

  /// 流式任务最多处理的帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 不打开显示窗口
  #[arg(long)]
  pub headless: bool,
}

impl From<Args> for Settings {
  fn from(args: Args) -> Self {
    Settings {
      output_image: args.output_image,
      output_dir: args.output_dir,
      camera: args.camera,
      font: args.font,
      fps: args.fps,
      max_frames: args.max_frames,
      headless: args.headless,
    }
  }
}

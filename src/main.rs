// 该文件是 Guance （观测） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use guance::{
  app::App,
  config::Settings,
  detector::Detect,
  menu::{self, Console},
  task::{CancelToken, install_ctrlc_handler},
};

#[cfg(feature = "model_yolov8")]
fn load_detector(url: &url::Url) -> Result<Box<dyn Detect>> {
  use guance::{FromUrl, detector::ModelDetector, model::Yolov8Builder};

  info!("正在加载模型: {}", url);
  let now = std::time::Instant::now();
  let model = Yolov8Builder::from_url(url)?
    .build()
    .with_context(|| format!("无法加载模型 {}", url))?;
  info!("模型加载完成，耗时: {:.2?}", now.elapsed());
  Ok(Box::new(ModelDetector::new(model)))
}

#[cfg(not(feature = "model_yolov8"))]
fn load_detector(url: &url::Url) -> Result<Box<dyn Detect>> {
  anyhow::bail!("不支持的模型 {}: 未启用任何模型后端", url)
}

fn main() -> Result<()> {
  // 日志写到 stderr，stdout 留给菜单
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = args::Args::parse();
  info!("模型地址: {}", args.model);

  let detector = load_detector(&args.model)?;

  let cancel = CancelToken::new();
  install_ctrlc_handler(cancel.clone()).context("Error setting Ctrl-C handler")?;

  let settings = Settings::from(args);
  let mut app = App::new(detector, settings, cancel);

  let stdin = std::io::stdin();
  let mut console = Console::new(stdin.lock(), std::io::stdout());
  menu::run(&mut console, &mut app)?;

  Ok(())
}

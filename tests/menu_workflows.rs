// 该文件是 Guance （观测） 项目的一部分。
// tests/menu_workflows.rs - 菜单与工作流集成测试
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

use std::{cell::Cell, path::Path, rc::Rc};

use guance::{
  app::App,
  config::Settings,
  detector::{BoundingBox, Detect, DetectError, Detection},
  frame::Frame,
  menu::{self, Console},
  output::draw::Draw,
  task::CancelToken,
};

/// 每次返回固定结果并记录调用次数
struct FakeDetector {
  calls: Rc<Cell<usize>>,
}

impl Detect for FakeDetector {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    self.calls.set(self.calls.get() + 1);
    Ok(vec![
      Detection {
        label: "person".to_string(),
        confidence: 0.876,
        bbox: BoundingBox {
          x1: 2,
          y1: 2,
          x2: frame.width() as i32 - 2,
          y2: frame.height() as i32 - 2,
        },
      },
      Detection {
        label: "bus".to_string(),
        confidence: 0.25,
        bbox: BoundingBox {
          x1: 0,
          y1: 0,
          x2: 4,
          y2: 4,
        },
      },
    ])
  }
}

fn app(dir: &Path) -> (App<FakeDetector>, Rc<Cell<usize>>) {
  app_with_camera(dir, 0)
}

fn app_with_camera(dir: &Path, camera: u32) -> (App<FakeDetector>, Rc<Cell<usize>>) {
  let calls = Rc::new(Cell::new(0));
  let settings = Settings {
    output_image: dir.join("output.jpg"),
    output_dir: dir.join("runs"),
    camera,
    headless: true,
    ..Settings::default()
  };
  let app = App::new(
    FakeDetector {
      calls: calls.clone(),
    },
    settings,
    CancelToken::new(),
  )
  .with_draw(Draw::new(None));
  (app, calls)
}

fn drive(app: &mut App<FakeDetector>, input: &str) -> String {
  let mut console = Console::new(input.as_bytes(), Vec::new());
  menu::run(&mut console, app).unwrap();
  String::from_utf8(console.into_output()).unwrap()
}

#[test]
fn image_workflow_saves_and_reports() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("street.png");
  image::RgbImage::from_pixel(32, 24, image::Rgb([90, 90, 90]))
    .save(&input)
    .unwrap();

  let (mut app, calls) = app(dir.path());
  let printed = drive(&mut app, &format!("1\n{}\n\n4\n", input.display()));

  let output = dir.path().join("output.jpg");
  assert!(output.exists());
  assert_eq!(calls.get(), 1);

  let saved = image::open(&output).unwrap().into_rgb8();
  assert_eq!(saved.dimensions(), (32, 24));

  assert!(printed.contains("person (0.88)\nbus (0.25)\n"));
  assert!(printed.contains(&format!("Saved annotated image to '{}'", output.display())));
  assert!(printed.contains("Press Enter to close the result..."));
  assert!(printed.ends_with("Exiting...\n"));
}

#[test]
fn missing_image_is_reported_without_detection() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, calls) = app(dir.path());

  let printed = drive(&mut app, "1\n/nonexistent/street.jpg\n4\n");

  assert!(printed.contains("Image not found: /nonexistent/street.jpg\n"));
  assert_eq!(calls.get(), 0);
  assert!(!dir.path().join("output.jpg").exists());
}

#[test]
fn undecodable_image_is_reported_as_error() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("broken.jpg");
  std::fs::write(&input, b"not an image").unwrap();
  let (mut app, calls) = app(dir.path());

  let printed = drive(&mut app, &format!("1\n{}\n4\n", input.display()));

  assert!(printed.contains("Error: failed to decode image"));
  assert_eq!(calls.get(), 0);
}

#[test]
fn missing_video_is_reported_without_detection() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, calls) = app(dir.path());

  let printed = drive(&mut app, "3\n/nonexistent/clip.mp4\n4\n");

  assert!(printed.contains("Video not found: /nonexistent/clip.mp4\n"));
  assert_eq!(calls.get(), 0);
}

#[cfg(not(feature = "gstreamer_input"))]
#[test]
fn webcam_without_capture_support_is_unavailable() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, calls) = app(dir.path());

  let printed = drive(&mut app, "2\n4\n");

  assert!(printed.contains("Error: device unavailable: /dev/video0"));
  assert_eq!(calls.get(), 0);
  // 菜单在失败后继续运行
  assert!(printed.ends_with("Exiting...\n"));
}

#[cfg(feature = "gstreamer_input")]
#[test]
fn missing_camera_is_unavailable_and_menu_continues() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, calls) = app_with_camera(dir.path(), 99);

  let printed = drive(&mut app, "2\n4\n");

  assert!(printed.contains("Error: device unavailable: "));
  assert!(!printed.contains("Stream stopped"));
  assert_eq!(calls.get(), 0);
  assert!(printed.ends_with("Exiting...\n"));
}

#[test]
fn menu_recovers_from_invalid_choices() {
  let dir = tempfile::tempdir().unwrap();
  let (mut app, calls) = app(dir.path());

  let printed = drive(&mut app, "5\nabc\n\n4\n");

  assert_eq!(
    printed
      .matches("Invalid choice! Please select again.")
      .count(),
    3
  );
  assert_eq!(calls.get(), 0);
}

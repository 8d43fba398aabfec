// 该文件是 Guance （观测） 项目的一部分。
// src/menu.rs - 交互式菜单
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

use std::{
  fmt,
  io::{self, BufRead, Write},
  path::Path,
  str::FromStr,
};

use thiserror::Error;
use tracing::debug;

pub const MENU_TITLE: &str = "===== YOLO Object Detection =====";
pub const CHOICE_PROMPT: &str = "Enter your choice (1/2/3/4): ";
pub const IMAGE_PATH_PROMPT: &str = "Enter image path: ";
pub const VIDEO_PATH_PROMPT: &str = "Enter video path: ";
pub const INVALID_CHOICE: &str = "Invalid choice! Please select again.";
pub const EXITING: &str = "Exiting...";

/// 菜单和工作流共享的终端输入输出
pub struct Console<R, W> {
  input: R,
  output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }

  /// 读取一行并去掉行尾换行，EOF 时返回 `None`
  pub fn read_line(&mut self) -> io::Result<Option<String>> {
    let mut line = String::new();
    if self.input.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
  }

  pub fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
    write!(self.output, "{}", text)?;
    self.output.flush()?;
    self.read_line()
  }

  pub fn say<T: fmt::Display>(&mut self, line: T) -> io::Result<()> {
    writeln!(self.output, "{}", line)
  }

  pub fn into_output(self) -> W {
    self.output
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
  Image,
  Webcam,
  Video,
  Exit,
}

pub struct MenuEntry {
  pub key: &'static str,
  pub description: &'static str,
  pub choice: MenuChoice,
}

pub const MENU_ENTRIES: [MenuEntry; 4] = [
  MenuEntry {
    key: "1",
    description: "Detect objects in an image",
    choice: MenuChoice::Image,
  },
  MenuEntry {
    key: "2",
    description: "Real-time detection (Webcam)",
    choice: MenuChoice::Webcam,
  },
  MenuEntry {
    key: "3",
    description: "Detect objects in a video",
    choice: MenuChoice::Video,
  },
  MenuEntry {
    key: "4",
    description: "Exit",
    choice: MenuChoice::Exit,
  },
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid menu choice: {input:?}")]
pub struct ParseChoiceError {
  input: String,
}

impl FromStr for MenuChoice {
  type Err = ParseChoiceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key = s.trim();
    MENU_ENTRIES
      .iter()
      .find(|entry| entry.key == key)
      .map(|entry| entry.choice)
      .ok_or_else(|| ParseChoiceError {
        input: s.to_string(),
      })
  }
}

/// 菜单分发的工作流，每个调用都运行到结束才返回
pub trait Workflows {
  fn run_image<R: BufRead, W: Write>(
    &mut self,
    console: &mut Console<R, W>,
    path: &Path,
  ) -> io::Result<()>;

  fn run_webcam<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> io::Result<()>;

  fn run_video<R: BufRead, W: Write>(
    &mut self,
    console: &mut Console<R, W>,
    path: &Path,
  ) -> io::Result<()>;
}

fn show_menu<R: BufRead, W: Write>(console: &mut Console<R, W>) -> io::Result<()> {
  console.say("")?;
  console.say(MENU_TITLE)?;
  for entry in &MENU_ENTRIES {
    console.say(format_args!("{}. {}", entry.key, entry.description))?;
  }
  Ok(())
}

/// 菜单主循环，选择退出或输入结束时返回
pub fn run<R, W, F>(console: &mut Console<R, W>, workflows: &mut F) -> io::Result<()>
where
  R: BufRead,
  W: Write,
  F: Workflows,
{
  loop {
    show_menu(console)?;
    let Some(line) = console.prompt(CHOICE_PROMPT)? else {
      console.say("")?;
      break;
    };

    match line.parse::<MenuChoice>() {
      Ok(MenuChoice::Image) => {
        let Some(path) = console.prompt(IMAGE_PATH_PROMPT)? else {
          break;
        };
        workflows.run_image(console, Path::new(path.trim()))?;
      }
      Ok(MenuChoice::Webcam) => workflows.run_webcam(console)?,
      Ok(MenuChoice::Video) => {
        let Some(path) = console.prompt(VIDEO_PATH_PROMPT)? else {
          break;
        };
        workflows.run_video(console, Path::new(path.trim()))?;
      }
      Ok(MenuChoice::Exit) => break,
      Err(e) => {
        debug!("{}", e);
        console.say(INVALID_CHOICE)?;
      }
    }
  }

  console.say(EXITING)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Recorder {
    calls: Vec<String>,
  }

  impl Workflows for Recorder {
    fn run_image<R: BufRead, W: Write>(
      &mut self,
      _console: &mut Console<R, W>,
      path: &Path,
    ) -> io::Result<()> {
      self.calls.push(format!("image:{}", path.display()));
      Ok(())
    }

    fn run_webcam<R: BufRead, W: Write>(&mut self, _console: &mut Console<R, W>) -> io::Result<()> {
      self.calls.push("webcam".to_string());
      Ok(())
    }

    fn run_video<R: BufRead, W: Write>(
      &mut self,
      _console: &mut Console<R, W>,
      path: &Path,
    ) -> io::Result<()> {
      self.calls.push(format!("video:{}", path.display()));
      Ok(())
    }
  }

  fn drive(input: &str) -> (Vec<String>, String) {
    let mut console = Console::new(input.as_bytes(), Vec::new());
    let mut recorder = Recorder::default();
    run(&mut console, &mut recorder).unwrap();
    let printed = String::from_utf8(console.into_output()).unwrap();
    (recorder.calls, printed)
  }

  #[test]
  fn parses_trimmed_keys() {
    assert_eq!(" 1 ".parse::<MenuChoice>(), Ok(MenuChoice::Image));
    assert_eq!("4".parse::<MenuChoice>(), Ok(MenuChoice::Exit));
    assert!("5".parse::<MenuChoice>().is_err());
    assert!("".parse::<MenuChoice>().is_err());
  }

  #[test]
  fn invalid_input_invokes_no_workflow() {
    let (calls, printed) = drive("5\nabc\n4\n");
    assert!(calls.is_empty());
    assert_eq!(printed.matches(INVALID_CHOICE).count(), 2);
    assert_eq!(printed.matches(MENU_TITLE).count(), 3);
    assert!(printed.ends_with("Exiting...\n"));
  }

  #[test]
  fn dispatches_each_choice() {
    let (calls, _) = drive("1\n  street.jpg \n2\n3\nclip.mp4\n4\n");
    assert_eq!(calls, vec!["image:street.jpg", "webcam", "video:clip.mp4"]);
  }

  #[test]
  fn eof_ends_the_menu() {
    let (calls, printed) = drive("2\n");
    assert_eq!(calls, vec!["webcam"]);
    assert!(printed.ends_with("Exiting...\n"));
  }

  #[test]
  fn eof_at_path_prompt_ends_the_menu() {
    let (calls, printed) = drive("1\n");
    assert!(calls.is_empty());
    assert!(printed.contains(IMAGE_PATH_PROMPT));
  }

  #[test]
  fn menu_lists_entries_in_order() {
    let (_, printed) = drive("4\n");
    assert!(printed.contains(
      "1. Detect objects in an image\n2. Real-time detection (Webcam)\n\
       3. Detect objects in a video\n4. Exit\n"
    ));
  }
}

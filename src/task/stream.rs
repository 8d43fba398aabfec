// 该文件是 Guance （观测） 项目的一部分。
// src/task/stream.rs - 流式检测任务
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

use std::{fmt, time::Instant};

use tracing::{debug, info, warn};

use crate::{
  detector::Detect, input::Capture, output::Render, output::draw::Draw, task::CancelToken,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
  /// Ctrl-C 或显示窗口中的停止按键
  Cancelled,
  /// 采集源没有更多帧
  EndOfStream,
  /// 达到 `--max-frames`
  FrameLimit,
  /// 检测或输出失败
  Failed(String),
}

impl fmt::Display for StopReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StopReason::Cancelled => write!(f, "cancelled"),
      StopReason::EndOfStream => write!(f, "end of stream"),
      StopReason::FrameLimit => write!(f, "frame limit reached"),
      StopReason::Failed(msg) => write!(f, "failed: {}", msg),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
  Running,
  Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
  pub frames: u64,
  pub detections: u64,
  pub reason: StopReason,
}

impl fmt::Display for StreamSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Stream stopped: {} after {} frames ({} detections)",
      self.reason, self.frames, self.detections
    )
  }
}

/// 任何退出路径都只释放一次采集源
struct ReleaseGuard<'a, C: Capture>(&'a mut C);

impl<C: Capture> Drop for ReleaseGuard<'_, C> {
  fn drop(&mut self) {
    self.0.release();
  }
}

/// 逐帧 读取 → 检测 → 标注 → 输出，每帧开始前检查取消
pub struct StreamTask<'a, D> {
  detector: &'a D,
  draw: &'a Draw,
  cancel: CancelToken,
  max_frames: Option<u64>,
}

impl<'a, D: Detect> StreamTask<'a, D> {
  pub fn new(detector: &'a D, draw: &'a Draw, cancel: CancelToken) -> Self {
    Self {
      detector,
      draw,
      cancel,
      max_frames: None,
    }
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn run<C, O>(&self, capture: &mut C, output: &mut O) -> StreamSummary
  where
    C: Capture,
    O: Render,
    O::Error: fmt::Display,
  {
    info!("开始流式任务...");
    let _armed = self.cancel.arm();
    let mut capture = ReleaseGuard(capture);
    let mut summary = StreamSummary {
      frames: 0,
      detections: 0,
      reason: StopReason::EndOfStream,
    };

    let reason = loop {
      match self.step(&mut *capture.0, output, &mut summary) {
        StreamState::Running => continue,
        StreamState::Stopped(reason) => break reason,
      }
    };
    drop(capture);

    summary.reason = match output.finish() {
      Err(e) if !matches!(reason, StopReason::Failed(_)) => {
        warn!("关闭输出失败: {}", e);
        StopReason::Failed(e.to_string())
      }
      _ => reason,
    };

    info!("任务完成，退出: {}", summary.reason);
    summary
  }

  fn step<C, O>(&self, capture: &mut C, output: &mut O, summary: &mut StreamSummary) -> StreamState
  where
    C: Capture,
    O: Render,
    O::Error: fmt::Display,
  {
    if self.cancel.is_cancelled() {
      return StreamState::Stopped(StopReason::Cancelled);
    }
    if self.max_frames.is_some_and(|n| summary.frames >= n) {
      info!("达到指定帧数 {}, 退出任务循环", summary.frames);
      return StreamState::Stopped(StopReason::FrameLimit);
    }

    let Some(mut frame) = capture.read() else {
      // 采集源在等待帧时被中断
      if self.cancel.is_cancelled() {
        return StreamState::Stopped(StopReason::Cancelled);
      }
      return StreamState::Stopped(StopReason::EndOfStream);
    };

    let now = Instant::now();
    let detections = match self.detector.detect_stream(&frame) {
      Ok(detections) => detections,
      Err(e) => return StreamState::Stopped(StopReason::Failed(e.to_string())),
    };
    let elapsed_a = now.elapsed();

    self.draw.annotate(&mut frame, &detections);
    if let Err(e) = output.render_frame(&frame) {
      return StreamState::Stopped(StopReason::Failed(e.to_string()));
    }

    summary.frames += 1;
    summary.detections += detections.len() as u64;
    debug!(
      "第 {} 帧: {} 个目标，耗时: {:.2?} / {:.2?}",
      summary.frames,
      detections.len(),
      elapsed_a,
      now.elapsed()
    );

    StreamState::Running
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detector::{BoundingBox, DetectError, Detection},
    frame::Frame,
  };
  use std::cell::Cell;

  struct CountingDetector {
    calls: Cell<usize>,
    single_shot: Cell<usize>,
    cancel_on: Option<(usize, CancelToken)>,
    fail_on: Option<usize>,
  }

  impl CountingDetector {
    fn new() -> Self {
      Self {
        calls: Cell::new(0),
        single_shot: Cell::new(0),
        cancel_on: None,
        fail_on: None,
      }
    }
  }

  impl Detect for CountingDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
      self.single_shot.set(self.single_shot.get() + 1);
      self.detect_stream(frame)
    }

    fn detect_stream(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
      let call = self.calls.get() + 1;
      self.calls.set(call);
      if let Some((n, token)) = &self.cancel_on {
        if call == *n {
          token.cancel();
        }
      }
      if self.fail_on == Some(call) {
        return Err(DetectError::NotFound("gone".into()));
      }
      Ok(vec![Detection {
        label: "cat".to_string(),
        confidence: 0.5,
        bbox: BoundingBox {
          x1: 1,
          y1: 1,
          x2: 3,
          y2: 3,
        },
      }])
    }
  }

  /// 无限采集源，或在给定帧数后结束
  struct FakeCapture {
    remaining: Option<usize>,
    reads: usize,
    releases: usize,
    cancel_when_empty: Option<CancelToken>,
  }

  impl FakeCapture {
    fn endless() -> Self {
      Self {
        remaining: None,
        reads: 0,
        releases: 0,
        cancel_when_empty: None,
      }
    }

    fn with_frames(n: usize) -> Self {
      Self {
        remaining: Some(n),
        ..Self::endless()
      }
    }
  }

  impl Capture for FakeCapture {
    fn read(&mut self) -> Option<Frame> {
      if self.releases > 0 {
        return None;
      }
      match &mut self.remaining {
        Some(0) => {
          if let Some(token) = &self.cancel_when_empty {
            token.cancel();
          }
          return None;
        }
        Some(n) => *n -= 1,
        None => {}
      }
      self.reads += 1;
      Some(Frame::with_shape(4, 4))
    }

    fn release(&mut self) {
      self.releases += 1;
    }
  }

  #[derive(Default)]
  struct RecordingOutput {
    frames: usize,
    finished: usize,
    fail_finish: bool,
  }

  impl Render for RecordingOutput {
    type Error = String;

    fn render_frame(&mut self, _frame: &Frame) -> Result<(), String> {
      self.frames += 1;
      Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
      self.finished += 1;
      if self.fail_finish {
        Err("disk full".to_string())
      } else {
        Ok(())
      }
    }
  }

  #[test]
  fn stops_within_one_frame_of_cancellation() {
    let token = CancelToken::new();
    let detector = CountingDetector {
      cancel_on: Some((3, token.clone())),
      ..CountingDetector::new()
    };
    let draw = Draw::new(None);
    let mut capture = FakeCapture::endless();
    let mut output = RecordingOutput::default();

    let summary = StreamTask::new(&detector, &draw, token.clone()).run(&mut capture, &mut output);

    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.frames, 3);
    assert_eq!(detector.calls.get(), 3);
    assert_eq!(capture.releases, 1);
    assert_eq!(output.finished, 1);
    assert!(!token.is_armed());
  }

  #[test]
  fn end_of_stream_releases_capture_once() {
    let detector = CountingDetector::new();
    let draw = Draw::new(None);
    let mut capture = FakeCapture::with_frames(4);
    let mut output = RecordingOutput::default();

    let summary =
      StreamTask::new(&detector, &draw, CancelToken::new()).run(&mut capture, &mut output);

    assert_eq!(
      summary,
      StreamSummary {
        frames: 4,
        detections: 4,
        reason: StopReason::EndOfStream,
      }
    );
    assert_eq!(capture.releases, 1);
    assert_eq!(output.frames, 4);
    assert_eq!(detector.single_shot.get(), 0);
    assert_eq!(
      summary.to_string(),
      "Stream stopped: end of stream after 4 frames (4 detections)"
    );
  }

  #[test]
  fn frame_limit_stops_endless_source() {
    let detector = CountingDetector::new();
    let draw = Draw::new(None);
    let mut capture = FakeCapture::endless();
    let mut output = RecordingOutput::default();

    let summary = StreamTask::new(&detector, &draw, CancelToken::new())
      .with_max_frames(Some(5))
      .run(&mut capture, &mut output);

    assert_eq!(summary.reason, StopReason::FrameLimit);
    assert_eq!(summary.frames, 5);
    assert_eq!(capture.reads, 5);
  }

  #[test]
  fn detector_failure_is_fatal() {
    let detector = CountingDetector {
      fail_on: Some(2),
      ..CountingDetector::new()
    };
    let draw = Draw::new(None);
    let mut capture = FakeCapture::endless();
    let mut output = RecordingOutput::default();

    let summary =
      StreamTask::new(&detector, &draw, CancelToken::new()).run(&mut capture, &mut output);

    assert!(matches!(summary.reason, StopReason::Failed(_)));
    assert_eq!(summary.frames, 1);
    assert_eq!(capture.releases, 1);
    assert_eq!(output.finished, 1);
  }

  #[test]
  fn pending_cancellation_from_earlier_run_is_cleared() {
    let token = CancelToken::new();
    token.cancel();
    let detector = CountingDetector::new();
    let draw = Draw::new(None);
    let mut capture = FakeCapture::with_frames(2);
    let mut output = RecordingOutput::default();

    let summary = StreamTask::new(&detector, &draw, token).run(&mut capture, &mut output);
    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(summary.frames, 2);
  }

  #[test]
  fn finish_failure_is_reported() {
    let detector = CountingDetector::new();
    let draw = Draw::new(None);
    let mut capture = FakeCapture::with_frames(1);
    let mut output = RecordingOutput {
      fail_finish: true,
      ..RecordingOutput::default()
    };

    let summary =
      StreamTask::new(&detector, &draw, CancelToken::new()).run(&mut capture, &mut output);
    assert_eq!(summary.reason, StopReason::Failed("disk full".to_string()));
  }

  #[test]
  fn interrupted_read_counts_as_cancelled() {
    let token = CancelToken::new();
    let detector = CountingDetector::new();
    let draw = Draw::new(None);
    let mut capture = FakeCapture {
      cancel_when_empty: Some(token.clone()),
      ..FakeCapture::with_frames(2)
    };
    let mut output = RecordingOutput::default();

    let summary = StreamTask::new(&detector, &draw, token).run(&mut capture, &mut output);
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.frames, 2);
    assert_eq!(capture.releases, 1);
  }
}

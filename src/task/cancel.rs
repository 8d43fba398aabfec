// 该文件是 Guance （观测） 项目的一部分。
// src/task/cancel.rs - 协作式取消
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use tracing::{info, warn};

/// 退出码：收到 SIGINT
pub const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Debug, Default)]
struct Flags {
  cancelled: AtomicBool,
  armed: AtomicBool,
}

/// 跨线程共享的取消令牌
///
/// 只有在流式任务运行期间（armed）中断信号才转为取消请求。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  flags: Arc<Flags>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.flags.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flags.cancelled.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.flags.cancelled.store(false, Ordering::SeqCst);
  }

  pub fn is_armed(&self) -> bool {
    self.flags.armed.load(Ordering::SeqCst)
  }

  /// 清除旧的取消请求并开始接收中断，守卫释放时解除
  pub fn arm(&self) -> Armed<'_> {
    self.reset();
    self.flags.armed.store(true, Ordering::SeqCst);
    Armed { token: self }
  }

  fn disarm(&self) {
    self.flags.armed.store(false, Ordering::SeqCst);
  }

  /// 中断信号入口：已布防时取消并返回 `true`
  pub fn interrupt(&self) -> bool {
    if self.is_armed() {
      self.cancel();
      true
    } else {
      false
    }
  }
}

pub struct Armed<'a> {
  token: &'a CancelToken,
}

impl Drop for Armed<'_> {
  fn drop(&mut self) {
    self.token.disarm();
  }
}

/// 安装 Ctrl-C 处理：流式任务中取消任务，否则直接退出进程
pub fn install_ctrlc_handler(token: CancelToken) -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    if token.interrupt() {
      info!("收到中断信号，停止当前任务...");
    } else {
      warn!("收到中断信号，退出程序");
      std::process::exit(SIGINT_EXIT_CODE);
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interrupt_is_ignored_when_unarmed() {
    let token = CancelToken::new();
    assert!(!token.interrupt());
    assert!(!token.is_cancelled());
  }

  #[test]
  fn armed_interrupt_cancels_all_clones() {
    let token = CancelToken::new();
    let handler_side = token.clone();
    let guard = token.arm();
    assert!(handler_side.interrupt());
    assert!(token.is_cancelled());
    drop(guard);
    assert!(!token.is_armed());
  }

  #[test]
  fn arming_clears_previous_cancellation() {
    let token = CancelToken::new();
    token.cancel();
    let _guard = token.arm();
    assert!(!token.is_cancelled());
  }

  #[test]
  fn cancel_from_another_thread() {
    let token = CancelToken::new();
    let remote = token.clone();
    std::thread::spawn(move || remote.cancel()).join().unwrap();
    assert!(token.is_cancelled());
  }
}

//! 工作執行緒到介面的單向通知
//!
//! 只有工作執行緒寫入，介面端只讀取 channel，不共享任何可變狀態。

use super::error::MixError;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Success(PathBuf),
    Failure(MixError),
}

impl RunResult {
    #[must_use]
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Success(path) => Some(path),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// 百分比，單次執行內不會遞減
    Progress(u8),
    Status(String),
    /// 每次執行恰好一次，且一定是最後一個事件
    Finished(RunResult),
}

/// 進度子區間，將 [0, 1] 的比例對應到百分比範圍
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub end: f64,
}

impl ProgressRange {
    pub const FULL: Self = Self::new(0.0, 100.0);

    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.start + (self.end - self.start) * fraction
    }

    /// 平均切成 `count` 段後的第 `index` 段
    #[must_use]
    pub fn split(&self, index: usize, count: usize) -> Self {
        if count == 0 {
            return *self;
        }
        Self::new(
            self.at(index as f64 / count as f64),
            self.at((index + 1) as f64 / count as f64),
        )
    }
}

#[derive(Debug, Default)]
struct ReporterState {
    last_percent: Option<u8>,
    finished: bool,
}

/// 確保進度單調不減、`Finished` 只送出一次且為最後一個事件
#[derive(Debug)]
pub struct ProgressReporter {
    sender: Sender<PipelineEvent>,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(sender: Sender<PipelineEvent>) -> Self {
        Self {
            sender,
            state: Mutex::new(ReporterState::default()),
        }
    }

    pub fn progress(&self, percent: f64) {
        let percent = if percent.is_nan() {
            0
        } else {
            percent.clamp(0.0, 100.0).floor() as u8
        };

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.finished || state.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        state.last_percent = Some(percent);
        self.send(PipelineEvent::Progress(percent));
    }

    pub fn status(&self, message: impl Into<String>) {
        let Ok(state) = self.state.lock() else {
            return;
        };
        if state.finished {
            return;
        }
        self.send(PipelineEvent::Status(message.into()));
    }

    /// 送出結束通知；重複呼叫會被忽略並回傳 `false`
    pub fn finish(&self, result: RunResult) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.finished {
            return false;
        }
        state.finished = true;
        self.send(PipelineEvent::Finished(result));
        true
    }

    #[must_use]
    pub fn last_percent(&self) -> Option<u8> {
        self.state.lock().ok().and_then(|state| state.last_percent)
    }

    fn send(&self, event: PipelineEvent) {
        if self.sender.send(event).is_err() {
            debug!("接收端已關閉，略過事件");
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// 混剪流程的錯誤分類
///
/// `AnalysisFailure` 與 `CutFailure` 只影響單一檔案或單一片段，
/// 其餘錯誤會中止整次混剪。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixError {
    #[error("沒有輸入檔案")]
    NoInput,

    #[error("分析失敗 {}: {reason}", .path.display())]
    AnalysisFailure { path: PathBuf, reason: String },

    #[error("切割失敗 {} [{start:.2}s, {end:.2}s): {reason}", .path.display())]
    CutFailure {
        path: PathBuf,
        start: f64,
        end: f64,
        reason: String,
    },

    #[error("沒有任何可用的候選片段")]
    NoClips,

    #[error("沒有片段能放入目標長度 {target:.2}s")]
    InsufficientClips { target: f64 },

    #[error("選出的片段全部無法通過重新驗證")]
    NoValidClips,

    #[error("輸出失敗: {0}")]
    WriteError(String),

    #[error("操作已取消")]
    Cancelled,
}

impl MixError {
    /// 是否會中止整次混剪
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::AnalysisFailure { .. } | Self::CutFailure { .. })
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoInput => "NoInput",
            Self::AnalysisFailure { .. } => "AnalysisFailure",
            Self::CutFailure { .. } => "CutFailure",
            Self::NoClips => "NoClips",
            Self::InsufficientClips { .. } => "InsufficientClips",
            Self::NoValidClips => "NoValidClips",
            Self::WriteError(_) => "WriteError",
            Self::Cancelled => "Cancelled",
        }
    }

    pub(crate) fn analysis(path: impl Into<PathBuf>, error: &anyhow::Error) -> Self {
        Self::AnalysisFailure {
            path: path.into(),
            reason: format!("{error:#}"),
        }
    }
}

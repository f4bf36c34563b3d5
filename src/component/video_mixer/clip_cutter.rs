use super::error::MixError;
use crate::config::MixerSettings;
use crate::tools::{MediaCodec, MediaHandle};
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// 候選片段
///
/// 只記錄來源路徑與時間範圍，不持有任何解碼資源；
/// 之後的階段需要時再從路徑重新開啟。
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateClip {
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
}

impl CandidateClip {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// 片段長度必須落在 (min, max) 開區間內
#[must_use]
pub fn is_valid_clip_duration(duration: f64, settings: &MixerSettings) -> bool {
    duration > settings.min_clip_seconds && duration < settings.max_clip_seconds
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    Accepted(CandidateClip),
    /// 長度不符，不算錯誤
    Rejected { duration: f64 },
    Failed(MixError),
}

#[derive(Debug, Default)]
pub struct CutReport {
    pub clips: Vec<CandidateClip>,
    pub rejected: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// 將切點轉成通過驗證的候選片段
pub struct ClipCutter<'a> {
    codec: &'a dyn MediaCodec,
    settings: &'a MixerSettings,
}

impl<'a> ClipCutter<'a> {
    #[must_use]
    pub fn new(codec: &'a dyn MediaCodec, settings: &'a MixerSettings) -> Self {
        Self { codec, settings }
    }

    /// 處理一組相鄰切點；片段 handle 只在此函式內有效
    #[must_use]
    pub fn cut_pair(&self, media: &MediaHandle, start: f64, end: f64) -> ClipOutcome {
        let duration = end - start;
        if !is_valid_clip_duration(duration, self.settings) {
            return ClipOutcome::Rejected { duration };
        }

        let failure = |reason: String| {
            ClipOutcome::Failed(MixError::CutFailure {
                path: media.path.clone(),
                start,
                end,
                reason,
            })
        };

        let clip = match self.codec.subclip(media, start, end) {
            Ok(clip) => clip,
            Err(e) => return failure(format!("{e:#}")),
        };

        let frame = self.codec.read_frame(&clip, 0.0);
        self.codec.close(clip.into());

        match frame {
            Ok(frame) if !frame.is_empty() => ClipOutcome::Accepted(CandidateClip {
                source: media.path.clone(),
                start,
                end,
            }),
            Ok(_) => failure("第一個畫面為空".to_string()),
            Err(e) => failure(format!("{e:#}")),
        }
    }

    /// 逐一處理所有相鄰切點，單一片段失敗不影響其餘片段
    ///
    /// `on_progress` 收到的是已處理組數占總組數的比例。
    pub fn cut(
        &self,
        media: &MediaHandle,
        boundaries: &[f64],
        on_progress: &mut dyn FnMut(f64),
        cancel: &AtomicBool,
    ) -> CutReport {
        let mut report = CutReport::default();
        let total_pairs = boundaries.len().saturating_sub(1);

        for (index, pair) in boundaries.windows(2).enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!("收到中斷訊號，停止切割: {}", media.path.display());
                report.cancelled = true;
                break;
            }

            match self.cut_pair(media, pair[0], pair[1]) {
                ClipOutcome::Accepted(clip) => report.clips.push(clip),
                ClipOutcome::Rejected { duration } => {
                    debug!(
                        "略過長度 {duration:.2}s 的片段 [{:.2}, {:.2})",
                        pair[0], pair[1]
                    );
                    report.rejected += 1;
                }
                ClipOutcome::Failed(error) => {
                    warn!("[{}] {error}", error.kind());
                    report.failed += 1;
                }
            }

            on_progress((index + 1) as f64 / total_pairs as f64);
        }

        debug!(
            "{}: {} 個片段, {} 個長度不符, {} 個失敗",
            media.path.display(),
            report.clips.len(),
            report.rejected,
            report.failed
        );

        report
    }
}

use super::clip_cutter::CandidateClip;
use super::error::MixError;
use super::events::{ProgressRange, ProgressReporter};
use crate::config::{MixerSettings, OUTPUT_PREFIX};
use crate::tools::{HandleScope, MediaCodec, MediaHandle, WriteOptions};
use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use log::{info, warn};
use rust_i18n::t;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// `mixed_video_YYYYMMDD_HHMMSS.mp4`
#[must_use]
pub fn output_file_name(now: DateTime<Local>) -> String {
    format!("{OUTPUT_PREFIX}{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// 輸出檔放在第一個輸入檔所在的資料夾
#[must_use]
pub fn output_path_for(first_input: &Path, now: DateTime<Local>) -> PathBuf {
    let dir = match first_input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    dir.join(output_file_name(now))
}

/// 依選定順序串接片段並編碼輸出
pub struct Assembler<'a> {
    codec: &'a dyn MediaCodec,
    settings: &'a MixerSettings,
}

impl<'a> Assembler<'a> {
    #[must_use]
    pub fn new(codec: &'a dyn MediaCodec, settings: &'a MixerSettings) -> Self {
        Self { codec, settings }
    }

    pub fn assemble(
        &self,
        clips: &[CandidateClip],
        output: &Path,
        reporter: &ProgressReporter,
        range: ProgressRange,
        cancel: &AtomicBool,
    ) -> Result<PathBuf, MixError> {
        if clips.is_empty() {
            return Err(MixError::NoValidClips);
        }

        let mut scope = HandleScope::new(self.codec);
        let result = self.render(&mut scope, clips, output, reporter, range, cancel);
        scope.release();

        match result {
            Ok(()) => {
                reporter.progress(range.end);
                info!("輸出完成: {}", output.display());
                Ok(output.to_path_buf())
            }
            Err(_) if cancel.load(Ordering::SeqCst) => {
                warn!("輸出已中止");
                Err(MixError::Cancelled)
            }
            Err(e) => Err(MixError::WriteError(format!("{e:#}"))),
        }
    }

    fn render(
        &self,
        scope: &mut HandleScope<'_>,
        clips: &[CandidateClip],
        output: &Path,
        reporter: &ProgressReporter,
        range: ProgressRange,
        cancel: &AtomicBool,
    ) -> Result<()> {
        // 同一來源只開啟一次
        let mut opened: HashMap<PathBuf, MediaHandle> = HashMap::new();
        let mut handles = Vec::with_capacity(clips.len());

        for clip in clips {
            if cancel.load(Ordering::SeqCst) {
                bail!(MixError::Cancelled);
            }
            let media = match opened.get(&clip.source) {
                Some(media) => media.clone(),
                None => {
                    let media = scope.open(&clip.source)?;
                    opened.insert(clip.source.clone(), media.clone());
                    media
                }
            };
            handles.push(scope.subclip(&media, clip.start, clip.end)?);
        }

        let sequence = scope.concatenate(&handles)?;
        reporter.status(t!(
            "mixer.status.rendering",
            count = clips.len(),
            seconds = format!("{:.1}", sequence.duration)
        ));

        let options = WriteOptions::from_settings(self.settings);
        let mut on_progress = |fraction: f64| {
            if cancel.load(Ordering::SeqCst) {
                return ControlFlow::Break(());
            }
            reporter.progress(range.at(fraction));
            ControlFlow::Continue(())
        };
        self.codec.write(&sequence, output, &options, &mut on_progress)
    }
}

use super::clip_cutter::CandidateClip;
use super::error::MixError;
use crate::config::MixerSettings;
use crate::tools::{HandleScope, MediaCodec};
use anyhow::{Result, bail};
use log::{debug, info, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};

/// 選出的片段與其目標長度
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub target: f64,
    pub clips: Vec<CandidateClip>,
}

impl Selection {
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(CandidateClip::duration).sum()
    }
}

/// 在 `[target_min, target_max]` 之間均勻抽取目標長度
pub fn draw_target_duration<R: Rng>(rng: &mut R, settings: &MixerSettings) -> f64 {
    let (min, max) = (settings.target_min_seconds, settings.target_max_seconds);
    if max <= min {
        return min;
    }
    rng.random_range(min..=max)
}

/// 單次走訪的貪婪填裝：放得下就收，累計達到目標即停止
///
/// 不追求最佳組合；累計長度在任何時刻都不超過 `target`。
#[must_use]
pub fn greedy_fill<I>(clips: I, target: f64) -> Vec<CandidateClip>
where
    I: IntoIterator<Item = CandidateClip>,
{
    let mut current = 0.0;
    let mut selected = Vec::new();

    for clip in clips {
        let duration = clip.duration();
        if current + duration <= target {
            current += duration;
            selected.push(clip);
            if current >= target {
                break;
            }
        }
    }

    selected
}

/// 打亂候選池並選出不超過目標長度的片段，再逐一重新驗證
pub struct Selector<'a> {
    codec: &'a dyn MediaCodec,
}

impl<'a> Selector<'a> {
    #[must_use]
    pub fn new(codec: &'a dyn MediaCodec) -> Self {
        Self { codec }
    }

    pub fn select<R: Rng>(
        &self,
        mut pool: Vec<CandidateClip>,
        target: f64,
        rng: &mut R,
    ) -> Result<Selection, MixError> {
        pool.shuffle(rng);
        let clips = greedy_fill(pool, target);

        if clips.is_empty() {
            return Err(MixError::InsufficientClips { target });
        }

        let selection = Selection { target, clips };
        info!(
            "選出 {} 個片段, 共 {:.2}s（目標 {target:.2}s）",
            selection.clips.len(),
            selection.total_duration()
        );
        Ok(selection)
    }

    /// 從來源路徑重新開啟每個片段並確認第一個畫面可讀，移除失效的片段
    pub fn revalidate(
        &self,
        selection: Selection,
        cancel: &AtomicBool,
    ) -> Result<Selection, MixError> {
        let mut valid = Vec::with_capacity(selection.clips.len());

        for clip in selection.clips {
            if cancel.load(Ordering::SeqCst) {
                return Err(MixError::Cancelled);
            }

            match self.check_readable(&clip) {
                Ok(()) => valid.push(clip),
                Err(e) => warn!(
                    "片段重新驗證失敗，已移除 {} [{:.2}, {:.2}): {e:#}",
                    clip.source.display(),
                    clip.start,
                    clip.end
                ),
            }
        }

        if valid.is_empty() {
            return Err(MixError::NoValidClips);
        }

        debug!("重新驗證後保留 {} 個片段", valid.len());
        Ok(Selection {
            target: selection.target,
            clips: valid,
        })
    }

    fn check_readable(&self, clip: &CandidateClip) -> Result<()> {
        let mut scope = HandleScope::new(self.codec);
        let media = scope.open(&clip.source)?;
        let handle = scope.subclip(&media, clip.start, clip.end)?;
        let frame = self.codec.read_frame(&handle, 0.0)?;
        if frame.is_empty() {
            bail!("第一個畫面為空");
        }
        Ok(())
    }
}

use super::error::MixError;
use crate::config::MixerSettings;
use crate::tools::{AudioAnalyzer, MediaCodec, MediaHandle};
use log::{debug, info};
use std::path::Path;

/// 單聲道音訊取樣
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
}

/// 產生 0 起算、固定間隔、小於 `duration` 的切點
#[must_use]
pub fn fixed_cadence(duration: f64, interval: f64) -> Vec<f64> {
    if !(duration > 0.0 && duration.is_finite() && interval > 0.0) {
        return Vec::new();
    }
    let count = (duration / interval).ceil() as usize;
    (0..count)
        .map(|i| i as f64 * interval)
        .take_while(|t| *t < duration)
        .collect()
}

/// 整理切點：排序、去重、去掉超出範圍的點，並以影片長度作為最後一個切點
///
/// 回傳值嚴格遞增、非空，且最後一個元素等於 `duration`。
#[must_use]
pub fn finalize_boundaries(mut raw: Vec<f64>, duration: f64) -> Vec<f64> {
    let duration = duration.max(0.0);

    raw.retain(|t| t.is_finite() && *t >= 0.0 && *t < duration);
    raw.sort_by(f64::total_cmp);
    raw.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

    if raw.last().is_none_or(|last| *last < duration) {
        raw.push(duration);
    }
    raw
}

/// 找出單一影片的切點
pub struct BoundaryExtractor<'a> {
    analyzer: &'a dyn AudioAnalyzer,
    settings: &'a MixerSettings,
}

impl<'a> BoundaryExtractor<'a> {
    #[must_use]
    pub fn new(analyzer: &'a dyn AudioAnalyzer, settings: &'a MixerSettings) -> Self {
        Self { analyzer, settings }
    }

    /// 依音訊計算切點；沒有音訊或分析結果少於兩點時改用固定間隔
    pub fn compute(
        &self,
        path: &Path,
        duration: f64,
        audio: Option<AudioBuffer<'_>>,
    ) -> Result<Vec<f64>, MixError> {
        let raw = match audio.filter(|a| !a.samples.is_empty()) {
            None => {
                debug!("沒有可分析的音訊，使用固定間隔: {}", path.display());
                self.fallback(duration)
            }
            Some(audio) => {
                let detected = self
                    .analyzer
                    .detect_boundaries(audio.samples, audio.sample_rate)
                    .map_err(|e| MixError::analysis(path, &e))?;

                if detected.len() < 2 {
                    info!(
                        "節奏點不足（{} 個），改用固定間隔: {}",
                        detected.len(),
                        path.display()
                    );
                    self.fallback(duration)
                } else {
                    detected
                }
            }
        };

        Ok(finalize_boundaries(raw, duration))
    }

    /// 從已開啟的影片取得音訊後計算切點
    pub fn extract(
        &self,
        codec: &dyn MediaCodec,
        media: &MediaHandle,
        duration: f64,
    ) -> Result<Vec<f64>, MixError> {
        let has_audio = codec
            .has_audio_track(media)
            .map_err(|e| MixError::analysis(&media.path, &e))?;

        if !has_audio {
            return self.compute(&media.path, duration, None);
        }

        let sample_rate = self.settings.analysis_sample_rate;
        let samples = codec
            .decode_mono(&media.path, sample_rate)
            .map_err(|e| MixError::analysis(&media.path, &e))?;

        self.compute(
            &media.path,
            duration,
            Some(AudioBuffer {
                samples: &samples,
                sample_rate,
            }),
        )
    }

    fn fallback(&self, duration: f64) -> Vec<f64> {
        fixed_cadence(duration, self.settings.fallback_interval_seconds)
    }
}

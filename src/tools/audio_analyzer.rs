//! 音訊節奏點分析
//!
//! 以 STFT 頻譜的正向變化量（spectral flux）作為 onset 強度，再用峰值挑選找出節奏點。

use anyhow::{Result, bail};
use log::debug;
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;

pub trait AudioAnalyzer: Send + Sync {
    /// 回傳遞增排序的節奏點時間（秒）
    fn detect_boundaries(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>>;
}

/// Spectral flux 節奏點偵測
#[derive(Debug, Clone)]
pub struct OnsetAnalyzer {
    pub frame_size: usize,
    pub hop_size: usize,
    /// 峰值需高於區域平均值的門檻（包絡已正規化至 [0, 1]）
    pub delta: f32,
    pub pre_max_seconds: f64,
    pub pre_avg_seconds: f64,
    pub post_avg_seconds: f64,
    /// 兩個節奏點之間的最短間隔
    pub wait_seconds: f64,
}

impl Default for OnsetAnalyzer {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            delta: 0.07,
            pre_max_seconds: 0.03,
            pre_avg_seconds: 0.10,
            post_avg_seconds: 0.10,
            wait_seconds: 0.03,
        }
    }
}

impl OnsetAnalyzer {
    /// 計算每個 hop 的 onset 強度（已正規化），frame 以 hop 位置為中心
    ///
    /// 以 Hann 視窗做 STFT，對數壓縮後的幅度逐 bin 取正向差值加總（spectral flux）。
    #[must_use]
    pub fn onset_envelope(&self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() || self.hop_size == 0 || self.frame_size < 2 {
            return Vec::new();
        }

        let n_fft = self.frame_size;
        let half = n_fft / 2;
        let num_bins = n_fft / 2 + 1;
        let frame_count = samples.len() / self.hop_size + 1;

        let window: Vec<f32> = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let mut previous: Option<Vec<f32>> = None;
        let mut envelope = Vec::with_capacity(frame_count);

        for i in 0..frame_count {
            let center = i * self.hop_size;
            for (k, (slot, w)) in buffer.iter_mut().zip(&window).enumerate() {
                let sample = (center + k)
                    .checked_sub(half)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex::new(sample * w, 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);

            let magnitudes: Vec<f32> = buffer[..num_bins]
                .iter()
                .map(|c| c.norm().ln_1p())
                .collect();

            let flux = previous.as_ref().map_or(0.0, |prev| {
                magnitudes
                    .iter()
                    .zip(prev)
                    .map(|(cur, prev)| (cur - prev).max(0.0))
                    .sum::<f32>()
            });
            envelope.push(flux);
            previous = Some(magnitudes);
        }

        let max = envelope.iter().copied().fold(0.0_f32, f32::max);
        if max <= f32::EPSILON {
            return vec![0.0; envelope.len()];
        }
        envelope.iter_mut().for_each(|v| *v /= max);
        envelope
    }

    /// 在 onset 強度上挑選峰值，回傳 frame 索引
    fn pick_peaks(&self, envelope: &[f32], frames_per_second: f64) -> Vec<usize> {
        let to_frames = |seconds: f64| (seconds * frames_per_second).round() as usize;
        let pre_max = to_frames(self.pre_max_seconds);
        let pre_avg = to_frames(self.pre_avg_seconds);
        let post_avg = to_frames(self.post_avg_seconds) + 1;
        let wait = to_frames(self.wait_seconds);

        let mut peaks = Vec::new();
        let mut last_peak: Option<usize> = None;

        for (n, &value) in envelope.iter().enumerate() {
            if value <= 0.0 {
                continue;
            }

            let max_start = n.saturating_sub(pre_max);
            let local_max = envelope[max_start..=n]
                .iter()
                .copied()
                .fold(f32::MIN, f32::max);
            if value < local_max {
                continue;
            }

            let avg_start = n.saturating_sub(pre_avg);
            let avg_end = (n + post_avg).min(envelope.len());
            let window = &envelope[avg_start..avg_end];
            let local_mean = window.iter().sum::<f32>() / window.len() as f32;
            if value < local_mean + self.delta {
                continue;
            }

            if last_peak.is_some_and(|last| n <= last + wait) {
                continue;
            }

            peaks.push(n);
            last_peak = Some(n);
        }

        peaks
    }
}

impl AudioAnalyzer for OnsetAnalyzer {
    fn detect_boundaries(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>> {
        if sample_rate == 0 {
            bail!("取樣率不可為 0");
        }
        if samples.iter().any(|s| !s.is_finite()) {
            bail!("音訊資料含有無效數值");
        }

        let envelope = self.onset_envelope(samples);
        let frames_per_second = f64::from(sample_rate) / self.hop_size as f64;
        let peaks = self.pick_peaks(&envelope, frames_per_second);

        let times: Vec<f64> = peaks
            .into_iter()
            .map(|frame| frame as f64 / frames_per_second)
            .collect();

        debug!(
            "偵測到 {} 個節奏點（{} 個取樣, {} Hz）",
            times.len(),
            samples.len(),
            sample_rate
        );

        Ok(times)
    }
}

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_RECENT_PATHS: usize = 10;
/// 同時處理的來源檔案數上限
pub const MAX_PARALLEL_FILES: usize = 32;
/// 固定切割間隔的下限（秒）
pub const MIN_FALLBACK_INTERVAL_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnUs => write!(f, "English"),
            Self::ZhTw => write!(f, "繁體中文"),
        }
    }
}

/// 混剪流程參數
///
/// 預設值即為標準行為：片段長度 (0.5, 10.0) 秒、無音訊時每 3 秒切一刀、
/// 目標長度在 [30, 60] 秒之間隨機、輸出 24 fps 的 H.264/AAC。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// 片段最短長度（秒，不含）
    pub min_clip_seconds: f64,
    /// 片段最長長度（秒，不含）
    pub max_clip_seconds: f64,
    /// 無法分析音訊時的固定切割間隔（秒）
    pub fallback_interval_seconds: f64,
    pub target_min_seconds: f64,
    pub target_max_seconds: f64,
    /// 音訊分析用的取樣率
    pub analysis_sample_rate: u32,
    pub output_fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// 同時處理的來源檔案數，1 代表逐一處理
    pub parallel_files: usize,
    /// 固定亂數種子，用於重現同一次混剪
    pub seed: Option<u64>,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            min_clip_seconds: 0.5,
            max_clip_seconds: 10.0,
            fallback_interval_seconds: 3.0,
            target_min_seconds: 30.0,
            target_max_seconds: 60.0,
            analysis_sample_rate: 22_050,
            output_fps: 24,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            parallel_files: 1,
            seed: None,
        }
    }
}

impl MixerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_clip_seconds >= 0.0
            && self.min_clip_seconds < self.max_clip_seconds
            && self.max_clip_seconds.is_finite())
        {
            bail!(
                "片段長度範圍無效: ({}, {})",
                self.min_clip_seconds,
                self.max_clip_seconds
            );
        }
        if !(self.target_min_seconds > 0.0
            && self.target_min_seconds <= self.target_max_seconds
            && self.target_max_seconds.is_finite())
        {
            bail!(
                "目標長度範圍無效: [{}, {}]",
                self.target_min_seconds,
                self.target_max_seconds
            );
        }
        // 固定間隔切出的片段必須能通過長度篩選
        if !(self.fallback_interval_seconds >= MIN_FALLBACK_INTERVAL_SECONDS
            && self.fallback_interval_seconds > self.min_clip_seconds
            && self.fallback_interval_seconds < self.max_clip_seconds)
        {
            bail!(
                "固定切割間隔 {} 秒無效，需不小於 {MIN_FALLBACK_INTERVAL_SECONDS} 且介於片段長度範圍內",
                self.fallback_interval_seconds
            );
        }
        if !(1..=MAX_PARALLEL_FILES).contains(&self.parallel_files) {
            bail!(
                "同時處理檔案數 {} 無效，需介於 1 到 {MAX_PARALLEL_FILES}",
                self.parallel_files
            );
        }
        if self.analysis_sample_rate == 0 || self.output_fps == 0 {
            bail!("取樣率與輸出幀率必須大於 0");
        }
        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            bail!("編碼器名稱不可為空");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub language: Language,
    pub recent_paths: Vec<String>,
    pub mixer: MixerSettings,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: UserSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_settings_default_is_valid() {
        let settings = MixerSettings::default();
        assert!(settings.validate().is_ok());
        assert!((settings.min_clip_seconds - 0.5).abs() < f64::EPSILON);
        assert!((settings.max_clip_seconds - 10.0).abs() < f64::EPSILON);
        assert_eq!(settings.output_fps, 24);
    }

    #[test]
    fn test_mixer_settings_validate_rejects_bad_ranges() {
        let settings = MixerSettings {
            min_clip_seconds: 10.0,
            max_clip_seconds: 5.0,
            ..MixerSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = MixerSettings {
            target_min_seconds: 70.0,
            ..MixerSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = MixerSettings {
            fallback_interval_seconds: 0.0,
            ..MixerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_mixer_settings_validate_rejects_bad_parallelism() {
        for parallel_files in [0, MAX_PARALLEL_FILES + 1, usize::MAX] {
            let settings = MixerSettings {
                parallel_files,
                ..MixerSettings::default()
            };
            assert!(settings.validate().is_err(), "parallel_files = {parallel_files}");
        }

        let settings = MixerSettings {
            parallel_files: MAX_PARALLEL_FILES,
            ..MixerSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_mixer_settings_validate_rejects_unusable_cadence() {
        for fallback_interval_seconds in [1e-9, 0.05, 0.5, 10.0, f64::NAN, f64::INFINITY] {
            let settings = MixerSettings {
                fallback_interval_seconds,
                ..MixerSettings::default()
            };
            assert!(
                settings.validate().is_err(),
                "fallback_interval_seconds = {fallback_interval_seconds}"
            );
        }

        let settings = MixerSettings {
            min_clip_seconds: 0.0,
            fallback_interval_seconds: MIN_FALLBACK_INTERVAL_SECONDS,
            ..MixerSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_user_settings_partial_json_uses_defaults() {
        let json = r#"{ "language": "zh-TW", "mixer": { "parallel_files": 4 } }"#;
        let settings: UserSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.language, Language::ZhTw);
        assert_eq!(settings.mixer.parallel_files, 4);
        assert_eq!(settings.mixer.output_fps, 24);
        assert!(settings.recent_paths.is_empty());
    }
}

use crate::config::types::{Config, MixerSettings, UserSettings};
use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";

impl Config {
    pub fn new() -> Result<Self> {
        Ok(Self::from_file(Path::new(SETTINGS_FILE)))
    }

    /// 讀取設定檔；無法解析時先備份原檔，再改用預設值
    #[must_use]
    pub fn from_file(path: &Path) -> Self {
        let settings = match Self::load_settings(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("讀取設定失敗，改用預設值: {e:#}");
                backup_unreadable(path);
                UserSettings::default()
            }
        };

        Self { settings }
    }

    /// 讀取設定檔
    ///
    /// 混剪參數無效時只重設混剪參數，語言與路徑歷史保留。
    pub fn load_settings(path: &Path) -> Result<UserSettings> {
        if !path.exists() {
            return Ok(UserSettings::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;

        let mut settings = match serde_json::from_value::<UserSettings>(value.clone()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{} 部分欄位格式錯誤，逐項讀取: {e}", path.display());
                UserSettings {
                    language: field_or_default(&value, "language"),
                    recent_paths: field_or_default(&value, "recent_paths"),
                    mixer: field_or_default(&value, "mixer"),
                }
            }
        };

        if let Err(e) = settings.mixer.validate() {
            warn!("{} 的混剪參數無效，改用預設參數: {e:#}", path.display());
            settings.mixer = MixerSettings::default();
        }

        Ok(settings)
    }
}

fn field_or_default<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .and_then(|field| serde_json::from_value(field.clone()).ok())
        .unwrap_or_default()
}

/// 把無法解析的設定檔改名為 `*.bak`，之後的儲存不會覆蓋使用者原本的內容
fn backup_unreadable(path: &Path) {
    if !path.exists() {
        return;
    }
    let backup = path.with_extension("json.bak");
    match fs::rename(path, &backup) {
        Ok(()) => warn!("已將原設定檔備份至 {}", backup.display()),
        Err(e) => warn!("無法備份設定檔 {}: {e}", path.display()),
    }
}

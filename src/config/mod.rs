pub mod file_type;
pub mod load;
pub mod save;
pub mod types;

pub use file_type::{OUTPUT_PREFIX, VIDEO_EXTENSIONS, is_mixer_output, is_supported_video};
pub use types::{
    Config, Language, MAX_PARALLEL_FILES, MAX_RECENT_PATHS, MIN_FALLBACK_INTERVAL_SECONDS,
    MixerSettings, UserSettings,
};

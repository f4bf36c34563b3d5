use std::path::Path;

/// 可作為混剪來源的影片副檔名（小寫，不含點）
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[must_use]
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
}

/// 混剪輸出檔名的前綴
pub const OUTPUT_PREFIX: &str = "mixed_video_";

/// 先前混剪產生的輸出，不再作為來源
#[must_use]
pub fn is_mixer_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(OUTPUT_PREFIX))
}

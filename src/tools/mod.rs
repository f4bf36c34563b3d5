mod audio_analyzer;
mod ffmpeg_codec;
mod ffprobe_info;
mod media_codec;
mod path_validator;
mod video_scanner;

pub use audio_analyzer::{AudioAnalyzer, OnsetAnalyzer};
pub use ffmpeg_codec::{
    FfmpegCodec, RenderSegment, build_decode_args, build_filter_complex, build_frame_args,
    build_render_args,
};
pub use ffprobe_info::{VideoInfo, get_video_info};
pub use media_codec::{
    ClipHandle, Frame, Handle, HandleId, HandleScope, MediaCodec, MediaHandle, SequenceHandle,
    WriteOptions, WriteProgress,
};
pub use path_validator::{validate_directory_exists, validate_output_directory};
pub use video_scanner::{VideoFileInfo, scan_video_files};

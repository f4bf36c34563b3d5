//! E2E 測試 - 以 ffmpeg 產生測試影片，走完整個混剪流程
//!
//! 系統上沒有 ffmpeg/ffprobe 時略過。

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use video_mixer::component::video_mixer::{PipelineEvent, PipelineState, VideoMixerPipeline};
use video_mixer::config::MixerSettings;
use video_mixer::tools::{
    FfmpegCodec, HandleScope, MediaCodec, OnsetAnalyzer, get_video_info, scan_video_files,
};

fn ffmpeg_available() -> bool {
    if FfmpegCodec::check_available().is_err() {
        println!("跳過測試：找不到 ffmpeg/ffprobe");
        return false;
    }
    true
}

/// 產生測試影片；`beeps` 為真時加上每秒一次的短音
fn generate_video(path: &Path, seconds: u32, beeps: bool) {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("testsrc=duration={seconds}:size=320x240:rate=24"),
    ];
    if beeps {
        args.extend([
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!("sine=frequency=880:beep_factor=4:duration={seconds}:sample_rate=22050"),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
        ]);
    } else {
        args.push("-an".into());
    }
    args.extend([
        "-c:v".into(),
        "mpeg4".into(),
        path.to_string_lossy().to_string(),
    ]);

    let status = Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "無法產生測試影片 {}", path.display());
}

fn test_settings() -> MixerSettings {
    MixerSettings {
        target_min_seconds: 8.0,
        target_max_seconds: 12.0,
        video_codec: "mpeg4".to_string(),
        seed: Some(11),
        ..MixerSettings::default()
    }
}

/// 測試 1: handle 關閉後不可再使用
#[test]
fn test_ffmpeg_codec_handle_validity() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("source.mp4");
    generate_video(&video, 6, true);

    let codec = FfmpegCodec::new();
    let media = codec.open(&video).unwrap();
    let duration = codec.duration(&media).unwrap();
    assert!((duration - 6.0).abs() < 0.5, "時長 {duration}");
    assert!(codec.has_audio_track(&media).unwrap());

    let clip = codec.subclip(&media, 1.0, 3.0).unwrap();
    let frame = codec.read_frame(&clip, 0.0).unwrap();
    assert!(!frame.is_empty());

    codec.close(media.into());
    assert!(codec.read_frame(&clip, 0.0).is_err());

    let samples = codec.decode_mono(&video, 22_050).unwrap();
    assert!(samples.len() > 22_050 * 5);

    println!("✓ handle 有效範圍測試通過");
}

/// 測試 2: HandleScope 結束時關閉所有 handle
#[test]
fn test_handle_scope_closes_on_drop() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("source.mp4");
    generate_video(&video, 4, false);

    let codec = FfmpegCodec::new();
    let clip = {
        let mut scope = HandleScope::new(&codec);
        let media = scope.open(&video).unwrap();
        let clip = scope.subclip(&media, 0.0, 2.0).unwrap();
        assert!(codec.read_frame(&clip, 0.0).is_ok());
        assert_eq!(scope.len(), 2);
        clip
    };
    assert!(codec.read_frame(&clip, 0.0).is_err());
}

/// 測試 3: 完整混剪流程
#[test]
fn test_mix_generated_videos() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = vec![
        dir.path().join("a_beeps.mp4"),
        dir.path().join("b_silent.mp4"),
    ];
    generate_video(&inputs[0], 12, true);
    generate_video(&inputs[1], 12, false);

    let found = scan_video_files(dir.path()).unwrap();
    assert_eq!(found.len(), 2);

    let pipeline = VideoMixerPipeline::new(
        Arc::new(FfmpegCodec::new()),
        Arc::new(OnsetAnalyzer::default()),
        test_settings(),
    )
    .unwrap();
    let handle = pipeline
        .spawn(inputs, Arc::new(AtomicBool::new(false)))
        .unwrap();
    let events: Vec<PipelineEvent> = handle.events.iter().collect();
    let report = handle.wait().unwrap();

    let PipelineState::Done(output) = &report.state else {
        panic!("混剪失敗: {:?}", report.state);
    };
    assert!(output.exists());
    assert!(matches!(events.last(), Some(PipelineEvent::Finished(_))));

    let info = get_video_info(output).unwrap();
    assert!(info.has_audio, "輸出應包含音軌");
    assert!(
        (info.duration_seconds - report.selected_seconds).abs() < 1.0,
        "輸出長度 {} 與選用長度 {} 差距過大",
        info.duration_seconds,
        report.selected_seconds
    );
    assert_eq!(info.width, 320);
    assert_eq!(info.height, 240);

    // 暫存目錄已清除，輸出不會被當成下一次的輸入
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty());
    assert_eq!(scan_video_files(dir.path()).unwrap().len(), 2);

    println!("✓ 混剪完成: {}", output.display());
}

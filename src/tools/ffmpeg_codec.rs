//! 以 ffmpeg/ffprobe 命令列實作的 [`MediaCodec`]
//!
//! handle 只是登記在表中的 id；`subclip` 不重新編碼，
//! 實際的剪接與編碼全部延遲到 `write` 以單一 ffmpeg 程序完成。

use super::ffprobe_info::{VideoInfo, get_video_info};
use super::media_codec::{
    ClipHandle, Frame, Handle, HandleId, MediaCodec, MediaHandle, SequenceHandle, WriteOptions,
    WriteProgress,
};
use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// 可讀性檢查用的縮小畫面尺寸
const PROBE_FRAME_WIDTH: u32 = 64;
const PROBE_FRAME_HEIGHT: u32 = 36;

/// 無音軌片段補上的靜音規格
const SILENCE_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone)]
struct MediaEntry {
    path: PathBuf,
    info: VideoInfo,
}

/// 組成輸出序列的單一片段
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSegment {
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
    pub has_audio: bool,
}

impl RenderSegment {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
struct ClipEntry {
    media: HandleId,
    segment: RenderSegment,
    width: u32,
    height: u32,
}

#[derive(Debug, Default)]
struct CodecState {
    media: HashMap<HandleId, MediaEntry>,
    clips: HashMap<HandleId, ClipEntry>,
    sequences: HashMap<HandleId, Vec<HandleId>>,
}

#[derive(Debug, Default)]
pub struct FfmpegCodec {
    state: Mutex<CodecState>,
    next_id: AtomicU64,
}

impl FfmpegCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 確認系統上可以執行 ffmpeg 與 ffprobe
    pub fn check_available() -> Result<()> {
        for tool in ["ffmpeg", "ffprobe"] {
            let status = Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .with_context(|| format!("找不到 {tool}，請確認已安裝並在 PATH 中"))?;
            if !status.success() {
                bail!("{tool} 無法正常執行");
            }
        }
        Ok(())
    }

    fn next_id(&self) -> HandleId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CodecState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("codec 狀態鎖已損壞"))
    }

    fn media_entry(&self, media: &MediaHandle) -> Result<MediaEntry> {
        self.lock()?
            .media
            .get(&media.id)
            .cloned()
            .ok_or_else(|| anyhow!("影片 handle #{} 已關閉: {}", media.id, media.path.display()))
    }

    fn clip_entry(&self, clip: &ClipHandle) -> Result<ClipEntry> {
        let state = self.lock()?;
        let entry = state
            .clips
            .get(&clip.id)
            .cloned()
            .ok_or_else(|| anyhow!("片段 handle #{} 已關閉", clip.id))?;
        if !state.media.contains_key(&entry.media) {
            bail!(
                "片段 handle #{} 的來源已關閉: {}",
                clip.id,
                entry.segment.source.display()
            );
        }
        Ok(entry)
    }
}

impl MediaCodec for FfmpegCodec {
    fn open(&self, path: &Path) -> Result<MediaHandle> {
        if !path.is_file() {
            bail!("檔案不存在: {}", path.display());
        }
        let info = get_video_info(path)?;
        let id = self.next_id();

        debug!(
            "開啟影片 #{id}: {} ({:.2}s, {}x{}, audio={})",
            path.display(),
            info.duration_seconds,
            info.width,
            info.height,
            info.has_audio
        );

        self.lock()?.media.insert(
            id,
            MediaEntry {
                path: path.to_path_buf(),
                info,
            },
        );

        Ok(MediaHandle {
            id,
            path: path.to_path_buf(),
        })
    }

    fn duration(&self, media: &MediaHandle) -> Result<f64> {
        Ok(self.media_entry(media)?.info.duration_seconds)
    }

    fn has_audio_track(&self, media: &MediaHandle) -> Result<bool> {
        Ok(self.media_entry(media)?.info.has_audio)
    }

    fn decode_mono(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        let args = build_decode_args(path, sample_rate);
        debug!("解碼音訊: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("無法執行 ffmpeg 解碼音訊: {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg 解碼音訊失敗: {}", stderr.trim());
        }

        Ok(parse_f32le(&output.stdout))
    }

    fn subclip(&self, media: &MediaHandle, start: f64, end: f64) -> Result<ClipHandle> {
        let entry = self.media_entry(media)?;
        if !(start >= 0.0 && start < end && end <= entry.info.duration_seconds + 1e-6) {
            bail!(
                "片段範圍無效 [{start:.3}, {end:.3})，影片長度 {:.3}s",
                entry.info.duration_seconds
            );
        }

        let id = self.next_id();
        self.lock()?.clips.insert(
            id,
            ClipEntry {
                media: media.id,
                segment: RenderSegment {
                    source: entry.path.clone(),
                    start,
                    end,
                    has_audio: entry.info.has_audio,
                },
                width: entry.info.width,
                height: entry.info.height,
            },
        );

        Ok(ClipHandle {
            id,
            media: media.id,
            source: entry.path,
            start,
            end,
        })
    }

    fn read_frame(&self, clip: &ClipHandle, t: f64) -> Result<Frame> {
        let entry = self.clip_entry(clip)?;
        let at = entry.segment.start + t.max(0.0);
        if at >= entry.segment.end {
            bail!("時間點超出片段範圍: {t:.3}s");
        }

        let args = build_frame_args(&entry.segment.source, at);
        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| {
                format!(
                    "無法執行 ffmpeg 讀取畫面: {}",
                    entry.segment.source.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg 讀取畫面失敗: {}", stderr.trim());
        }
        if output.stdout.is_empty() {
            bail!(
                "無法解碼 {:.3}s 的畫面: {}",
                at,
                entry.segment.source.display()
            );
        }

        Ok(Frame {
            width: PROBE_FRAME_WIDTH,
            height: PROBE_FRAME_HEIGHT,
            data: output.stdout,
        })
    }

    fn concatenate(&self, clips: &[ClipHandle]) -> Result<SequenceHandle> {
        if clips.is_empty() {
            bail!("沒有可串接的片段");
        }
        let mut duration = 0.0;
        for clip in clips {
            duration += self.clip_entry(clip)?.segment.duration();
        }

        let id = self.next_id();
        let clip_ids: Vec<HandleId> = clips.iter().map(|c| c.id).collect();
        self.lock()?.sequences.insert(id, clip_ids.clone());

        Ok(SequenceHandle {
            id,
            clips: clip_ids,
            duration,
        })
    }

    fn write(
        &self,
        sequence: &SequenceHandle,
        output: &Path,
        options: &WriteOptions,
        on_progress: WriteProgress<'_>,
    ) -> Result<()> {
        let entries = {
            let state = self.lock()?;
            let clip_ids = state
                .sequences
                .get(&sequence.id)
                .ok_or_else(|| anyhow!("序列 handle #{} 已關閉", sequence.id))?;
            clip_ids
                .iter()
                .map(|id| {
                    state
                        .clips
                        .get(id)
                        .filter(|c| state.media.contains_key(&c.media))
                        .cloned()
                        .ok_or_else(|| anyhow!("序列中的片段 #{id} 已失效"))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let first = entries
            .first()
            .ok_or_else(|| anyhow!("序列中沒有片段"))?;
        let (width, height) = (even(first.width), even(first.height));
        let segments: Vec<RenderSegment> = entries.iter().map(|e| e.segment.clone()).collect();

        let parent = output.parent().unwrap_or(Path::new("."));
        let temp_dir = parent.join(format!(".video_mixer_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir)
            .with_context(|| format!("無法建立暫存目錄: {}", temp_dir.display()))?;
        let temp_output = temp_dir.join("render.mp4");

        let result = render(
            &segments,
            &temp_output,
            options,
            (width, height),
            sequence.duration,
            on_progress,
        )
        .and_then(|()| {
            fs::rename(&temp_output, output).with_context(|| {
                format!(
                    "無法移動輸出檔案: {} -> {}",
                    temp_output.display(),
                    output.display()
                )
            })
        });

        if let Err(e) = fs::remove_dir_all(&temp_dir) {
            warn!("無法清理暫存目錄 {}: {e}", temp_dir.display());
        }

        result
    }

    fn close(&self, handle: Handle) {
        let Ok(mut state) = self.lock() else {
            return;
        };
        match handle {
            Handle::Media(media) => {
                state.media.remove(&media.id);
                // 來源關閉後，從它切出的片段一併失效
                state.clips.retain(|_, clip| clip.media != media.id);
            }
            Handle::Clip(clip) => {
                state.clips.remove(&clip.id);
            }
            Handle::Sequence(sequence) => {
                state.sequences.remove(&sequence.id);
            }
        }
    }
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

fn parse_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// 解碼單聲道 f32 PCM 到 stdout 的參數
#[must_use]
pub fn build_decode_args(path: &Path, sample_rate: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-f".to_string(),
        "f32le".to_string(),
        "-acodec".to_string(),
        "pcm_f32le".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        sample_rate.to_string(),
        "pipe:1".to_string(),
    ]
}

/// 擷取單一縮小 RGB 畫面到 stdout 的參數
#[must_use]
pub fn build_frame_args(path: &Path, at: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{at:.3}"),
        "-i".to_string(),
        path.to_string_lossy().to_string(),
        "-an".to_string(),
        "-sn".to_string(),
        "-dn".to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale={PROBE_FRAME_WIDTH}:{PROBE_FRAME_HEIGHT}"),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]
}

/// 建立 filter_complex：每段縮放補邊到相同解析度、統一幀率，無音軌者接上靜音
#[must_use]
pub fn build_filter_complex(segments: &[RenderSegment], size: (u32, u32), fps: u32) -> String {
    let (width, height) = size;
    let mut filters = Vec::with_capacity(segments.len() * 2 + 1);
    let mut concat_inputs = String::new();
    let mut silence_input = segments.len();

    for (i, segment) in segments.iter().enumerate() {
        filters.push(format!(
            "[{i}:v:0]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps},\
             format=yuv420p,setpts=PTS-STARTPTS[v{i}]"
        ));

        let audio_input = if segment.has_audio {
            format!("[{i}:a:0]")
        } else {
            let input = format!("[{silence_input}:a:0]");
            silence_input += 1;
            input
        };
        filters.push(format!(
            "{audio_input}aresample={SILENCE_SAMPLE_RATE},\
             aformat=sample_fmts=fltp:channel_layouts=stereo,asetpts=PTS-STARTPTS[a{i}]"
        ));

        concat_inputs.push_str(&format!("[v{i}][a{i}]"));
    }

    filters.push(format!(
        "{concat_inputs}concat=n={}:v=1:a=1[outv][outa]",
        segments.len()
    ));

    filters.join(";")
}

/// 建立完整的輸出編碼參數
#[must_use]
pub fn build_render_args(
    segments: &[RenderSegment],
    output: &Path,
    options: &WriteOptions,
    size: (u32, u32),
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
        "-y",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    for segment in segments {
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", segment.start),
            "-t".to_string(),
            format!("{:.3}", segment.duration()),
            "-i".to_string(),
            segment.source.to_string_lossy().to_string(),
        ]);
    }

    for segment in segments.iter().filter(|s| !s.has_audio) {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-t".to_string(),
            format!("{:.3}", segment.duration()),
            "-i".to_string(),
            format!("anullsrc=channel_layout=stereo:sample_rate={SILENCE_SAMPLE_RATE}"),
        ]);
    }

    args.extend([
        "-filter_complex".to_string(),
        build_filter_complex(segments, size, options.fps),
        "-map".to_string(),
        "[outv]".to_string(),
        "-map".to_string(),
        "[outa]".to_string(),
        "-c:v".to_string(),
        options.video_codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        options.fps.to_string(),
        "-c:a".to_string(),
        options.audio_codec.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    args
}

fn render(
    segments: &[RenderSegment],
    output: &Path,
    options: &WriteOptions,
    size: (u32, u32),
    total_seconds: f64,
    on_progress: WriteProgress<'_>,
) -> Result<()> {
    let args = build_render_args(segments, output, options, size);
    debug!("執行輸出編碼: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| "無法啟動 ffmpeg 輸出編碼")?;

    // stderr 由獨立執行緒收集，避免緩衝區寫滿卡住 ffmpeg
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        })
    });

    let mut cancelled = false;
    if let Some(stdout) = child.stdout.take() {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            let Some(fraction) = parse_progress_line(line.trim(), total_seconds) else {
                continue;
            };
            if on_progress(fraction).is_break() {
                cancelled = true;
                break;
            }
        }
    }

    if cancelled {
        warn!("輸出編碼已中止，終止 ffmpeg 程序");
        let _ = child.kill();
        let _ = child.wait();
        let _ = fs::remove_file(output);
        bail!("輸出編碼已中止");
    }

    let status = child.wait().with_context(|| "無法等待 ffmpeg 結束")?;
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        bail!("ffmpeg 輸出編碼失敗: {}", stderr.trim());
    }
    if !output.exists() {
        bail!("輸出檔案未建立: {}", output.display());
    }

    info!("輸出編碼完成: {}", output.display());
    Ok(())
}

/// 解析 `-progress` 輸出的一行，回傳完成比例
fn parse_progress_line(line: &str, total_seconds: f64) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        "out_time_ms" | "out_time_us" | "out_time" => {
            if total_seconds <= 0.0 {
                return None;
            }
            let ms = parse_out_time_ms(value)?;
            Some((ms as f64 / 1000.0 / total_seconds).clamp(0.0, 1.0))
        }
        _ => None,
    }
}

fn parse_out_time_ms(raw: &str) -> Option<u64> {
    if let Ok(us) = raw.parse::<u64>() {
        return Some(us / 1000); // ffmpeg out_time_ms 單位實際為微秒
    }

    // 後備：解析 out_time=HH:MM:SS.micro
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() == 3 {
        let h = parts[0].parse::<u64>().ok()?;
        let m = parts[1].parse::<u64>().ok()?;
        let (s, frac) = match parts[2].split_once('.') {
            Some((sec, micro)) => (sec.parse::<u64>().ok()?, micro.parse::<u64>().unwrap_or(0)),
            None => (parts[2].parse::<u64>().ok()?, 0),
        };
        return Some((h * 3600 + m * 60 + s) * 1000 + frac / 1000);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(source: &str, start: f64, end: f64, has_audio: bool) -> RenderSegment {
        RenderSegment {
            source: PathBuf::from(source),
            start,
            end,
            has_audio,
        }
    }

    #[test]
    fn test_parse_out_time_ms() {
        assert_eq!(parse_out_time_ms("1500000"), Some(1500));
        assert_eq!(parse_out_time_ms("00:01:02.500000"), Some(62_500));
        assert_eq!(parse_out_time_ms("N/A"), None);
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("progress=end", 10.0), Some(1.0));
        assert_eq!(parse_progress_line("progress=continue", 10.0), None);
        let fraction = parse_progress_line("out_time_ms=5000000", 10.0).unwrap();
        assert!((fraction - 0.5).abs() < 1e-9);
        let fraction = parse_progress_line("out_time_ms=50000000", 10.0).unwrap();
        assert!((fraction - 1.0).abs() < 1e-9);
        assert_eq!(parse_progress_line("speed=1.2x", 10.0), None);
        assert_eq!(parse_progress_line("out_time_ms=100", 0.0), None);
    }

    #[test]
    fn test_parse_f32le() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5_f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0_f32).to_le_bytes());
        bytes.push(0); // 不完整的尾端
        assert_eq!(parse_f32le(&bytes), vec![0.5, -1.0]);
    }

    #[test]
    fn test_build_decode_args() {
        let args = build_decode_args(Path::new("/tmp/video.mp4"), 22_050);
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/tmp/video.mp4");
        let ar = args.iter().position(|a| a == "-ar").unwrap();
        assert_eq!(args[ar + 1], "22050");
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_build_frame_args_seeks_before_input() {
        let args = build_frame_args(Path::new("a.mp4"), 3.25);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "3.250");
    }

    #[test]
    fn test_build_filter_complex_silence_for_missing_audio() {
        let segments = vec![
            segment("a.mp4", 0.0, 3.0, true),
            segment("b.mp4", 3.0, 6.0, false),
            segment("c.mp4", 1.0, 2.0, false),
        ];
        let filter = build_filter_complex(&segments, (1280, 720), 24);

        assert!(filter.contains("[0:a:0]"));
        assert!(filter.contains("[3:a:0]"));
        assert!(filter.contains("[4:a:0]"));
        assert!(!filter.contains("[1:a:0]"));
        assert!(filter.contains("fps=24"));
        assert!(filter.ends_with("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn test_build_render_args() {
        let segments = vec![
            segment("a.mp4", 0.0, 3.0, true),
            segment("b.mp4", 3.0, 5.5, false),
        ];
        let options = WriteOptions::default();
        let args = build_render_args(&segments, Path::new("/out/x.mp4"), &options, (640, 360));

        assert_eq!(args.iter().filter(|a| a.as_str() == "-i").count(), 3);
        assert!(args.contains(&"anullsrc=channel_layout=stereo:sample_rate=44100".to_string()));
        assert!(args.contains(&"2.500".to_string()));
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[cv + 1], "libx264");
        let ca = args.iter().position(|a| a == "-c:a").unwrap();
        assert_eq!(args[ca + 1], "aac");
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "24");
        assert_eq!(args.last().unwrap(), "/out/x.mp4");
    }

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even(1281), 1280);
        assert_eq!(even(720), 720);
        assert_eq!(even(1), 2);
    }

    #[test]
    fn test_closed_handles_are_rejected() {
        let codec = FfmpegCodec::new();
        let media = MediaHandle {
            id: 99,
            path: PathBuf::from("/missing.mp4"),
        };
        assert!(codec.duration(&media).is_err());
        assert!(codec.subclip(&media, 0.0, 1.0).is_err());
        assert!(codec.open(Path::new("/definitely/missing.mp4")).is_err());
    }
}

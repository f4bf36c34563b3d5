//! 測試用的記憶體內編解碼器與音訊分析器
//!
//! 追蹤每個 handle 的有效範圍，讓測試可以檢查資源是否都有釋放。

#![allow(dead_code)]

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use video_mixer::tools::{
    AudioAnalyzer, ClipHandle, Frame, Handle, HandleId, MediaCodec, MediaHandle, SequenceHandle,
    WriteOptions, WriteProgress,
};

#[derive(Debug, Clone)]
pub struct FakeVideo {
    pub duration: f64,
    pub has_audio: bool,
    /// 剩餘可開啟次數，用完後視同檔案被刪除
    pub opens_left: Option<usize>,
    /// 起點落在這些範圍內的片段讀不到畫面
    pub unreadable: Vec<(f64, f64)>,
}

impl FakeVideo {
    pub fn silent(duration: f64) -> Self {
        Self {
            duration,
            has_audio: false,
            opens_left: None,
            unreadable: Vec::new(),
        }
    }

    pub fn with_audio(duration: f64) -> Self {
        Self {
            has_audio: true,
            ..Self::silent(duration)
        }
    }

    pub fn vanish_after(mut self, opens: usize) -> Self {
        self.opens_left = Some(opens);
        self
    }

    pub fn unreadable_between(mut self, start: f64, end: f64) -> Self {
        self.unreadable.push((start, end));
        self
    }
}

#[derive(Debug, Clone)]
enum Open {
    Media(PathBuf),
    Clip { media: HandleId },
    Sequence { clips: Vec<HandleId> },
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: HandleId,
    open: HashMap<HandleId, Open>,
    max_open_media: usize,
    total_opened: usize,
}

impl FakeState {
    fn open_media(&self) -> usize {
        self.open
            .values()
            .filter(|h| matches!(h, Open::Media(_)))
            .count()
    }
}

/// 一次輸出的紀錄
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenVideo {
    pub output: PathBuf,
    pub clips: Vec<(PathBuf, f64, f64)>,
    pub options: WriteOptions,
}

#[derive(Default)]
pub struct FakeCodec {
    library: Mutex<HashMap<PathBuf, FakeVideo>>,
    state: Mutex<FakeState>,
    clip_ranges: Mutex<HashMap<HandleId, (PathBuf, f64, f64)>>,
    writes: Mutex<Vec<WrittenVideo>>,
    pub fail_write: AtomicBool,
    /// 開始輸出時設定此旗標，模擬輸出途中按下 Ctrl-C
    pub cancel_on_write: Mutex<Option<Arc<AtomicBool>>>,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: impl Into<PathBuf>, video: FakeVideo) {
        self.library.lock().unwrap().insert(path.into(), video);
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn max_open_media(&self) -> usize {
        self.state.lock().unwrap().max_open_media
    }

    pub fn reset_max_open_media(&self) {
        let mut state = self.state.lock().unwrap();
        state.max_open_media = state.open_media();
    }

    pub fn total_opened(&self) -> usize {
        self.state.lock().unwrap().total_opened
    }

    pub fn writes(&self) -> Vec<WrittenVideo> {
        self.writes.lock().unwrap().clone()
    }

    fn register(&self, handle: Open) -> HandleId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.open.insert(id, handle);
        let open_media = state.open_media();
        state.max_open_media = state.max_open_media.max(open_media);
        id
    }

    fn media_path(&self, id: HandleId) -> Result<PathBuf> {
        match self.state.lock().unwrap().open.get(&id) {
            Some(Open::Media(path)) => Ok(path.clone()),
            _ => bail!("media handle #{id} 已失效"),
        }
    }

    fn ensure_clip_valid(&self, clip: &ClipHandle) -> Result<()> {
        let state = self.state.lock().unwrap();
        match state.open.get(&clip.id) {
            Some(Open::Clip { media }) if state.open.contains_key(media) => Ok(()),
            _ => bail!("clip handle #{} 已失效", clip.id),
        }
    }

    fn video(&self, path: &Path) -> Result<FakeVideo> {
        match self.library.lock().unwrap().get(path) {
            Some(video) => Ok(video.clone()),
            None => bail!("找不到檔案: {}", path.display()),
        }
    }
}

impl MediaCodec for FakeCodec {
    fn open(&self, path: &Path) -> Result<MediaHandle> {
        {
            let mut library = self.library.lock().unwrap();
            let Some(video) = library.get_mut(path) else {
                bail!("無法開啟: {}", path.display());
            };
            let vanished = video.opens_left == Some(0);
            if let Some(left) = video.opens_left.as_mut() {
                *left = left.saturating_sub(1);
            }
            if vanished {
                library.remove(path);
                bail!("檔案已被刪除: {}", path.display());
            }
        }

        let id = self.register(Open::Media(path.to_path_buf()));
        self.state.lock().unwrap().total_opened += 1;
        Ok(MediaHandle {
            id,
            path: path.to_path_buf(),
        })
    }

    fn duration(&self, media: &MediaHandle) -> Result<f64> {
        let path = self.media_path(media.id)?;
        Ok(self.video(&path)?.duration)
    }

    fn has_audio_track(&self, media: &MediaHandle) -> Result<bool> {
        let path = self.media_path(media.id)?;
        Ok(self.video(&path)?.has_audio)
    }

    fn decode_mono(&self, path: &Path, _sample_rate: u32) -> Result<Vec<f32>> {
        let video = self.video(path)?;
        if !video.has_audio {
            bail!("沒有音軌");
        }
        Ok(vec![0.1; 64])
    }

    fn subclip(&self, media: &MediaHandle, start: f64, end: f64) -> Result<ClipHandle> {
        let path = self.media_path(media.id)?;
        let video = self.video(&path)?;
        if start < 0.0 || end > video.duration + 1e-9 || end <= start {
            bail!("範圍無效 [{start}, {end})");
        }

        let id = self.register(Open::Clip { media: media.id });
        self.clip_ranges
            .lock()
            .unwrap()
            .insert(id, (path.clone(), start, end));
        Ok(ClipHandle {
            id,
            media: media.id,
            source: path,
            start,
            end,
        })
    }

    fn read_frame(&self, clip: &ClipHandle, _t: f64) -> Result<Frame> {
        self.ensure_clip_valid(clip)?;
        let video = self.video(&clip.source)?;
        if video
            .unreadable
            .iter()
            .any(|(start, end)| clip.start >= *start && clip.start < *end)
        {
            bail!("讀不到畫面");
        }
        Ok(Frame {
            width: 2,
            height: 2,
            data: vec![0; 12],
        })
    }

    fn concatenate(&self, clips: &[ClipHandle]) -> Result<SequenceHandle> {
        for clip in clips {
            self.ensure_clip_valid(clip)?;
        }
        let ids: Vec<HandleId> = clips.iter().map(|c| c.id).collect();
        let id = self.register(Open::Sequence { clips: ids.clone() });
        Ok(SequenceHandle {
            id,
            clips: ids,
            duration: clips.iter().map(ClipHandle::duration).sum(),
        })
    }

    fn write(
        &self,
        sequence: &SequenceHandle,
        output: &Path,
        options: &WriteOptions,
        on_progress: WriteProgress<'_>,
    ) -> Result<()> {
        let clip_ids = match self.state.lock().unwrap().open.get(&sequence.id) {
            Some(Open::Sequence { clips }) => clips.clone(),
            _ => bail!("sequence handle #{} 已失效", sequence.id),
        };

        if let Some(flag) = self.cancel_on_write.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }

        for step in 1..=4 {
            if on_progress(f64::from(step) / 4.0).is_break() {
                bail!("輸出已中止");
            }
        }

        if self.fail_write.load(Ordering::SeqCst) {
            bail!("編碼器錯誤");
        }

        let ranges = self.clip_ranges.lock().unwrap();
        let clips: Vec<(PathBuf, f64, f64)> = clip_ids
            .iter()
            .filter_map(|id| ranges.get(id).cloned())
            .collect();

        fs::write(output, format!("{} clips", clips.len()))?;
        self.writes.lock().unwrap().push(WrittenVideo {
            output: output.to_path_buf(),
            clips,
            options: options.clone(),
        });
        Ok(())
    }

    fn close(&self, handle: Handle) {
        let mut state = self.state.lock().unwrap();
        let id = handle.id();
        if let Some(Open::Media(_)) = state.open.remove(&id) {
            // 來源關閉後，由它切出的片段一併失效
            let children: HashSet<HandleId> = state
                .open
                .iter()
                .filter(|(_, h)| matches!(h, Open::Clip { media } if *media == id))
                .map(|(child, _)| *child)
                .collect();
            state.open.retain(|child, _| !children.contains(child));
        }
    }
}

/// 固定回傳同一組切點
pub struct FixedAnalyzer(pub Vec<f64>);

impl AudioAnalyzer for FixedAnalyzer {
    fn detect_boundaries(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<f64>> {
        Ok(self.0.clone())
    }
}

/// 每次分析都失敗
pub struct CrashingAnalyzer;

impl AudioAnalyzer for CrashingAnalyzer {
    fn detect_boundaries(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<f64>> {
        bail!("analyzer crashed")
    }
}

/// 在暫存目錄下產生不存在於磁碟的輸入路徑
pub fn input_paths(dir: &Path, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| dir.join(format!("clip_{i:02}.mp4")))
        .collect()
}

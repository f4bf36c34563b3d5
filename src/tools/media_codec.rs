//! 媒體編解碼能力的抽象
//!
//! 核心流程只透過 [`MediaCodec`] 操作影片。所有 handle 都有明確的有效範圍：
//! 從 `open`/`subclip`/`concatenate` 取得，到 `close` 為止；
//! 關閉來源後，由它切出的片段也一併失效。

use crate::config::MixerSettings;
use anyhow::Result;
use log::debug;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

pub type HandleId = u64;

/// 已開啟的來源影片
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHandle {
    pub id: HandleId,
    pub path: PathBuf,
}

/// 來源影片中 `[start, end)` 的片段，只在其來源 handle 有效期間可用
#[derive(Debug, Clone, PartialEq)]
pub struct ClipHandle {
    pub id: HandleId,
    pub media: HandleId,
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
}

impl ClipHandle {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// 多個片段依序串接而成的序列
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceHandle {
    pub id: HandleId,
    pub clips: Vec<HandleId>,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Handle {
    Media(MediaHandle),
    Clip(ClipHandle),
    Sequence(SequenceHandle),
}

impl Handle {
    #[must_use]
    pub const fn id(&self) -> HandleId {
        match self {
            Self::Media(h) => h.id,
            Self::Clip(h) => h.id,
            Self::Sequence(h) => h.id,
        }
    }
}

impl From<MediaHandle> for Handle {
    fn from(handle: MediaHandle) -> Self {
        Self::Media(handle)
    }
}

impl From<ClipHandle> for Handle {
    fn from(handle: ClipHandle) -> Self {
        Self::Clip(handle)
    }
}

impl From<SequenceHandle> for Handle {
    fn from(handle: SequenceHandle) -> Self {
        Self::Sequence(handle)
    }
}

/// 解碼出的單一畫面
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 輸出編碼參數
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
}

impl WriteOptions {
    #[must_use]
    pub fn from_settings(settings: &MixerSettings) -> Self {
        Self {
            fps: settings.output_fps,
            video_codec: settings.video_codec.clone(),
            audio_codec: settings.audio_codec.clone(),
        }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::from_settings(&MixerSettings::default())
    }
}

/// 編碼進度回呼：參數為 [0, 1] 的完成比例，回傳 `Break` 代表要求中止
pub type WriteProgress<'a> = &'a mut dyn FnMut(f64) -> ControlFlow<()>;

pub trait MediaCodec: Send + Sync {
    fn open(&self, path: &Path) -> Result<MediaHandle>;

    fn duration(&self, media: &MediaHandle) -> Result<f64>;

    fn has_audio_track(&self, media: &MediaHandle) -> Result<bool>;

    /// 解碼整條音軌為單聲道 f32 取樣
    fn decode_mono(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>>;

    fn subclip(&self, media: &MediaHandle, start: f64, end: f64) -> Result<ClipHandle>;

    /// 讀取片段內相對時間 `t` 的畫面
    fn read_frame(&self, clip: &ClipHandle, t: f64) -> Result<Frame>;

    fn concatenate(&self, clips: &[ClipHandle]) -> Result<SequenceHandle>;

    fn write(
        &self,
        sequence: &SequenceHandle,
        output: &Path,
        options: &WriteOptions,
        on_progress: WriteProgress<'_>,
    ) -> Result<()>;

    fn close(&self, handle: Handle);
}

/// 在作用域結束時依反向順序關閉所有取得的 handle
///
/// 不論是正常結束、`?` 提早返回或 panic 展開，資源都會被釋放。
pub struct HandleScope<'a> {
    codec: &'a dyn MediaCodec,
    handles: Vec<Handle>,
}

impl<'a> HandleScope<'a> {
    #[must_use]
    pub fn new(codec: &'a dyn MediaCodec) -> Self {
        Self {
            codec,
            handles: Vec::new(),
        }
    }

    #[must_use]
    pub fn codec(&self) -> &'a dyn MediaCodec {
        self.codec
    }

    pub fn open(&mut self, path: &Path) -> Result<MediaHandle> {
        let media = self.codec.open(path)?;
        self.handles.push(media.clone().into());
        Ok(media)
    }

    pub fn subclip(&mut self, media: &MediaHandle, start: f64, end: f64) -> Result<ClipHandle> {
        let clip = self.codec.subclip(media, start, end)?;
        self.handles.push(clip.clone().into());
        Ok(clip)
    }

    pub fn concatenate(&mut self, clips: &[ClipHandle]) -> Result<SequenceHandle> {
        let sequence = self.codec.concatenate(clips)?;
        self.handles.push(sequence.clone().into());
        Ok(sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 立即關閉所有 handle
    pub fn release(&mut self) {
        while let Some(handle) = self.handles.pop() {
            debug!("關閉 handle #{}", handle.id());
            self.codec.close(handle);
        }
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

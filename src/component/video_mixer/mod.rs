//! 影片混剪元件
//!
//! 從多支影片依音訊節奏切出短片段，隨機挑選後串接成一支 30 到 60 秒的影片。
//!
//! 流程：
//! 1. 找切點（音訊節奏，沒有音訊時固定間隔）
//! 2. 切出長度合格且畫面可讀的候選片段
//! 3. 隨機抽目標長度並貪婪挑選片段，再從來源重新驗證
//! 4. 串接並編碼輸出

mod assembler;
mod batch_extractor;
mod boundary_extractor;
mod clip_cutter;
mod error;
mod events;
mod main;
mod pipeline;
mod selector;

pub use assembler::{Assembler, output_file_name, output_path_for};
pub use batch_extractor::{BatchExtractor, CandidatePool, ExtractionReport, FileOutcome};
pub use boundary_extractor::{AudioBuffer, BoundaryExtractor, finalize_boundaries, fixed_cadence};
pub use clip_cutter::{CandidateClip, ClipCutter, ClipOutcome, CutReport, is_valid_clip_duration};
pub use error::MixError;
pub use events::{PipelineEvent, ProgressRange, ProgressReporter, RunResult};
pub use main::VideoMixer;
pub use pipeline::{PipelineState, RunHandle, RunReport, VideoMixerPipeline};
pub use selector::{Selection, Selector, draw_target_duration, greedy_fill};

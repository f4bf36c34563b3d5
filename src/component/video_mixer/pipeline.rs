use super::assembler::{Assembler, output_path_for};
use super::batch_extractor::{BatchExtractor, ExtractionReport};
use super::error::MixError;
use super::events::{PipelineEvent, ProgressRange, ProgressReporter, RunResult};
use super::selector::{Selector, draw_target_duration};
use crate::config::MixerSettings;
use crate::tools::{AudioAnalyzer, MediaCodec};
use anyhow::{Context, Result, bail};
use chrono::Local;
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_i18n::t;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

const EXTRACT_RANGE: ProgressRange = ProgressRange::new(0.0, 50.0);
const ASSEMBLE_RANGE: ProgressRange = ProgressRange::new(50.0, 100.0);

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Selecting,
    Assembling,
    Done(PathBuf),
    Failed(MixError),
}

impl PipelineState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Extracting => write!(f, "Extracting"),
            Self::Selecting => write!(f, "Selecting"),
            Self::Assembling => write!(f, "Assembling"),
            Self::Done(_) => write!(f, "Done"),
            Self::Failed(e) => write!(f, "Failed({})", e.kind()),
        }
    }
}

/// 單次混剪的摘要
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: PipelineState,
    pub extraction: ExtractionReport,
    pub pool_size: usize,
    pub target_seconds: Option<f64>,
    pub selected_clips: usize,
    pub selected_seconds: f64,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            extraction: ExtractionReport::default(),
            pool_size: 0,
            target_seconds: None,
            selected_clips: 0,
            selected_seconds: 0.0,
        }
    }

    /// 轉換成最終結果；流程尚未結束時視為中止並記錄錯誤
    #[must_use]
    pub fn result(&self) -> RunResult {
        match &self.state {
            PipelineState::Done(path) => RunResult::Success(path.clone()),
            PipelineState::Failed(e) => RunResult::Failure(e.clone()),
            state @ (PipelineState::Idle
            | PipelineState::Extracting
            | PipelineState::Selecting
            | PipelineState::Assembling) => {
                error!("流程停在 {state} 時就要求結果，視為中止");
                RunResult::Failure(MixError::Cancelled)
            }
        }
    }
}

/// 背景執行中的混剪
pub struct RunHandle {
    pub events: Receiver<PipelineEvent>,
    cancel: Arc<AtomicBool>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    /// 要求中止；工作執行緒會在下一個檢查點結束並送出 `Failed(Cancelled)`
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn wait(self) -> Result<RunReport> {
        self.join
            .join()
            .map_err(|_| anyhow::anyhow!("混剪工作執行緒異常結束"))
    }
}

/// 依序執行擷取、選片、輸出
pub struct VideoMixerPipeline {
    codec: Arc<dyn MediaCodec>,
    analyzer: Arc<dyn AudioAnalyzer>,
    settings: MixerSettings,
}

impl VideoMixerPipeline {
    pub fn new(
        codec: Arc<dyn MediaCodec>,
        analyzer: Arc<dyn AudioAnalyzer>,
        settings: MixerSettings,
    ) -> Result<Self> {
        settings.validate().context("混剪參數無效")?;
        Ok(Self {
            codec,
            analyzer,
            settings,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &MixerSettings {
        &self.settings
    }

    /// 在目前執行緒上執行一次完整混剪
    ///
    /// 不論成功或失敗，`reporter` 都會收到恰好一次 `Finished`。
    pub fn run<R: Rng>(
        &self,
        files: &[PathBuf],
        rng: &mut R,
        reporter: &ProgressReporter,
        cancel: &AtomicBool,
    ) -> RunReport {
        let mut report = RunReport::new();

        let outcome = self.execute(files, rng, reporter, cancel, &mut report);
        report.state = match outcome {
            Ok(path) => PipelineState::Done(path),
            Err(e) => PipelineState::Failed(e),
        };

        match &report.state {
            PipelineState::Done(path) => {
                info!("混剪完成: {}", path.display());
                reporter.progress(100.0);
                reporter.status(t!("mixer.status.done", path = path.display()));
            }
            PipelineState::Failed(e) => {
                error!("混剪失敗 [{}]: {e}", e.kind());
                reporter.status(t!("mixer.status.failed", reason = e));
            }
            PipelineState::Idle
            | PipelineState::Extracting
            | PipelineState::Selecting
            | PipelineState::Assembling => {}
        }
        reporter.finish(report.result());
        report
    }

    fn execute<R: Rng>(
        &self,
        files: &[PathBuf],
        rng: &mut R,
        reporter: &ProgressReporter,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<PathBuf, MixError> {
        let Some(first_input) = files.first() else {
            return Err(MixError::NoInput);
        };

        let codec = self.codec.as_ref();

        enter(report, PipelineState::Extracting);
        reporter.progress(0.0);
        let extractor = BatchExtractor::new(codec, self.analyzer.as_ref(), &self.settings);
        let pool = extractor.extract_all(files, reporter, EXTRACT_RANGE, cancel);
        report.extraction = pool.report.clone();
        report.pool_size = pool.clips.len();
        if cancel.load(Ordering::SeqCst) {
            return Err(MixError::Cancelled);
        }
        if pool.clips.is_empty() {
            return Err(MixError::NoClips);
        }
        reporter.progress(EXTRACT_RANGE.end);

        enter(report, PipelineState::Selecting);
        let target = draw_target_duration(rng, &self.settings);
        report.target_seconds = Some(target);
        reporter.status(t!(
            "mixer.status.selecting",
            count = pool.clips.len(),
            target = format!("{target:.1}")
        ));
        let selector = Selector::new(codec);
        let selection = selector.select(pool.clips, target, rng)?;
        reporter.status(t!("mixer.status.revalidating", count = selection.clips.len()));
        let selection = selector.revalidate(selection, cancel)?;
        report.selected_clips = selection.clips.len();
        report.selected_seconds = selection.total_duration();

        if cancel.load(Ordering::SeqCst) {
            return Err(MixError::Cancelled);
        }

        enter(report, PipelineState::Assembling);
        let output = output_path_for(first_input, Local::now());
        Assembler::new(codec, &self.settings).assemble(
            &selection.clips,
            &output,
            reporter,
            ASSEMBLE_RANGE,
            cancel,
        )
    }

    /// 在專用執行緒上執行混剪，事件透過 [`RunHandle::events`] 取得
    ///
    /// 空的輸入清單會直接被拒絕，不會啟動執行緒。
    pub fn spawn(self, files: Vec<PathBuf>, cancel: Arc<AtomicBool>) -> Result<RunHandle> {
        if files.is_empty() {
            bail!(MixError::NoInput);
        }

        let (sender, events) = mpsc::channel();
        let worker_cancel = Arc::clone(&cancel);
        let seed = self.settings.seed;

        let join = thread::Builder::new()
            .name("video-mixer-worker".to_string())
            .spawn(move || {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                let reporter = ProgressReporter::new(sender);
                self.run(&files, &mut rng, &reporter, &worker_cancel)
            })
            .context("無法建立混剪工作執行緒")?;

        Ok(RunHandle {
            events,
            cancel,
            join,
        })
    }
}

fn enter(report: &mut RunReport, state: PipelineState) {
    info!("{} -> {state}", report.state);
    report.state = state;
}

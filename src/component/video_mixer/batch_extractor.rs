use super::boundary_extractor::BoundaryExtractor;
use super::clip_cutter::{CandidateClip, ClipCutter};
use super::error::MixError;
use super::events::{ProgressRange, ProgressReporter};
use crate::config::MixerSettings;
use crate::tools::{AudioAnalyzer, HandleScope, MediaCodec};
use log::{info, warn};
use rayon::prelude::*;
use rust_i18n::t;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 單一檔案的處理結果
#[derive(Debug)]
pub enum FileOutcome {
    Extracted {
        clips: Vec<CandidateClip>,
        rejected: usize,
        failed: usize,
    },
    Skipped(MixError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files_total: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub clips_accepted: usize,
    pub clips_rejected: usize,
    pub clips_failed: usize,
}

/// 單次混剪的所有候選片段
#[derive(Debug, Default)]
pub struct CandidatePool {
    pub clips: Vec<CandidateClip>,
    pub report: ExtractionReport,
}

impl CandidatePool {
    fn merge(&mut self, path: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Extracted {
                clips,
                rejected,
                failed,
            } => {
                self.report.files_processed += 1;
                self.report.clips_accepted += clips.len();
                self.report.clips_rejected += rejected;
                self.report.clips_failed += failed;
                self.clips.extend(clips);
            }
            FileOutcome::Skipped(error) => {
                self.report.files_skipped += 1;
                if error != MixError::Cancelled {
                    warn!("略過檔案 {}: [{}] {error}", path.display(), error.kind());
                }
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().to_string(),
    )
}

/// 逐檔找切點、切片段並彙整成候選池
pub struct BatchExtractor<'a> {
    codec: &'a dyn MediaCodec,
    analyzer: &'a dyn AudioAnalyzer,
    settings: &'a MixerSettings,
}

impl<'a> BatchExtractor<'a> {
    #[must_use]
    pub fn new(
        codec: &'a dyn MediaCodec,
        analyzer: &'a dyn AudioAnalyzer,
        settings: &'a MixerSettings,
    ) -> Self {
        Self {
            codec,
            analyzer,
            settings,
        }
    }

    /// 處理單一檔案；解碼資源在函式結束時一定會釋放
    pub fn extract_file(
        &self,
        path: &Path,
        on_progress: &mut dyn FnMut(f64),
        cancel: &AtomicBool,
    ) -> FileOutcome {
        let mut scope = HandleScope::new(self.codec);

        let media = match scope.open(path) {
            Ok(media) => media,
            Err(e) => return FileOutcome::Skipped(MixError::analysis(path, &e)),
        };

        let duration = match self.codec.duration(&media) {
            Ok(duration) => duration,
            Err(e) => return FileOutcome::Skipped(MixError::analysis(path, &e)),
        };

        let boundaries = match BoundaryExtractor::new(self.analyzer, self.settings).extract(
            self.codec,
            &media,
            duration,
        ) {
            Ok(boundaries) => boundaries,
            Err(error) => return FileOutcome::Skipped(error),
        };

        let report = ClipCutter::new(self.codec, self.settings).cut(
            &media,
            &boundaries,
            on_progress,
            cancel,
        );

        // 切完立即關閉，同一時間只保留一個開啟中的檔案
        scope.release();

        if report.cancelled {
            return FileOutcome::Skipped(MixError::Cancelled);
        }

        info!(
            "{}: 長度 {duration:.2}s, {} 個切點, {} 個候選片段",
            file_label(path),
            boundaries.len(),
            report.clips.len()
        );

        FileOutcome::Extracted {
            clips: report.clips,
            rejected: report.rejected,
            failed: report.failed,
        }
    }

    /// 處理所有輸入檔案，進度對應到 `range`
    ///
    /// 一律回傳候選池與統計；池是否為空、是否已中止由呼叫端判斷。
    pub fn extract_all(
        &self,
        files: &[PathBuf],
        reporter: &ProgressReporter,
        range: ProgressRange,
        cancel: &AtomicBool,
    ) -> CandidatePool {
        let workers = self.settings.parallel_files.max(1);

        let pool = if workers > 1 && files.len() > 1 {
            self.extract_parallel(files, workers, reporter, range, cancel)
        } else {
            self.extract_sequential(files, reporter, range, cancel)
        };

        info!(
            "擷取完成: {}/{} 個檔案成功, 共 {} 個候選片段",
            pool.report.files_processed,
            pool.report.files_total,
            pool.clips.len()
        );

        pool
    }

    fn extract_sequential(
        &self,
        files: &[PathBuf],
        reporter: &ProgressReporter,
        range: ProgressRange,
        cancel: &AtomicBool,
    ) -> CandidatePool {
        let mut pool = CandidatePool::default();
        pool.report.files_total = files.len();

        for (index, path) in files.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!("收到中斷訊號，停止擷取");
                break;
            }

            reporter.status(t!(
                "mixer.status.extracting",
                current = index + 1,
                total = files.len(),
                name = file_label(path)
            ));

            let file_range = range.split(index, files.len());
            let mut on_progress = |fraction| reporter.progress(file_range.at(fraction));
            let outcome = self.extract_file(path, &mut on_progress, cancel);
            pool.merge(path, outcome);
            reporter.progress(file_range.end);
        }

        pool
    }

    /// 平行處理多個檔案；進度依完成順序回報，候選池仍依輸入順序合併
    fn extract_parallel(
        &self,
        files: &[PathBuf],
        workers: usize,
        reporter: &ProgressReporter,
        range: ProgressRange,
        cancel: &AtomicBool,
    ) -> CandidatePool {
        let thread_pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
        {
            Ok(thread_pool) => thread_pool,
            Err(e) => {
                warn!("無法建立平行處理執行緒池，改為逐一處理: {e}");
                return self.extract_sequential(files, reporter, range, cancel);
            }
        };

        reporter.status(t!(
            "mixer.status.extracting_parallel",
            total = files.len(),
            workers = workers
        ));

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<FileOutcome> = thread_pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let outcome = if cancel.load(Ordering::SeqCst) {
                        FileOutcome::Skipped(MixError::Cancelled)
                    } else {
                        self.extract_file(path, &mut |_| {}, cancel)
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    reporter.progress(range.at(done as f64 / files.len() as f64));
                    outcome
                })
                .collect()
        });

        let mut pool = CandidatePool::default();
        pool.report.files_total = files.len();
        for (path, outcome) in files.iter().zip(outcomes) {
            pool.merge(path, outcome);
        }
        pool
    }
}

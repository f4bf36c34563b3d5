use super::events::PipelineEvent;
use super::pipeline::{PipelineState, RunReport, VideoMixerPipeline};
use crate::config::Config;
use crate::config::save::{add_recent_path, save_settings};
use crate::tools::{
    FfmpegCodec, OnsetAnalyzer, VideoFileInfo, scan_video_files, validate_directory_exists,
    validate_output_directory,
};
use anyhow::Result;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rust_i18n::t;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

/// 影片混剪元件
///
/// 介面只負責挑選檔案與顯示進度，混剪本身在背景執行緒上進行。
pub struct VideoMixer {
    config: Config,
    shutdown_signal: Arc<AtomicBool>,
}

impl VideoMixer {
    pub const fn new(config: Config, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    #[must_use]
    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn run(&mut self) -> Result<()> {
        println!("{}", style(t!("mixer.title")).cyan().bold());

        FfmpegCodec::check_available()?;

        let Some(input_path) = self.prompt_input_path()? else {
            return Ok(());
        };
        let directory = PathBuf::from(&input_path);
        validate_directory_exists(&directory)?;

        add_recent_path(&mut self.config.settings, &input_path);
        if let Err(e) = save_settings(&self.config.settings) {
            warn!("無法儲存路徑歷史: {e}");
        }

        println!("{}", style(t!("mixer.scanning")).dim());
        let video_files = scan_video_files(&directory)?;
        if video_files.is_empty() {
            println!("{}", style(t!("mixer.no_videos")).yellow());
            return Ok(());
        }

        let Some(files) = self.prompt_files(&video_files)? else {
            return Ok(());
        };
        if files.is_empty() {
            println!("{}", style(t!("mixer.no_selection")).yellow());
            return Ok(());
        }
        validate_output_directory(&files[0])?;

        self.shutdown_signal.store(false, Ordering::SeqCst);
        let report = self.mix(files)?;
        self.shutdown_signal.store(false, Ordering::SeqCst);

        print_summary(&report);
        Ok(())
    }

    fn mix(&self, files: Vec<PathBuf>) -> Result<RunReport> {
        let pipeline = VideoMixerPipeline::new(
            Arc::new(FfmpegCodec::new()),
            Arc::new(OnsetAnalyzer::default()),
            self.config.settings.mixer.clone(),
        )?;

        info!("開始混剪 {} 個檔案", files.len());
        println!("{}", style(t!("mixer.starting", count = files.len())).cyan());
        println!("{}", style(t!("mixer.cancel_hint")).dim());

        let handle = pipeline.spawn(files, Arc::clone(&self.shutdown_signal))?;
        render_events(&handle.events)?;
        handle.wait()
    }

    fn prompt_input_path(&self) -> Result<Option<String>> {
        let recent_paths = &self.config.settings.recent_paths;

        if recent_paths.is_empty() {
            let path: String = Input::new()
                .with_prompt(t!("mixer.prompt_path"))
                .interact_text()?;
            return Ok(Some(path.trim().to_string()));
        }

        let mut options: Vec<String> = recent_paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let indicator = if Path::new(p).exists() { "✓" } else { "✗" };
                format!("{} [{}] {}", i + 1, indicator, p)
            })
            .collect();
        options.push(t!("mixer.new_path").to_string());

        println!("{}", style(t!("common.esc_hint")).dim());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("mixer.select_path"))
            .items(&options)
            .default(0)
            .interact_opt()?;

        match selection {
            None => Ok(None),
            Some(idx) if idx < recent_paths.len() => Ok(Some(recent_paths[idx].clone())),
            Some(_) => {
                let path: String = Input::new()
                    .with_prompt(t!("mixer.prompt_path"))
                    .interact_text()?;
                Ok(Some(path.trim().to_string()))
            }
        }
    }

    /// 列出找到的影片，預設全選；按 ESC 回傳 `None`
    fn prompt_files(&self, videos: &[VideoFileInfo]) -> Result<Option<Vec<PathBuf>>> {
        println!("{}", style(t!("mixer.found", count = videos.len())).green());

        let items: Vec<String> = videos
            .iter()
            .map(|video| {
                let size_mb = video.size as f64 / 1024.0 / 1024.0;
                format!("{} ({size_mb:.2} MB)", video.path.display())
            })
            .collect();
        let defaults = vec![true; items.len()];

        let selection = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("mixer.select_files"))
            .items(&items)
            .defaults(&defaults)
            .interact_opt()?;

        Ok(selection.map(|indices| {
            indices
                .into_iter()
                .map(|index| videos[index].path.clone())
                .collect()
        }))
    }
}

/// 讀取事件直到收到 `Finished`
fn render_events(events: &Receiver<PipelineEvent>) -> Result<()> {
    let progress_bar = ProgressBar::new(100);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    for event in events {
        match event {
            PipelineEvent::Progress(percent) => progress_bar.set_position(u64::from(percent)),
            PipelineEvent::Status(message) => progress_bar.set_message(message),
            PipelineEvent::Finished(result) => {
                if result.is_success() {
                    progress_bar.finish();
                } else {
                    progress_bar.abandon();
                }
                return Ok(());
            }
        }
    }

    progress_bar.abandon();
    Ok(())
}

fn print_summary(report: &RunReport) {
    let extraction = &report.extraction;

    println!();
    println!("{}", style(t!("mixer.summary.title")).cyan().bold());
    println!(
        "  {}",
        t!(
            "mixer.summary.files",
            processed = extraction.files_processed,
            skipped = extraction.files_skipped,
            total = extraction.files_total
        )
    );
    println!(
        "  {}",
        t!(
            "mixer.summary.clips",
            pool = report.pool_size,
            rejected = extraction.clips_rejected,
            failed = extraction.clips_failed
        )
    );
    if let Some(target) = report.target_seconds {
        println!(
            "  {}",
            t!("mixer.summary.target", seconds = format!("{target:.1}"))
        );
        println!(
            "  {}",
            t!(
                "mixer.summary.selected",
                count = report.selected_clips,
                seconds = format!("{:.1}", report.selected_seconds)
            )
        );
    }

    match &report.state {
        PipelineState::Done(path) => {
            println!(
                "  {} {}",
                style(t!("mixer.summary.output")).green(),
                path.display()
            );
        }
        PipelineState::Failed(e) => {
            println!(
                "  {} [{}] {e}",
                style(t!("mixer.summary.failed")).red(),
                e.kind()
            );
        }
        _ => {}
    }

    info!(
        "混剪結束 - 狀態: {}, 候選片段: {}, 選用: {}",
        report.state, report.pool_size, report.selected_clips
    );
}

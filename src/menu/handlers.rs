use crate::component::VideoMixer;
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn run_video_mixer(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<()> {
    let mut mixer = VideoMixer::new(config.clone(), Arc::clone(shutdown_signal));

    if let Err(e) = mixer.run() {
        eprintln!("{} {e:#}", style(t!("common.error_prefix")).red().bold());
    }

    // 保留本次更新的路徑歷史
    *config = mixer.into_config();

    pause(term)?;
    Ok(())
}

use crate::config::save::save_settings;
use crate::config::types::{Config, Language, MAX_PARALLEL_FILES};
use crate::menu::handlers::run_video_mixer;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_mixer"),
        t!("main_menu.opt_settings"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_video_mixer(term, shutdown_signal, config)?;
            Ok(true)
        }
        Some(1) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(2) | None => Ok(false), // ESC pressed - exit
        _ => unreachable!(),
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let options = vec![
            t!("settings.opt_mixer"),
            t!("settings.opt_parallel"),
            t!("settings.opt_language"),
            t!("settings.back"),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => show_mixer_parameters(term, config)?,
            Some(1) => show_parallel_menu(term, config)?,
            Some(2) => show_language_menu(term, config)?,
            Some(3) | None => break, // ESC or back
            _ => unreachable!(),
        }
    }

    Ok(())
}

/// 顯示目前的混剪參數
fn show_mixer_parameters(term: &Term, config: &Config) -> Result<()> {
    term.clear_screen()?;

    let mixer = &config.settings.mixer;
    println!("{}", style(t!("settings.mixer.title")).cyan().bold());
    println!();
    println!(
        "  {}",
        t!(
            "settings.mixer.clip_range",
            min = mixer.min_clip_seconds,
            max = mixer.max_clip_seconds
        )
    );
    println!(
        "  {}",
        t!(
            "settings.mixer.target_range",
            min = mixer.target_min_seconds,
            max = mixer.target_max_seconds
        )
    );
    println!(
        "  {}",
        t!(
            "settings.mixer.fallback",
            seconds = mixer.fallback_interval_seconds
        )
    );
    println!(
        "  {}",
        t!(
            "settings.mixer.output",
            fps = mixer.output_fps,
            video = mixer.video_codec,
            audio = mixer.audio_codec
        )
    );
    println!(
        "  {}",
        t!("settings.mixer.parallel", count = mixer.parallel_files)
    );
    if let Some(seed) = mixer.seed {
        println!("  {}", t!("settings.mixer.seed", seed = seed));
    }
    println!();
    println!("{}", style(t!("settings.mixer.edit_hint")).dim());

    crate::pause(term)
}

/// 同時處理的檔案數
fn show_parallel_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.parallel.title")).cyan().bold());
    println!(
        "\n{} {}",
        style(t!("settings.parallel.current")).dim(),
        config.settings.mixer.parallel_files
    );
    println!();

    let value: usize = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.parallel.prompt"))
        .default(config.settings.mixer.parallel_files)
        .validate_with(|input: &usize| -> Result<(), String> {
            if (1..=MAX_PARALLEL_FILES).contains(input) {
                Ok(())
            } else {
                Err(t!("settings.parallel.invalid", max = MAX_PARALLEL_FILES).to_string())
            }
        })
        .interact_text_on(term)?;

    if value != config.settings.mixer.parallel_files {
        config.settings.mixer.parallel_files = value;
        save_settings(&config.settings)?;
        println!("\n{} {}", style(t!("settings.saved")).green(), value);
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

/// 語言設定選單
fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let languages = [Language::EnUs, Language::ZhTw];

    let items: Vec<String> = languages.iter().map(Language::to_string).collect();

    let default_index = languages
        .iter()
        .position(|&l| l == config.settings.language)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.language.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    // ESC pressed - return without saving
    let Some(selection) = selection else {
        return Ok(());
    };

    let selected_lang = languages[selection];

    if selected_lang != config.settings.language {
        config.settings.language = selected_lang;
        rust_i18n::set_locale(selected_lang.as_str());
        save_settings(&config.settings)?;
        println!(
            "\n{} {}",
            style(t!("settings.saved")).green(),
            selected_lang
        );
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

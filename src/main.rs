//! Demo driver for the playback engine.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load a plain-text book and user configuration from `conf/config.toml`.
//! - Run a headless playback session against the engine, sleeping between
//!   deadlines the way a host scheduler would.

use anyhow::{Context, Result, anyhow};
use readflow::config::{LogLevel, load_config};
use readflow::{Engine, EngineEvent, JsonFileStore, PlaybackState};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const CACHE_DIR: &str = ".cache";

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let (book_path, wpm) = parse_args()?;
    let config = load_config(Path::new("conf/config.toml"));
    set_log_level(reload_handle, config.log_level);
    info!(path = %book_path.display(), "Opening book");

    let text = fs::read_to_string(&book_path)
        .with_context(|| format!("Failed to read {}", book_path.display()))?;
    let book_id = book_path.to_string_lossy().to_string();

    let now = Instant::now();
    let store = JsonFileStore::new(CACHE_DIR);
    let mut engine = Engine::new(config, Box::new(store), now);
    engine.subscribe(|event| match event {
        EngineEvent::PositionChanged {
            index,
            progress,
            cause,
        } => info!(index = *index, progress = *progress, ?cause, "Position changed"),
        EngineEvent::PlayStateChanged(state) => info!(?state, "Play state changed"),
    });

    engine.load(&book_id, &[text], None, now);
    if engine.is_empty() {
        info!("Book contains no words; nothing to play");
        return Err(anyhow!("Empty book: {}", book_path.display()));
    }
    info!(
        words = engine.len(),
        position = engine.position(),
        "Session ready"
    );

    if let Some(wpm) = wpm {
        engine.set_words_per_minute(wpm, Instant::now());
    }
    engine.play(Instant::now());

    while engine.state() == PlaybackState::Playing {
        let now = Instant::now();
        match engine.next_deadline() {
            Some(deadline) => {
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                engine.tick(Instant::now());
            }
            None => break,
        }
    }

    engine.shutdown(Instant::now());
    info!(
        position = engine.position(),
        finished = engine.is_finished(),
        "Session ended"
    );
    Ok(())
}

fn parse_args() -> Result<(PathBuf, Option<f32>)> {
    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow!("Usage: readflow <path-to-text-book> [wpm]"))?;
    let path = PathBuf::from(path);
    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    let wpm = match args.next() {
        Some(raw) => Some(
            raw.parse::<f32>()
                .with_context(|| format!("Invalid wpm: {raw}"))?,
        ),
        None => None,
    };
    Ok((path, wpm))
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: LogLevel) {
    let parsed = EnvFilter::builder()
        .parse(level.as_filter_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        tracing::warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

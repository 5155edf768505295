use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{warn, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

const LOG_FILE: &str = "fibrebot.log";

fn log_level() -> Level {
    env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO)
}

pub fn log_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var("FIBREBOT_LOG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(env::temp_dir)
            .join("fibrebot")
            .join("logs")
    }
}

/// `RUST_LOG` wins outright when set; otherwise `level` applies, with the
/// CDP and HTTP internals held at warn.
fn filter(level: Level, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("invalid RUST_LOG '{directives}'"));
    }
    Ok(EnvFilter::default()
        .add_directive(level.into())
        .add_directive("chromiumoxide=warn".parse()?)
        .add_directive("tungstenite=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?))
}

/// Daily rolling appender in `dir`, created if missing.
fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .build(dir)
        .with_context(|| format!("failed to open log file in {}", dir.display()))
}

/// Log to stderr and, when the log directory is usable, to a daily rolling
/// file.
pub fn init_logging() -> Result<()> {
    let level = log_level();
    let rust_log = env::var("RUST_LOG").ok();
    let log_dir = log_dir();
    let (file_layer, file_error) = match file_appender(&log_dir) {
        Ok(writer) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter(level, rust_log.as_deref())?);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter(level, rust_log.as_deref())?),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the tracing subscriber")?;

    if let Some(e) = file_error {
        warn!("File logging disabled: {:#}", e);
    }
    Ok(())
}

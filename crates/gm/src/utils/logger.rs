use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use gm_config::logger::{LoggerConfig, LoggerFormat};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const WHITELISTED_CRATES: &[&str] = &["gm", "gm_bridge", "gm_config"];

pub(crate) fn default_env_filter(level: &str) -> String {
    let mut filters: Vec<String> = WHITELISTED_CRATES
        .iter()
        .map(|crate_name| format!("{crate_name}={level}"))
        .collect();

    // everything else only reports problems
    filters.insert(0, "warn".to_string());

    filters.join(",")
}

/// Root span of a command, tags every event with the configured host name
pub(crate) fn host_span(name: &str) -> tracing::Span {
    tracing::info_span!("gm", host = %name)
}

/// Level from the command line flags, `None` defers to the config
fn flag_level(quiet: bool, verbose: u8) -> Option<&'static str> {
    if quiet {
        Some("error")
    } else {
        match verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the computed filter.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed
pub(crate) fn init_logger(cfg: &LoggerConfig, quiet: bool, verbose: u8) -> Result<()> {
    let flagged = flag_level(quiet, verbose);
    if !cfg.enabled && flagged.is_none() {
        return Ok(());
    }
    let level = flagged.unwrap_or(cfg.level.as_str());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env_filter(level)));

    let (writer, ansi) = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(format!("Failed opening log file: {path}"))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), cfg.colors),
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match cfg.format {
        LoggerFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LoggerFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("Failed installing tracing subscriber")?;

    Ok(())
}

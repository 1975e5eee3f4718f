use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// How the host reports its own activity. Callback output never goes through here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// When false only `-q`/`-v` on the command line turn logging on
    #[serde(default = "crate::defaults::default_true")]
    pub enabled: bool,
    /// Applies to the gm crates, everything else logs warnings only
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LoggerFormat,
    /// ANSI colors on stderr, never used for log files
    #[serde(default = "crate::defaults::default_true")]
    pub colors: bool,
    /// Appends to this file instead of stderr. Stdout stays reserved for
    /// callback invocations either way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Utf8PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            format: LoggerFormat::default(),
            colors: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    /// One line per event, request spans abbreviated
    #[default]
    Compact,
    /// Multi-line events with every span field, for reading request traces
    Pretty,
    /// Newline-delimited JSON including the current span
    Json,
}

/// Severity threshold, `Trace` is the most verbose
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Lifecycle events that have no callback registered
    #[serde(alias = "TRACE")]
    Trace,
    /// Ready state changes and every callback handed to the script engine
    #[serde(alias = "DEBUG")]
    Debug,
    /// Script `GM_log` messages and pool start/stop
    #[serde(alias = "INFO")]
    #[default]
    Info,
    /// Refused requests and dropped callbacks
    #[serde(alias = "WARN")]
    Warn,
    /// Rejected secrets and failed requests or store access
    #[serde(alias = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

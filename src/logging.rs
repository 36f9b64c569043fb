//! Logging System
//!
//! Structured logging using the `tracing` crate, with configurable level, format
//! and destination. [`init_logging`] returns a [`LogHandle`] that components
//! receive at construction; toggling diagnostic mode goes through the handle
//! rather than global state.

use crate::error::CardpostError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Disable all log output
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format only, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Default log file: `<data dir>/cardpost/cardpost.log`
pub fn default_log_file() -> PathBuf {
    directories::ProjectDirs::from("org", "cardpost", "cardpost")
        .map(|dirs| dirs.data_dir().join("cardpost.log"))
        .unwrap_or_else(|| PathBuf::from(".cardpost/cardpost.log"))
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

struct LogState {
    debug: AtomicBool,
    base_filter: String,
    filter: Option<FilterHandle>,
}

/// Shared handle to the process logging configuration.
///
/// Diagnostic mode raises the log level to `debug` and makes the uploader read
/// responses in small fixed chunks.
#[derive(Clone)]
pub struct LogHandle {
    state: Arc<LogState>,
}

impl LogHandle {
    /// Handle not attached to any subscriber. Diagnostic mode still toggles.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(LogState {
                debug: AtomicBool::new(false),
                base_filter: default_log_level(),
                filter: None,
            }),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.state.debug.load(Ordering::SeqCst)
    }

    /// Switch diagnostic mode. Returns whether the mode changed.
    pub fn set_debug(&self, on: bool) -> bool {
        if self.state.debug.swap(on, Ordering::SeqCst) == on {
            return false;
        }
        if let Some(handle) = &self.state.filter {
            let directives = if on { "debug" } else { self.state.base_filter.as_str() };
            if let Err(e) = handle.reload(EnvFilter::new(directives)) {
                tracing::warn!(error = %e, "Failed to change log level");
            }
        }
        tracing::info!(debug = on, "Diagnostic mode changed");
        true
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("debug", &self.is_debug())
            .field("base_filter", &self.state.base_filter)
            .finish()
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. Environment variables (CARDPOST_LOG, CARDPOST_LOG_FORMAT, CARDPOST_LOG_OUTPUT)
/// 2. Configuration
/// 3. Defaults
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle, CardpostError> {
    let directives = filter_directives(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new(&directives));
    let base_subscriber = Registry::default().with(filter_layer);

    let use_color = config.color && output != Output::File;
    let writer = match output {
        Output::Stdout => BoxMakeWriter::new(std::io::stdout),
        Output::Stderr => BoxMakeWriter::new(std::io::stderr),
        Output::File => {
            let log_file = config.file.clone().unwrap_or_else(default_log_file);
            if let Some(parent) = log_file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CardpostError::ConfigError(format!("Failed to create log directory: {}", e))
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    CardpostError::ConfigError(format!(
                        "Failed to open log file {:?}: {}",
                        log_file, e
                    ))
                })?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    };

    let result = if format == "json" {
        base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };
    result.map_err(|e| CardpostError::ConfigError(format!("Failed to install logger: {}", e)))?;

    Ok(LogHandle {
        state: Arc::new(LogState {
            debug: AtomicBool::new(false),
            base_filter: directives,
            filter: Some(filter_handle),
        }),
    })
}

/// Filter directives from environment or config
fn filter_directives(config: &LoggingConfig) -> Result<String, CardpostError> {
    if let Ok(directives) = std::env::var("CARDPOST_LOG") {
        if !directives.trim().is_empty() {
            return Ok(directives);
        }
    }

    if !config.enabled || config.level == "off" {
        return Ok("off".to_string());
    }

    let mut directives = vec![config.level.clone()];
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        let directive = format!("{}={}", module, level);
        directive
            .parse::<tracing_subscriber::filter::Directive>()
            .map_err(|e| CardpostError::ConfigError(format!("Invalid log directive: {}", e)))?;
        directives.push(directive);
    }
    Ok(directives.join(","))
}

/// Determine output format from config or environment
fn determine_format(config: &LoggingConfig) -> Result<String, CardpostError> {
    if let Ok(format) = std::env::var("CARDPOST_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.format.as_str();
    if format != "json" && format != "text" {
        return Err(CardpostError::ConfigError(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(format.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
    File,
}

fn determine_output(config: &LoggingConfig) -> Result<Output, CardpostError> {
    if let Ok(output) = std::env::var("CARDPOST_LOG_OUTPUT") {
        return parse_output(&output);
    }
    parse_output(&config.output)
}

fn parse_output(output: &str) -> Result<Output, CardpostError> {
    match output {
        "stdout" => Ok(Output::Stdout),
        "stderr" => Ok(Output::Stderr),
        "file" => Ok(Output::File),
        _ => Err(CardpostError::ConfigError(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            output
        ))),
    }
}

//! Error types for the cardpost composer.
//!
//! Each component owns a small closed set of error kinds. None of them escape an
//! asynchronous entry point: scanners turn [`ProbeError`] into a failed scan, the
//! uploader folds [`TransportError`] into its outcome, and the pipeline reports
//! everything else through the status contract.

use crate::card::CardIssue;
use std::path::PathBuf;
use thiserror::Error;

/// Probe backend errors. Non-fatal: a failed probe only leaves its card field absent.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe unavailable: {0}")]
    Unavailable(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Discovery failed with code {0}")]
    Discovery(i32),

    #[error("Positioning failed: {0}")]
    Positioning(String),

    #[error("Unknown positioning module: {0}")]
    UnknownModule(u32),
}

/// Stage of an upload at which the transport failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStage {
    Bearer,
    Connect,
    Write,
    Read,
}

impl std::fmt::Display for TransportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportStage::Bearer => "bearer",
            TransportStage::Connect => "connect",
            TransportStage::Write => "write",
            TransportStage::Read => "read",
        };
        f.write_str(name)
    }
}

/// Transport failure for the current delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transport error during {stage}: {message}")]
pub struct TransportError {
    pub stage: TransportStage,
    /// OS error code, when the failure came from the socket layer
    pub code: Option<i32>,
    pub message: String,
}

impl TransportError {
    pub fn new(stage: TransportStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_io(stage: TransportStage, err: &std::io::Error) -> Self {
        Self {
            stage,
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// Uploader request errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Still sending")]
    StillSending,
}

/// Problems building the request body. Aborts the delivery step only.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Failed to read photo {path:?}: {source}")]
    Photo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read attachment {path:?}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local storage fallback errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create uploads directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write card to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline request errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("A scan-and-send cycle is already active")]
    Busy,
}

/// Reasons the engine declines to start a send
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendRefusal {
    #[error("No sender email address")]
    NoSenderAddress,

    #[error("No recipient email address")]
    NoRecipientAddress,

    #[error("Still sending the previous card")]
    StillSending,
}

impl From<CardIssue> for SendRefusal {
    fn from(issue: CardIssue) -> Self {
        match issue {
            CardIssue::NoSenderAddress => SendRefusal::NoSenderAddress,
            CardIssue::NoRecipientAddress => SendRefusal::NoRecipientAddress,
        }
    }
}

impl From<PipelineError> for SendRefusal {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Busy => SendRefusal::StillSending,
        }
    }
}

/// Attachment inbox setup errors
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("Failed to create inbox {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch inbox {path:?}: {message}")]
    Watch { path: PathBuf, message: String },
}

/// Runtime settings persistence errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level errors surfaced by configuration loading and the CLI
#[derive(Debug, Error)]
pub enum CardpostError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Send refused: {0}")]
    Refused(#[from] SendRefusal),

    #[error("Inbox error: {0}")]
    Inbox(#[from] InboxError),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Invalid value for setting {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

impl From<config::ConfigError> for CardpostError {
    fn from(err: config::ConfigError) -> Self {
        CardpostError::ConfigError(err.to_string())
    }
}

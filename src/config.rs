//! Configuration System
//!
//! Static configuration loaded once at startup: upload endpoint, storage
//! locations, scan timing, configured probe data, network access points and
//! logging. Layered with the `config` crate; see [`ConfigLoader`] for the
//! source order. Runtime toggles live in [`crate::settings`] instead.

use crate::card::CellInfo;
use crate::encode::Endpoint;
use crate::logging::LoggingConfig;
use crate::upload::AccessPointId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardpostConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Data for the configured probe backends
    #[serde(default)]
    pub fixtures: FixtureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_host() -> String {
    Endpoint::default().host
}

fn default_port() -> u16 {
    Endpoint::default().port
}

fn default_path() -> String {
    Endpoint::default().path
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "cardpost", "cardpost")
}

fn default_uploads_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("uploads"))
        .unwrap_or_else(|| PathBuf::from(".cardpost/uploads"))
}

fn default_settings_file() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from(".cardpost/settings.toml"))
}

/// Storage paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving cards stored instead of sent
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Runtime settings file
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            settings_file: default_settings_file(),
        }
    }
}

fn default_proximity_timeout_secs() -> u64 {
    25
}

fn default_position_interval_secs() -> u64 {
    30
}

fn default_debug_read_chunk() -> usize {
    1024
}

/// Probe and transport timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_proximity_timeout_secs")]
    pub proximity_timeout_secs: u64,

    #[serde(default = "default_position_interval_secs")]
    pub position_interval_secs: u64,

    /// Response read size while diagnostic mode is on
    #[serde(default = "default_debug_read_chunk")]
    pub debug_read_chunk: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            proximity_timeout_secs: default_proximity_timeout_secs(),
            position_interval_secs: default_position_interval_secs(),
            debug_read_chunk: default_debug_read_chunk(),
        }
    }
}

impl ScanConfig {
    pub fn proximity_timeout(&self) -> Duration {
        Duration::from_secs(self.proximity_timeout_secs)
    }

    pub fn position_interval(&self) -> Duration {
        Duration::from_secs(self.position_interval_secs)
    }
}

fn default_inbox_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("inbox"))
        .unwrap_or_else(|| PathBuf::from(".cardpost/inbox"))
}

fn default_attachment_extension() -> String {
    "doc".to_string()
}

fn default_settle_delay_ms() -> u64 {
    5000
}

/// Documents arriving for the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Directory watched for arriving documents
    #[serde(default = "default_inbox_dir")]
    pub inbox_dir: PathBuf,

    /// Extension an arriving file must carry, without the dot
    #[serde(default = "default_attachment_extension")]
    pub extension: String,

    /// Wait after an arrival before the file is read
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Attached to every fresh card while the file exists
    #[serde(default)]
    pub default_file: Option<PathBuf>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            inbox_dir: default_inbox_dir(),
            extension: default_attachment_extension(),
            settle_delay_ms: default_settle_delay_ms(),
            default_file: None,
        }
    }
}

impl AttachmentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// A network attachment the uploader may bind to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    pub id: AccessPointId,
    pub name: String,
    /// Local address outgoing connections bind to. Unset uses the default route.
    #[serde(default)]
    pub local_addr: Option<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub access_points: Vec<AccessPointConfig>,
}

impl NetworkConfig {
    pub fn access_point(&self, id: AccessPointId) -> Option<&AccessPointConfig> {
        self.access_points.iter().find(|ap| ap.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDevice {
    /// Hex address, colons optional
    pub address: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixturePosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
    #[serde(default)]
    pub vertical_accuracy: Option<f64>,
}

/// Probe data used where no radio hardware is present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureConfig {
    #[serde(default)]
    pub cell: Option<CellInfo>,

    #[serde(default)]
    pub devices: Option<Vec<FixtureDevice>>,

    #[serde(default)]
    pub position: Option<FixturePosition>,

    /// Delay before each discovery reply
    #[serde(default)]
    pub step_delay_ms: u64,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Server(String),
    Storage(String),
    Scan(String),
    Network(String),
    Attachments(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Server(msg) => write!(f, "Server: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Scan(msg) => write!(f, "Scan: {}", msg),
            ValidationError::Network(msg) => write!(f, "Network: {}", msg),
            ValidationError::Attachments(msg) => write!(f, "Attachments: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CardpostConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ValidationError::Server("Host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            errors.push(ValidationError::Server("Port cannot be 0".to_string()));
        }
        if !self.server.path.starts_with('/') {
            errors.push(ValidationError::Server(format!(
                "Path must start with '/': {}",
                self.server.path
            )));
        }

        if self.storage.uploads_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Uploads directory cannot be empty".to_string(),
            ));
        }
        if self.storage.settings_file.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Settings file cannot be empty".to_string(),
            ));
        }

        if self.scan.proximity_timeout_secs == 0 {
            errors.push(ValidationError::Scan(
                "Proximity timeout must be positive".to_string(),
            ));
        }
        if self.scan.position_interval_secs == 0 {
            errors.push(ValidationError::Scan(
                "Position interval must be positive".to_string(),
            ));
        }
        if self.scan.debug_read_chunk == 0 {
            errors.push(ValidationError::Scan(
                "Debug read chunk must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for ap in &self.network.access_points {
            if !seen.insert(ap.id) {
                errors.push(ValidationError::Network(format!(
                    "Duplicate access point id {}",
                    ap.id
                )));
            }
        }

        if self.attachments.inbox_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Attachments(
                "Inbox directory cannot be empty".to_string(),
            ));
        }
        let extension = &self.attachments.extension;
        if extension.is_empty() || extension.starts_with('.') {
            errors.push(ValidationError::Attachments(format!(
                "Extension must be non-empty and given without the dot: {:?}",
                extension
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

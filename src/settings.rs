//! Runtime settings.
//!
//! Small key/value store read by the pipeline and probes at every decision
//! point, so toggles take effect on the next cycle without restart. Values are
//! persisted as TOML; a setter that does not change its value does not write.

use crate::card::{private_recipient, CardDefaults, CardField, ChangeListener, Contact, ContextSnapshot};
use crate::error::SettingsError;
use crate::probe::ModuleId;
use crate::upload::AccessPointId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub access_point: Option<AccessPointId>,
    /// Forbids context scanning, both in the background and before a send
    pub scanning_disabled: bool,
    pub proximity_scan_enabled: bool,
    pub gps_scan_enabled: bool,
    pub store_instead_of_send: bool,
    pub positioning_module: Option<ModuleId>,
    pub debug: bool,
    pub mood: String,
    /// Empty means no sender
    pub sender: Contact,
    /// Empty means no recipient
    pub recipient: Contact,
    pub photo: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_point: None,
            scanning_disabled: false,
            proximity_scan_enabled: true,
            gps_scan_enabled: true,
            store_instead_of_send: false,
            positioning_module: None,
            debug: false,
            mood: String::new(),
            sender: Contact::new(),
            recipient: private_recipient(),
            photo: None,
        }
    }
}

/// The settings a scan-and-send cycle consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    pub scanning_disabled: bool,
    pub proximity_scan_enabled: bool,
    pub store_instead_of_send: bool,
    pub access_point: Option<AccessPointId>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
    path: Option<Arc<PathBuf>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory(Settings::default())
    }
}

impl SettingsStore {
    /// Store that is never written to disk.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            path: None,
        }
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Settings::default()
            }
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(settings)),
            path: Some(Arc::new(path)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let text = toml::to_string(&*self.inner.read())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let s = self.inner.read();
        PipelineConfig {
            scanning_disabled: s.scanning_disabled,
            proximity_scan_enabled: s.proximity_scan_enabled,
            store_instead_of_send: s.store_instead_of_send,
            access_point: s.access_point,
        }
    }

    pub fn card_defaults(&self) -> CardDefaults {
        let s = self.inner.read();
        CardDefaults {
            mood: s.mood.clone(),
            sender: (!s.sender.is_empty()).then(|| s.sender.clone()),
            recipient: (!s.recipient.is_empty()).then(|| s.recipient.clone()),
            photo: s.photo.clone(),
        }
    }

    /// Apply `f`; persist and return `true` only if the settings changed.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> bool {
        let changed = {
            let mut s = self.inner.write();
            let before = s.clone();
            f(&mut s);
            *s != before
        };
        if changed {
            if let Err(e) = self.save() {
                warn!(error = %e, "Failed to save settings");
            }
        }
        changed
    }

    pub fn access_point(&self) -> Option<AccessPointId> {
        self.inner.read().access_point
    }

    pub fn set_access_point(&self, ap: Option<AccessPointId>) -> bool {
        self.update(|s| s.access_point = ap)
    }

    pub fn scanning_disabled(&self) -> bool {
        self.inner.read().scanning_disabled
    }

    pub fn set_scanning_disabled(&self, on: bool) -> bool {
        self.update(|s| s.scanning_disabled = on)
    }

    pub fn proximity_scan_enabled(&self) -> bool {
        self.inner.read().proximity_scan_enabled
    }

    pub fn set_proximity_scan_enabled(&self, on: bool) -> bool {
        self.update(|s| s.proximity_scan_enabled = on)
    }

    pub fn gps_scan_enabled(&self) -> bool {
        self.inner.read().gps_scan_enabled
    }

    pub fn set_gps_scan_enabled(&self, on: bool) -> bool {
        self.update(|s| s.gps_scan_enabled = on)
    }

    pub fn store_instead_of_send(&self) -> bool {
        self.inner.read().store_instead_of_send
    }

    pub fn set_store_instead_of_send(&self, on: bool) -> bool {
        self.update(|s| s.store_instead_of_send = on)
    }

    pub fn positioning_module(&self) -> Option<ModuleId> {
        self.inner.read().positioning_module
    }

    pub fn set_positioning_module(&self, id: Option<ModuleId>) -> bool {
        self.update(|s| s.positioning_module = id)
    }

    pub fn debug(&self) -> bool {
        self.inner.read().debug
    }

    pub fn set_debug(&self, on: bool) -> bool {
        self.update(|s| s.debug = on)
    }
}

/// Persists the card's long-lived fields whenever they change.
pub struct SettingsListener {
    settings: SettingsStore,
}

impl SettingsListener {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }
}

impl ChangeListener for SettingsListener {
    fn field_changed(&self, field: CardField, card: &ContextSnapshot) {
        match field {
            CardField::Mood => {
                let mood = card.mood().to_string();
                self.settings.update(|s| s.mood = mood);
            }
            CardField::Sender => {
                let sender = card.sender().cloned().unwrap_or_default();
                self.settings.update(|s| s.sender = sender);
            }
            CardField::Recipient => {
                let recipient = card.recipient().cloned().unwrap_or_default();
                self.settings.update(|s| s.recipient = recipient);
            }
            CardField::Photo => {
                let photo = card.photo().map(Path::to_path_buf);
                self.settings.update(|s| s.photo = photo);
            }
            _ => {}
        }
    }
}

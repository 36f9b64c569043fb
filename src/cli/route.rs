//! CLI route: single route table and run context. Dispatches to the engine and presentation.

use crate::card::{basename, public_recipient, private_recipient, Attachment, Contact, EMAIL_ADDRESS};
use crate::cli::parse::{Commands, SettingsCommands};
use crate::cli::presentation::{
    format_fix, format_modules_table, format_settings_json, format_settings_table,
    format_validation_errors, DialoguerChooser,
};
use crate::config::{CardpostConfig, ConfigLoader};
use crate::engine::{Backends, Engine};
use crate::inbox::ArrivalCallback;
use crate::error::{CardpostError, EncodingError, ProbeError};
use crate::logging::LogHandle;
use crate::pipeline::{DeliveryStatus, StatusSink};
use crate::settings::SettingsStore;
use crate::upload::AccessPointId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Runtime context for CLI execution: configuration, runtime settings and the log handle.
pub struct RunContext {
    config: CardpostConfig,
    settings: SettingsStore,
    log: LogHandle,
}

/// Per-send card edits from the command line
struct CardEdits<'a> {
    mood: Option<&'a str>,
    sender: Option<&'a str>,
    sender_name: Option<&'a str>,
    recipient: Option<Contact>,
    photo: Option<Option<&'a Path>>,
    attach: Option<&'a Path>,
    wait_attachment: bool,
}

impl RunContext {
    /// Load configuration (file, or layered from the workspace) and open the settings store.
    pub fn new(
        workspace_root: &Path,
        config_path: Option<&Path>,
        settings_path: Option<PathBuf>,
        log: LogHandle,
    ) -> Result<Self, CardpostError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(workspace_root)?,
        };
        let settings_path = settings_path.unwrap_or_else(|| config.storage.settings_file.clone());
        let settings = SettingsStore::load(settings_path)?;
        Ok(Self {
            config,
            settings,
            log,
        })
    }

    pub fn config(&self) -> &CardpostConfig {
        &self.config
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn engine(&self) -> Result<Engine, CardpostError> {
        Engine::new(
            &self.config,
            self.settings.clone(),
            Backends::from_config(&self.config),
            self.log.clone(),
        )
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, CardpostError> {
        match command {
            Commands::Send {
                mood,
                sender,
                sender_name,
                recipient,
                public,
                private,
                photo,
                no_photo,
                attach,
                wait_attachment,
            } => {
                let recipient = match (recipient, public, private) {
                    (Some(email), _, _) => Some(Contact::from([(
                        EMAIL_ADDRESS.to_string(),
                        email.clone(),
                    )])),
                    (None, true, _) => Some(public_recipient()),
                    (None, _, true) => Some(private_recipient()),
                    _ => None,
                };
                let photo = if *no_photo {
                    Some(None)
                } else {
                    photo.as_deref().map(Some)
                };
                self.send(CardEdits {
                    mood: mood.as_deref(),
                    sender: sender.as_deref(),
                    sender_name: sender_name.as_deref(),
                    recipient,
                    photo,
                    attach: attach.as_deref(),
                    wait_attachment: *wait_attachment,
                })
                .await
            }
            Commands::Settings { command } => self.settings_command(command),
            Commands::Modules { choose } => {
                let engine = self.engine()?;
                if *choose {
                    if let Some(id) = engine.edit_gps_config(&DialoguerChooser)? {
                        info!(module = id, "Positioning module selected");
                    }
                }
                let current = self.settings.positioning_module().unwrap_or_else(|| {
                    engine
                        .positioning_modules()
                        .first()
                        .map(|m| m.id)
                        .unwrap_or_default()
                });
                Ok(format_modules_table(&engine.positioning_modules(), current))
            }
            Commands::Position { count } => self.position(*count).await,
            Commands::Validate => match self.config.validate() {
                Ok(()) => Ok("Configuration is valid.".to_string()),
                Err(errors) => Err(CardpostError::ConfigError(format_validation_errors(&errors))),
            },
        }
    }

    async fn send(&self, edits: CardEdits<'_>) -> Result<String, CardpostError> {
        let engine = self.engine()?;
        {
            let card = engine.card();
            let mut card = card.lock();
            if let Some(mood) = edits.mood {
                card.set_mood(mood);
            }
            if edits.sender.is_some() || edits.sender_name.is_some() {
                let mut contact = card.sender().cloned().unwrap_or_default();
                if let Some(email) = edits.sender {
                    contact.insert(EMAIL_ADDRESS.to_string(), email.to_string());
                }
                if let Some(name) = edits.sender_name {
                    contact.insert("first_name".to_string(), name.to_string());
                }
                card.set_sender(Some(contact));
            }
            if let Some(recipient) = edits.recipient {
                card.set_recipient(Some(recipient));
            }
            if let Some(photo) = edits.photo {
                card.set_photo(photo.map(Path::to_path_buf));
            }
            if let Some(path) = edits.attach {
                let data = std::fs::read(path).map_err(|source| EncodingError::Attachment {
                    path: path.to_path_buf(),
                    source,
                })?;
                let name = basename(path).unwrap_or_else(|| "attachment".to_string());
                card.set_attachment(Some(Attachment { name, data }));
            }
        }

        if edits.wait_attachment {
            let (tx, mut arrivals) = mpsc::unbounded_channel();
            let on_arrival: ArrivalCallback = Arc::new(move |name: &str| {
                let _ = tx.send(name.to_string());
            });
            engine.start_observing_attachments(on_arrival)?;
            eprintln!(
                "Waiting for a document in {}...",
                self.config.attachments.inbox_dir.display()
            );
            let arrived = arrivals.recv().await;
            engine.stop_observing_attachments();
            if let Some(name) = arrived {
                eprintln!("Attached {}", name);
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn StatusSink> = Arc::new(move |status: DeliveryStatus| {
            let _ = tx.send(status);
        });
        engine.send_card(sink)?;

        let result = report_delivery(&mut rx).await;
        engine.shutdown();
        result
    }

    fn settings_command(&self, command: &SettingsCommands) -> Result<String, CardpostError> {
        match command {
            SettingsCommands::Show { format } => {
                let snapshot = self.settings.snapshot();
                if format == "json" {
                    format_settings_json(&snapshot)
                } else {
                    Ok(format_settings_table(&snapshot))
                }
            }
            SettingsCommands::Set { key, value } => {
                let changed = apply_setting(&self.settings, key, value)?;
                Ok(if changed {
                    format!("{} = {}", key, value)
                } else {
                    format!("{} unchanged", key)
                })
            }
            SettingsCommands::ClearAccessPoint => {
                self.settings.set_access_point(None);
                Ok("Access point cleared.".to_string())
            }
        }
    }

    async fn position(&self, count: usize) -> Result<String, CardpostError> {
        if self.settings.scanning_disabled() {
            return Ok("Context scanning is disabled.".to_string());
        }
        if !self.settings.gps_scan_enabled() {
            return Ok("GPS scanning is disabled.".to_string());
        }
        let engine = self.engine()?;
        let mut fixes = engine.watch_position();
        engine.context_start_scanning();

        let wait = self.config.scan.position_interval() * 2 + Duration::from_secs(5);
        let mut lines = Vec::new();
        while lines.len() < count {
            match tokio::time::timeout(wait, fixes.changed()).await {
                Ok(Ok(())) => {
                    if let Some(fix) = *fixes.borrow_and_update() {
                        let line = format_fix(&fix);
                        eprintln!("{}", line);
                        lines.push(line);
                    }
                }
                Ok(Err(_)) => break,
                Err(_) => {
                    return Err(CardpostError::Probe(ProbeError::Positioning(
                        "no fix received".to_string(),
                    )))
                }
            }
        }
        engine.context_stop_scanning();
        Ok(format!("{} fix(es) received", lines.len()))
    }
}

/// Print progress until the terminal status arrives and turn it into the command result.
async fn report_delivery(
    rx: &mut mpsc::UnboundedReceiver<DeliveryStatus>,
) -> Result<String, CardpostError> {
    let mut lines = Vec::new();
    while let Some(status) = rx.recv().await {
        match status {
            DeliveryStatus::Progress(message) => {
                eprintln!("{}...", message);
            }
            DeliveryStatus::Ok(message) => {
                lines.push(message);
                break;
            }
            DeliveryStatus::Fail(message) => return Err(CardpostError::Delivery(message)),
        }
    }
    Ok(lines.join("\n"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, CardpostError> {
    match value {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_optional_u32(key: &str, value: &str) -> Result<Option<u32>, CardpostError> {
    if value == "none" {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> CardpostError {
    CardpostError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Apply a `key = value` change from the command line. Returns whether it changed anything.
pub fn apply_setting(
    settings: &SettingsStore,
    key: &str,
    value: &str,
) -> Result<bool, CardpostError> {
    let changed = match key {
        "access_point" => {
            settings.set_access_point(parse_optional_u32(key, value)?.map(AccessPointId))
        }
        "scanning_disabled" => settings.set_scanning_disabled(parse_flag(key, value)?),
        "proximity_scan_enabled" => settings.set_proximity_scan_enabled(parse_flag(key, value)?),
        "gps_scan_enabled" => settings.set_gps_scan_enabled(parse_flag(key, value)?),
        "store_instead_of_send" => settings.set_store_instead_of_send(parse_flag(key, value)?),
        "positioning_module" => settings.set_positioning_module(parse_optional_u32(key, value)?),
        "debug" => settings.set_debug(parse_flag(key, value)?),
        "mood" => {
            let mood = value.to_string();
            settings.update(|s| s.mood = mood)
        }
        _ => return Err(CardpostError::UnknownSetting(key.to_string())),
    };
    Ok(changed)
}

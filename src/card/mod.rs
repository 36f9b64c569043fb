//! Card: the mutable aggregate of user and context data prepared for delivery.
//!
//! Every setter compares the new value with the current one. Equal values are a
//! no-op; a real change updates the field, refreshes the shared timestamp record
//! and notifies the listener exactly once with the field that changed.

pub mod metadata;
pub mod types;

pub use metadata::{CardMetadata, MetaMap, MetaValue};
pub use types::{
    private_recipient, public_recipient, Attachment, CellInfo, Contact, Course, GpsFix, Position,
    ProximityDevice, TimestampRecord, EMAIL_ADDRESS,
};

use crate::clock::Clock;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Card field names, as reported to change listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    Mood,
    Sender,
    Recipient,
    Attachment,
    Photo,
    Cell,
    Proximity,
    Gps,
    /// Several fields were reset at once
    All,
}

impl CardField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardField::Mood => "mood",
            CardField::Sender => "sender",
            CardField::Recipient => "recipient",
            CardField::Attachment => "attachment",
            CardField::Photo => "photo",
            CardField::Cell => "cell",
            CardField::Proximity => "proximity",
            CardField::Gps => "gps",
            CardField::All => "all",
        }
    }
}

/// Observer of card changes (screen refresh, settings persistence).
///
/// Called with the card still borrowed; implementations must not try to
/// lock the shared card again.
pub trait ChangeListener: Send + Sync {
    fn field_changed(&self, field: CardField, card: &ContextSnapshot);
}

/// Initial values for the persistent card fields
#[derive(Debug, Clone, PartialEq)]
pub struct CardDefaults {
    pub mood: String,
    pub sender: Option<Contact>,
    pub recipient: Option<Contact>,
    pub photo: Option<PathBuf>,
}

impl Default for CardDefaults {
    fn default() -> Self {
        Self {
            mood: String::new(),
            sender: None,
            recipient: Some(private_recipient()),
            photo: None,
        }
    }
}

/// Reasons a card is not ready to be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CardIssue {
    #[error("No sender email address")]
    NoSenderAddress,
    #[error("No recipient email address")]
    NoRecipientAddress,
}

pub type SharedCard = Arc<Mutex<ContextSnapshot>>;

pub struct ContextSnapshot {
    mood: String,
    sender: Option<Contact>,
    recipient: Option<Contact>,
    attachment: Option<Attachment>,
    photo: Option<PathBuf>,
    cell: Option<CellInfo>,
    proximity: Option<Vec<ProximityDevice>>,
    gps: Option<GpsFix>,
    timestamp: TimestampRecord,
    clock: Arc<dyn Clock>,
    listener: Option<Arc<dyn ChangeListener>>,
    default_attachment: Option<PathBuf>,
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl ContextSnapshot {
    pub fn new(defaults: &CardDefaults, clock: Arc<dyn Clock>) -> Self {
        let timestamp = TimestampRecord::now(clock.as_ref());
        let mut card = Self {
            mood: String::new(),
            sender: None,
            recipient: None,
            attachment: None,
            photo: None,
            cell: None,
            proximity: None,
            gps: None,
            timestamp,
            clock,
            listener: None,
            default_attachment: None,
        };
        card.clear(defaults);
        card
    }

    /// Attach `path` to the card now and after every temporary clear, as
    /// long as the file exists.
    pub fn with_default_attachment(mut self, path: Option<PathBuf>) -> Self {
        self.default_attachment = path;
        if self.attachment.is_none() {
            self.attachment = self.read_default_attachment();
        }
        self
    }

    fn read_default_attachment(&self) -> Option<Attachment> {
        let path = self.default_attachment.as_deref().filter(|p| p.is_file())?;
        let data = std::fs::read(path).ok()?;
        Some(Attachment {
            name: basename(path)?,
            data,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn ChangeListener>>) {
        self.listener = listener;
    }

    pub fn into_shared(self) -> SharedCard {
        Arc::new(Mutex::new(self))
    }

    pub fn mood(&self) -> &str {
        &self.mood
    }

    pub fn sender(&self) -> Option<&Contact> {
        self.sender.as_ref()
    }

    pub fn recipient(&self) -> Option<&Contact> {
        self.recipient.as_ref()
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn photo(&self) -> Option<&Path> {
        self.photo.as_deref()
    }

    pub fn cell(&self) -> Option<&CellInfo> {
        self.cell.as_ref()
    }

    pub fn proximity(&self) -> Option<&[ProximityDevice]> {
        self.proximity.as_deref()
    }

    pub fn gps(&self) -> Option<&GpsFix> {
        self.gps.as_ref()
    }

    pub fn timestamp(&self) -> &TimestampRecord {
        &self.timestamp
    }

    /// Reset every field, reloading the persistent ones from `defaults`.
    ///
    /// A default photo that no longer exists on disk is dropped.
    pub fn clear(&mut self, defaults: &CardDefaults) {
        self.mood = defaults.mood.clone();
        self.sender = defaults.sender.clone();
        self.recipient = defaults.recipient.clone();
        self.photo = defaults.photo.clone().filter(|p| p.is_file());
        self.clear_temporary();
    }

    /// Reset the per-send fields. Sender, recipient, mood and photo survive;
    /// the default attachment, if any, is read again.
    pub fn clear_temporary(&mut self) {
        self.attachment = self.read_default_attachment();
        self.cell = None;
        self.proximity = None;
        self.gps = None;
        self.touch(CardField::All);
    }

    /// Remove all scanned context.
    pub fn clear_context(&mut self) {
        self.set_cell(None);
        self.set_gps(None);
        self.set_proximity(None);
    }

    pub fn set_mood(&mut self, mood: impl Into<String>) -> bool {
        let changed = replace(&mut self.mood, mood.into());
        if changed {
            self.touch(CardField::Mood);
        }
        changed
    }

    pub fn set_sender(&mut self, sender: Option<Contact>) -> bool {
        let changed = replace(&mut self.sender, sender);
        if changed {
            self.touch(CardField::Sender);
        }
        changed
    }

    pub fn set_recipient(&mut self, recipient: Option<Contact>) -> bool {
        let changed = replace(&mut self.recipient, recipient);
        if changed {
            self.touch(CardField::Recipient);
        }
        changed
    }

    pub fn set_attachment(&mut self, attachment: Option<Attachment>) -> bool {
        let changed = replace(&mut self.attachment, attachment);
        if changed {
            self.touch(CardField::Attachment);
        }
        changed
    }

    pub fn set_photo(&mut self, photo: Option<PathBuf>) -> bool {
        let changed = replace(&mut self.photo, photo);
        if changed {
            self.touch(CardField::Photo);
        }
        changed
    }

    pub fn set_cell(&mut self, cell: Option<CellInfo>) -> bool {
        let changed = replace(&mut self.cell, cell);
        if changed {
            self.touch(CardField::Cell);
        }
        changed
    }

    pub fn set_proximity(&mut self, devices: Option<Vec<ProximityDevice>>) -> bool {
        let changed = replace(&mut self.proximity, devices);
        if changed {
            self.touch(CardField::Proximity);
        }
        changed
    }

    pub fn set_gps(&mut self, fix: Option<GpsFix>) -> bool {
        let changed = replace(&mut self.gps, fix);
        if changed {
            self.touch(CardField::Gps);
        }
        changed
    }

    fn touch(&mut self, field: CardField) {
        self.timestamp = TimestampRecord::now(self.clock.as_ref());
        if let Some(listener) = self.listener.clone() {
            listener.field_changed(field, self);
        }
    }

    pub fn has_valid_sender(&self) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|c| c.contains_key(EMAIL_ADDRESS))
    }

    pub fn has_valid_recipient(&self) -> bool {
        self.recipient
            .as_ref()
            .is_some_and(|c| c.contains_key(EMAIL_ADDRESS))
    }

    /// Check that the card carries everything a delivery needs.
    pub fn validate(&self) -> Result<(), CardIssue> {
        if !self.has_valid_sender() {
            return Err(CardIssue::NoSenderAddress);
        }
        if !self.has_valid_recipient() {
            return Err(CardIssue::NoRecipientAddress);
        }
        Ok(())
    }

    /// Assemble the metadata view sent with the card.
    ///
    /// Each section is present iff its source field is. A proximity scan that
    /// found nothing is still reported, as an empty list.
    pub fn prepare_for_sending(&self) -> CardMetadata {
        let mut m = MetaMap::new();
        if let Some(attachment) = &self.attachment {
            m.insert("data filename".to_string(), attachment.name.as_str().into());
        }
        if let Some(name) = self.photo.as_deref().and_then(basename) {
            m.insert("photo filename".to_string(), name.into());
        }
        if let Some(sender) = &self.sender {
            m.insert("sender".to_string(), sender.into());
        }
        if let Some(recipient) = &self.recipient {
            m.insert("receiver".to_string(), recipient.into());
        }
        m.insert("status".to_string(), self.mood.as_str().into());
        if let Some(fix) = &self.gps {
            m.insert("gps".to_string(), fix.into());
        }
        if let Some(devices) = self.proximity.as_ref().filter(|d| !d.is_empty()) {
            m.insert(
                "bt scan".to_string(),
                MetaValue::List(devices.iter().map(MetaValue::from).collect()),
            );
        }
        if let Some(cell) = &self.cell {
            m.insert("gsm".to_string(), cell.into());
        }
        m.insert("time".to_string(), (&self.timestamp).into());
        CardMetadata::new(m)
    }
}

/// Final path component, accepting both `/` and `\` separators.
pub fn basename(path: &Path) -> Option<String> {
    let s = path.to_str()?;
    s.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl std::fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("mood", &self.mood)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("attachment", &self.attachment.as_ref().map(|a| &a.name))
            .field("photo", &self.photo)
            .field("cell", &self.cell)
            .field("proximity", &self.proximity)
            .field("gps", &self.gps)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

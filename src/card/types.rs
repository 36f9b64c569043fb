//! Value types held by a card.

use crate::clock::{Clock, ZoneInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contact details keyed by field name (`email_address`, `first_name`, ...)
pub type Contact = BTreeMap<String, String>;

pub const EMAIL_ADDRESS: &str = "email_address";

fn contact(first_name: &str, email: &str) -> Contact {
    let mut c = Contact::new();
    c.insert("first_name".to_string(), first_name.to_string());
    c.insert(EMAIL_ADDRESS.to_string(), email.to_string());
    c
}

/// Recipient that asks the server to publish the card.
pub fn public_recipient() -> Contact {
    contact("Make public", "publish@postcards.example.org")
}

/// Recipient that asks the server to keep the card private. The default.
pub fn private_recipient() -> Contact {
    contact("Keep private", "private@postcards.example.org")
}

/// Serving cell as reported by the cellular modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub country_code: u32,
    pub network_code: u32,
    pub area_code: u32,
    pub cell_id: u32,
}

/// A short-range device seen during a proximity scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityDevice {
    /// Colon-separated hexadecimal address, e.g. `00:1a:7d:da:71:13`
    pub address: String,
    pub name: String,
}

/// Binary document attached to the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

// Positioning hardware reports unknown quantities as NaN, so fixes compare
// NaN fields as equal to each other.
fn same_f64(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        same_f64(self.latitude, other.latitude)
            && same_f64(self.longitude, other.longitude)
            && same_f64(self.altitude, other.altitude)
            && same_f64(self.horizontal_accuracy, other.horizontal_accuracy)
            && same_f64(self.vertical_accuracy, other.vertical_accuracy)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Course {
    pub speed: f64,
    pub heading: f64,
    pub speed_accuracy: f64,
    pub heading_accuracy: f64,
}

impl PartialEq for Course {
    fn eq(&self, other: &Self) -> bool {
        same_f64(self.speed, other.speed)
            && same_f64(self.heading, other.heading)
            && same_f64(self.speed_accuracy, other.speed_accuracy)
            && same_f64(self.heading_accuracy, other.heading_accuracy)
    }
}

/// Position fix, optionally with course information
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub position: Position,
    #[serde(default)]
    pub course: Option<Course>,
}

/// When the card was last changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampRecord {
    /// Seconds since the Unix epoch, with sub-second precision
    pub time: f64,
    /// Standard time zone offset, seconds west of UTC
    pub timezone: i32,
    /// Whether daylight saving time was in effect
    pub daylight: bool,
    /// DST offset, seconds west of UTC; set only while DST is in effect
    pub altzone: Option<i32>,
}

impl TimestampRecord {
    pub fn now(clock: &dyn Clock) -> Self {
        let at = clock.now();
        let ZoneInfo {
            offset_west,
            dst_in_effect,
            dst_offset_west,
        } = clock.zone_at(at);
        Self {
            time: at.timestamp_millis() as f64 / 1000.0,
            timezone: offset_west,
            daylight: dst_in_effect,
            altzone: if dst_in_effect { dst_offset_west } else { None },
        }
    }
}

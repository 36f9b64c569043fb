//! Metadata view of a card, as sent in the JSON part of an upload.
//!
//! Values are kept in a small tree of their own rather than `serde_json::Value`
//! because JSON has no representation for NaN or infinities, and those must be
//! visible to the encoder so it can drop them.

use super::types::{CellInfo, Contact, GpsFix, ProximityDevice, TimestampRecord};
use std::collections::BTreeMap;

pub type MetaMap = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Map(MetaMap),
}

impl MetaValue {
    /// Convert to JSON. Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Int(i) => Value::from(*i),
            MetaValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetaValue::Text(s) => Value::String(s.clone()),
            MetaValue::List(items) => Value::Array(items.iter().map(MetaValue::to_json).collect()),
            MetaValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn as_map(&self) -> Option<&MetaMap> {
        match self {
            MetaValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        MetaValue::Float(f)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

impl From<u32> for MetaValue {
    fn from(i: u32) -> Self {
        MetaValue::Int(i64::from(i))
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<MetaMap> for MetaValue {
    fn from(m: MetaMap) -> Self {
        MetaValue::Map(m)
    }
}

impl From<&Contact> for MetaValue {
    fn from(c: &Contact) -> Self {
        MetaValue::Map(
            c.iter()
                .map(|(k, v)| (k.clone(), MetaValue::from(v.as_str())))
                .collect(),
        )
    }
}

impl From<&CellInfo> for MetaValue {
    fn from(cell: &CellInfo) -> Self {
        let mut m = MetaMap::new();
        m.insert("country code".to_string(), cell.country_code.into());
        m.insert("network code".to_string(), cell.network_code.into());
        m.insert("area code".to_string(), cell.area_code.into());
        m.insert("cell id".to_string(), cell.cell_id.into());
        MetaValue::Map(m)
    }
}

impl From<&ProximityDevice> for MetaValue {
    fn from(d: &ProximityDevice) -> Self {
        let mut m = MetaMap::new();
        m.insert("mac".to_string(), d.address.as_str().into());
        m.insert("name".to_string(), d.name.as_str().into());
        MetaValue::Map(m)
    }
}

impl From<&GpsFix> for MetaValue {
    fn from(fix: &GpsFix) -> Self {
        let p = &fix.position;
        let mut position = MetaMap::new();
        position.insert("latitude".to_string(), p.latitude.into());
        position.insert("longitude".to_string(), p.longitude.into());
        position.insert("altitude".to_string(), p.altitude.into());
        position.insert("horizontal_accuracy".to_string(), p.horizontal_accuracy.into());
        position.insert("vertical_accuracy".to_string(), p.vertical_accuracy.into());

        let mut m = MetaMap::new();
        m.insert("position".to_string(), position.into());
        if let Some(c) = &fix.course {
            let mut course = MetaMap::new();
            course.insert("speed".to_string(), c.speed.into());
            course.insert("heading".to_string(), c.heading.into());
            course.insert("speed_accuracy".to_string(), c.speed_accuracy.into());
            course.insert("heading_accuracy".to_string(), c.heading_accuracy.into());
            m.insert("course".to_string(), course.into());
        }
        MetaValue::Map(m)
    }
}

impl From<&TimestampRecord> for MetaValue {
    fn from(t: &TimestampRecord) -> Self {
        let mut m = MetaMap::new();
        m.insert("time".to_string(), t.time.into());
        m.insert("timezone".to_string(), i64::from(t.timezone).into());
        m.insert("daylight".to_string(), t.daylight.into());
        if let Some(alt) = t.altzone {
            m.insert("altzone".to_string(), i64::from(alt).into());
        }
        MetaValue::Map(m)
    }
}

/// Read-only metadata assembled by `ContextSnapshot::prepare_for_sending`
#[derive(Debug, Clone, PartialEq)]
pub struct CardMetadata(MetaMap);

impl CardMetadata {
    pub fn new(map: MetaMap) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &MetaMap {
        &self.0
    }
}

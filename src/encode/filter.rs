//! Removal of non-finite numbers from metadata before JSON serialization.

use crate::card::{MetaMap, MetaValue};

fn is_non_finite(value: &MetaValue) -> bool {
    matches!(value, MetaValue::Float(f) if !f.is_finite())
}

fn filter_value(value: &MetaValue) -> MetaValue {
    match value {
        MetaValue::Map(map) => MetaValue::Map(filter_non_finite(map)),
        MetaValue::List(items) => MetaValue::List(
            items
                .iter()
                .filter(|v| !is_non_finite(v))
                .map(filter_value)
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Copy of `map` with every NaN or infinite leaf dropped, at any depth.
pub fn filter_non_finite(map: &MetaMap) -> MetaMap {
    map.iter()
        .filter(|(_, v)| !is_non_finite(v))
        .map(|(k, v)| (k.clone(), filter_value(v)))
        .collect()
}

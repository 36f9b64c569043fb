//! Property-based tests for the multipart encoder

use cardpost::card::{
    Attachment, CardDefaults, ContextSnapshot, MetaMap, MetaValue,
};
use cardpost::clock::FixedClock;
use cardpost::encode::{encode_filename, filter_non_finite, MultipartEncoder, BOUNDARY};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

fn card(mood: &str, attachment: Option<Attachment>) -> ContextSnapshot {
    let at = Utc.with_ymd_and_hms(2010, 5, 4, 9, 30, 0).unwrap();
    let mut card = ContextSnapshot::new(&CardDefaults::default(), Arc::new(FixedClock::new(at)));
    card.set_mood(mood);
    card.set_attachment(attachment);
    card
}

fn meta_value() -> impl Strategy<Value = MetaValue> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(MetaValue::Bool),
        any::<i64>().prop_map(MetaValue::Int),
        any::<f64>().prop_map(MetaValue::Float),
        Just(MetaValue::Float(f64::NAN)),
        Just(MetaValue::Float(f64::INFINITY)),
        "[a-z]{0,8}".prop_map(MetaValue::Text),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(MetaValue::List),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(MetaValue::Map),
        ]
    })
}

fn all_finite(value: &MetaValue) -> bool {
    match value {
        MetaValue::Float(f) => f.is_finite(),
        MetaValue::List(items) => items.iter().all(all_finite),
        MetaValue::Map(map) => map.values().all(all_finite),
        _ => true,
    }
}

fn count_finite_floats(value: &MetaValue) -> usize {
    match value {
        MetaValue::Float(f) if f.is_finite() => 1,
        MetaValue::List(items) => items.iter().map(count_finite_floats).sum(),
        MetaValue::Map(map) => map.values().map(count_finite_floats).sum(),
        _ => 0,
    }
}

proptest! {
    #[test]
    fn filtered_metadata_has_only_finite_numbers(
        map in prop::collection::btree_map("[a-z]{1,4}", meta_value(), 0..6)
    ) {
        let map: MetaMap = map;
        let filtered = filter_non_finite(&map);
        let original = MetaValue::Map(map);
        let filtered = MetaValue::Map(filtered);
        prop_assert!(all_finite(&filtered));
        prop_assert_eq!(count_finite_floats(&filtered), count_finite_floats(&original));
    }

    #[test]
    fn encoding_is_deterministic(
        mood in "\\PC{0,40}",
        data in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let attachment = Attachment { name: "data.bin".to_string(), data };
        let encoder = MultipartEncoder::default();
        let first = encoder.encode_card(&card(&mood, Some(attachment.clone()))).unwrap();
        let second = encoder.encode_card(&card(&mood, Some(attachment))).unwrap();
        prop_assert_eq!(&first, &second);

        let split = first.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let head = String::from_utf8_lossy(&first[..split]).to_string();
        let content_length = format!("Content-Length: {}\r\n", first.len() - split);
        prop_assert!(head.contains(&content_length));
        let closing = format!("\r\n--{}--\r\n", BOUNDARY);
        prop_assert!(first.ends_with(closing.as_bytes()));
    }

    #[test]
    fn filenames_never_contain_raw_quotes_inside(name in "\\PC{1,20}") {
        let encoded = encode_filename(&name);
        prop_assert!(encoded.is_ascii());
        if encoded.starts_with('"') {
            let inner = &encoded[1..encoded.len() - 1];
            prop_assert!(!inner.contains('"'));
        } else {
            prop_assert!(encoded.starts_with("=?UTF-8?Q?"));
            prop_assert!(!encoded.contains(' '));
        }
    }
}

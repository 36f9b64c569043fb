//! Wall clock used for card timestamps and stored-card file names.

use chrono::{DateTime, Datelike, Local, Offset, TimeZone, Utc};

/// Time zone facts at a given instant, in seconds west of UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneInfo {
    /// Standard (non-DST) offset, seconds west of UTC
    pub offset_west: i32,
    /// Whether daylight saving time is in effect at the instant
    pub dst_in_effect: bool,
    /// DST offset in seconds west of UTC, present only while DST is in effect
    pub dst_offset_west: Option<i32>,
}

impl ZoneInfo {
    pub const UTC: ZoneInfo = ZoneInfo {
        offset_west: 0,
        dst_in_effect: false,
        dst_offset_west: None,
    };
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn zone_at(&self, at: DateTime<Utc>) -> ZoneInfo;
}

/// Clock backed by the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone_at(&self, at: DateTime<Utc>) -> ZoneInfo {
        let east_at = |utc: DateTime<Utc>| -> i32 {
            Local
                .offset_from_utc_datetime(&utc.naive_utc())
                .fix()
                .local_minus_utc()
        };
        let current = east_at(at);
        let year = at.year();
        // Standard time is the smaller of the winter and summer offsets,
        // which holds on both hemispheres.
        let january = Utc
            .with_ymd_and_hms(year, 1, 1, 12, 0, 0)
            .single()
            .map(east_at)
            .unwrap_or(current);
        let july = Utc
            .with_ymd_and_hms(year, 7, 1, 12, 0, 0)
            .single()
            .map(east_at)
            .unwrap_or(current);
        let standard = january.min(july);
        let dst_in_effect = january != july && current != standard;

        ZoneInfo {
            offset_west: -standard,
            dst_in_effect,
            dst_offset_west: dst_in_effect.then_some(-current),
        }
    }
}

/// Clock frozen at one instant. Used to make encoded output reproducible.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub at: DateTime<Utc>,
    pub zone: ZoneInfo,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            zone: ZoneInfo::UTC,
        }
    }

    pub fn with_zone(mut self, zone: ZoneInfo) -> Self {
        self.zone = zone;
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn zone_at(&self, _at: DateTime<Utc>) -> ZoneInfo {
        self.zone
    }
}

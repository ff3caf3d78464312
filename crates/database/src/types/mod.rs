//! Shared result types and helpers for the database layer

pub mod errors;

use chrono::{DateTime, SecondsFormat, Utc};
use cuid2::CuidConstructor;
use once_cell::sync::Lazy;

pub use errors::DatabaseError;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

/// Opaque identifier for new rows.
pub fn new_id() -> String {
    CUID.create_id()
}

/// Timestamps are stored as fixed-width RFC 3339 strings so they sort lexically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip_with_millisecond_precision() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        let raw = timestamp(at);
        assert_eq!(raw, "2025-03-01T12:30:00.000Z");
        assert_eq!(parse_timestamp(&raw), Some(at));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}

//! Remote timestamp normalization
//!
//! The service reports last-modified values in more than one layout depending
//! on the endpoint that produced them (listing XML, response headers, JSON).
//! All of them are normalized to a [`Timestamp`] so they compare against local
//! file modification times.

use std::time::SystemTime;

use jiff::civil::DateTime;
use jiff::fmt::{rfc2822, strtime};
use jiff::tz::TimeZone;
use jiff::Timestamp;

/// Layouts tried with `strtime` after the structured parsers fail.
/// Values without an explicit zone are taken as UTC.
const FALLBACK_LAYOUTS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
    "%Y%m%dT%H%M%SZ",
];

/// Parse a remote last-modified value.
///
/// Returns `None` when no known layout matches.
pub fn parse_remote_time(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // RFC 3339 / ISO 8601 with an offset or `Z`
    if let Ok(ts) = value.parse::<Timestamp>() {
        return Some(ts);
    }

    // ISO 8601 without an offset, with `T` or space separator
    if let Ok(dt) = value.parse::<DateTime>() {
        return utc(dt);
    }

    // RFC 2822 / RFC 1123 with a numeric offset or obsolete zone name
    if let Ok(zoned) = rfc2822::parse(value) {
        return Some(zoned.timestamp());
    }

    FALLBACK_LAYOUTS.iter().find_map(|layout| {
        strtime::parse(*layout, value)
            .ok()
            .and_then(|tm| tm.to_datetime().ok())
            .and_then(utc)
    })
}

/// Like [`parse_remote_time`], falling back to the earliest representable
/// instant so an unparseable destination never looks up to date.
pub fn remote_time_or_min(value: Option<&str>) -> Timestamp {
    value.and_then(parse_remote_time).unwrap_or(Timestamp::MIN)
}

/// Convert a filesystem time, clamping values outside jiff's range
pub fn from_system_time(time: SystemTime) -> Timestamp {
    Timestamp::try_from(time).unwrap_or(Timestamp::MIN)
}

fn utc(dt: DateTime) -> Option<Timestamp> {
    dt.to_zoned(TimeZone::UTC).ok().map(|z| z.timestamp())
}

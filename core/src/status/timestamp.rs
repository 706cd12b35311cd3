//! Timestamp parsing for status-log fields.
//!
//! The daemon's timestamp layout depends on its version and build options,
//! so a field is matched against a fixed list of candidate formats in
//! priority order. Zone-less formats are read as host-local time.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Zone-less date-time layouts, tried in order.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Layouts tried after RFC 3339, in order.
const LOCAL_FORMATS_AFTER_RFC3339: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// ctime without its weekday: "Jun  8 08:12:15 2023".
const CTIME_FORMAT: &str = "%b %e %H:%M:%S %Y";

const WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Integers above this magnitude are epoch milliseconds, below it seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// The timestamp used for empty or unparsable fields.
pub fn zero_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse a status-log timestamp field.
///
/// Empty input yields [`zero_timestamp`] silently. Input matching none of
/// the known layouts also yields [`zero_timestamp`], with a warning.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let s = raw.trim();
    if s.is_empty() {
        return zero_timestamp();
    }

    match try_parse_timestamp(s) {
        Some(ts) => ts,
        None => {
            warn!("Failed to parse timestamp {:?}", s);
            zero_timestamp()
        }
    }
}

/// Try every known layout in priority order. `s` must already be trimmed.
pub fn try_parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Some(ts) = first_local_match(s, LOCAL_FORMATS) {
        return Some(ts);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Some(ts) = first_local_match(s, LOCAL_FORMATS_AFTER_RFC3339) {
        return Some(ts);
    }

    if let Some(ts) = first_local_match(strip_weekday(s), &[CTIME_FORMAT]) {
        return Some(ts);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0).and_then(|n| local_to_utc(&n)) {
            return Some(ts);
        }
    }

    parse_epoch(s)
}

/// Drop a leading weekday name. Its value is not checked against the date.
fn strip_weekday(s: &str) -> &str {
    match s.split_once(' ') {
        Some((head, rest)) if WEEKDAYS.iter().any(|d| d.eq_ignore_ascii_case(head)) => {
            rest.trim_start()
        }
        _ => s,
    }
}

fn first_local_match(s: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .and_then(|naive| local_to_utc(&naive))
    })
}

/// Resolve a wall-clock time in the host zone. Times that fall into a DST
/// gap do not exist locally and are rejected; ambiguous times take the
/// earlier instant.
fn local_to_utc(naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    let value: i64 = s.parse().ok()?;
    if value.unsigned_abs() > EPOCH_MILLIS_THRESHOLD as u64 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

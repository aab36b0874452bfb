use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Twitter's legacy `created_at` layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse an upstream timestamp into UTC.
///
/// Accepts RFC 3339 (any offset), naive ISO datetimes (taken as UTC),
/// Twitter's `created_at` layout and epoch seconds or milliseconds, as
/// numbers or numeric strings.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s.trim()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => from_epoch(i),
            None => n.as_f64().and_then(|f| from_epoch(f as i64)),
        },
        _ => None,
    }
}

/// First parseable timestamp among `keys`, in order.
pub fn timestamp_of(record: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(parse_timestamp)
}

/// A post is kept when it was created at or after `since`.
pub fn is_since(created_at: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    created_at >= since
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(s, TWITTER_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    if value >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

//! date and value formatting for view models.
//!
//! timestamps on the wire are unix seconds. the view shows them in local
//! time, and notifications also get a humanized "how long ago".

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};

/// current unix time in seconds
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// local RFC 3339 with seconds, empty when unknown
pub fn format_date(ts: Option<i64>) -> String {
    ts.and_then(to_local)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_default()
}

fn to_local(ts: i64) -> Option<DateTime<Local>> {
    Local.timestamp_opt(ts, 0).single()
}

/// value followed by its unit, or the infinity sign when unset
pub fn format_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{}{}", v, unit),
        None => "∞".to_string(),
    }
}

/// relative time of `ts` as seen from `now` (both unix seconds)
///
/// buckets: a few seconds, a minute, minutes, an hour, hours, a day, days,
/// a month, months, a year, years.
pub fn time_ago(ts: i64, now: i64) -> String {
    let delta = now - ts;
    let phrase = humanize(delta.unsigned_abs());
    if delta >= 0 {
        format!("{} ago", phrase)
    } else {
        format!("in {}", phrase)
    }
}

fn humanize(secs: u64) -> String {
    let secs = secs as f64;
    let minutes = (secs / 60.0).round();
    let hours = (secs / 3600.0).round();
    let days = (secs / 86_400.0).round();
    let months = (secs / (86_400.0 * 30.4375)).round();
    let years = (secs / (86_400.0 * 365.25)).round();

    if secs < 45.0 {
        "a few seconds".to_string()
    } else if secs < 90.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", minutes)
    } else if minutes < 90.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", hours)
    } else if hours < 36.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", days)
    } else if days < 45.0 {
        "a month".to_string()
    } else if days < 320.0 {
        format!("{} months", months.max(2.0))
    } else if days < 548.0 {
        "a year".to_string()
    } else {
        format!("{} years", years.max(2.0))
    }
}

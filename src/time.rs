//! Wall-clock normalization for task schedules and response timestamps.
//!
//! Execution times are stored as bare `HH:MM` strings and re-anchored to the
//! current local day every time they are evaluated, so one dataset can serve
//! a recurring daily task list. Response timestamps are written in a fixed
//! local format and read back leniently.
//!
//! Every display helper here fails soft: unparseable input is echoed back
//! unchanged rather than reported, because formatting must never block a
//! notification.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

/// Format used when persisting `Response Time` cells.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Locale format produced by older datasets (`10/19/2026, 3:04:05 PM`).
const LEGACY_TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %I:%M:%S %p";

/// Anything that can be rendered by [`format_display`] / [`format_24h`].
#[derive(Debug, Clone, Copy)]
pub enum TimeInput<'a> {
    /// A raw cell: `HH:MM` or a full timestamp.
    Text(&'a str),
    /// An already-resolved instant.
    Instant(DateTime<Local>),
}

impl<'a> From<&'a str> for TimeInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for TimeInput<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl From<DateTime<Local>> for TimeInput<'_> {
    fn from(value: DateTime<Local>) -> Self {
        Self::Instant(value)
    }
}

/// Parse `HH:MM` (an optional `:SS` suffix is accepted and dropped).
///
/// Returns `None` for empty, non-numeric or out-of-range components.
#[must_use]
pub fn parse_time_of_day(time_of_day: &str) -> Option<NaiveTime> {
    let trimmed = time_of_day.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let hour = parse_component(parts[0])?;
    let minute = parse_component(parts[1])?;
    if let Some(seconds) = parts.get(2) {
        parse_component(seconds)?;
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_component(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Anchor a time-of-day to a specific local calendar day.
///
/// Returns `None` when the input does not parse or the wall-clock time does
/// not exist on that day (DST gap).
#[must_use]
pub fn to_instant_on(time_of_day: &str, day: NaiveDate) -> Option<DateTime<Local>> {
    let time = parse_time_of_day(time_of_day)?;
    Local.from_local_datetime(&day.and_time(time)).earliest()
}

/// Anchor a time-of-day to today (local time), seconds zeroed.
#[must_use]
pub fn to_today_instant(time_of_day: &str) -> Option<DateTime<Local>> {
    to_instant_on(time_of_day, Local::now().date_naive())
}

/// Render an instant in the persisted `Response Time` format.
#[must_use]
pub fn format_timestamp(instant: DateTime<Local>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp.
///
/// Accepts the current format, RFC 3339, and the legacy locale format.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Local));
    }

    [TIMESTAMP_FORMAT, LEGACY_TIMESTAMP_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

/// Minutes elapsed between a persisted timestamp and `now`.
///
/// Fractional minutes are kept so callers can apply strict comparisons.
#[must_use]
pub fn minutes_since(raw: &str, now: DateTime<Local>) -> Option<f64> {
    let then = parse_timestamp(raw)?;
    let elapsed = now.signed_duration_since(then);
    Some(elapsed.num_milliseconds() as f64 / 60_000.0)
}

/// 12-hour display (`3:05 PM`). Unparseable input is returned unchanged.
#[must_use]
pub fn format_display<'a>(input: impl Into<TimeInput<'a>>) -> String {
    render(input.into(), "%-I:%M %p")
}

/// 24-hour display (`15:05`). Unparseable input is returned unchanged.
#[must_use]
pub fn format_24h<'a>(input: impl Into<TimeInput<'a>>) -> String {
    render(input.into(), "%H:%M")
}

fn render(input: TimeInput<'_>, format: &str) -> String {
    match input {
        TimeInput::Instant(instant) => instant.format(format).to_string(),
        TimeInput::Text(raw) => {
            if raw.trim().is_empty() {
                return String::new();
            }
            if !raw.contains(':') {
                return raw.to_owned();
            }
            let resolved = if raw.split(':').count() == 2 {
                to_today_instant(raw)
            } else {
                parse_timestamp(raw)
            };
            match resolved {
                Some(instant) => instant.format(format).to_string(),
                None => raw.to_owned(),
            }
        }
    }
}

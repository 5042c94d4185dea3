// Provider timestamp handling. Every backend encodes times its own way; all of
// them are resolved here to an absolute instant before leaving an adapter.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

// Offset-carrying layout without a colon, e.g. 2025-12-15T07:15:00+0700
const OFFSET_NO_COLON: &str = "%Y-%m-%dT%H:%M:%S%z";
// Offset-less local time, only meaningful together with a zone name
const LOCAL_NAIVE: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeFormatError {
    #[error("unable to parse time: {0}")]
    Unparseable(String),

    #[error("time {0} carries no offset and no timezone was supplied")]
    MissingTimezone(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("local time {time} does not exist in {timezone}")]
    NonexistentLocalTime { time: String, timezone: String },
}

/// Resolve a provider timestamp to an absolute instant.
///
/// Formats are tried in order: RFC 3339, `+hhmm` offset without a colon, and
/// finally an offset-less local time which requires `timezone` (an IANA name
/// such as `Asia/Jakarta`). The zone is ignored when the string carries its
/// own offset.
pub fn parse_provider_time(
    raw: &str,
    timezone: Option<&str>,
) -> Result<DateTime<FixedOffset>, TimeFormatError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }

    if let Ok(dt) = DateTime::parse_from_str(raw, OFFSET_NO_COLON) {
        return Ok(dt);
    }

    let naive = NaiveDateTime::parse_from_str(raw, LOCAL_NAIVE)
        .map_err(|_| TimeFormatError::Unparseable(raw.to_string()))?;

    let tz_name = match timezone.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(TimeFormatError::MissingTimezone(raw.to_string())),
    };

    let tz: Tz = tz_name
        .parse()
        .map_err(|_| TimeFormatError::UnknownTimezone(tz_name.to_string()))?;

    // DST folds resolve to the earlier instant; gaps are rejected
    let local = tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
        TimeFormatError::NonexistentLocalTime {
            time: raw.to_string(),
            timezone: tz_name.to_string(),
        }
    })?;

    Ok(local.with_timezone(&local.offset().fix()))
}

// Render minutes as "1h 40m"
pub fn format_minutes(total_minutes: u32) -> String {
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}

/// Parse a human travel time such as `"1h 45m"`, `"2h"`, `"50m"` or `"1h45m"`.
pub fn parse_travel_time(input: &str) -> Option<u32> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let mut total = 0u32;
    let mut digits = String::new();
    let mut saw_unit = false;

    for c in compact.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'h' | 'H' | 'm' | 'M' => {
                let value: u32 = digits.parse().ok()?;
                digits.clear();
                total = if c.eq_ignore_ascii_case(&'h') {
                    total.checked_add(value.checked_mul(60)?)?
                } else {
                    total.checked_add(value)?
                };
                saw_unit = true;
            }
            _ => return None,
        }
    }

    // Trailing digits without a unit are ambiguous
    if !digits.is_empty() || !saw_unit {
        return None;
    }

    Some(total)
}

// Serde helper for "HH:MM" time-of-day fields
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

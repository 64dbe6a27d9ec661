//! Timestamp normalization
//!
//! Consumption readings arrive in local civil time (usually with an offset
//! suffix), prices arrive in UTC. Both are folded into a `NormalizedKey`, the
//! only join key the reconciliation uses: `YYYY-MM-DDTHH:MM:SSZ`, second
//! precision, always UTC. Everything here is pure and free of I/O.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Datelike, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Offset-annotated layouts tried after RFC 3339
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
];

/// Layouts without an offset, resolved in the hinted zone
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Zone an offset-less timestamp should be read in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceZone {
    /// Price feeds: wall time is UTC
    Utc,
    /// Meter readings: wall time is local civil time
    Local(Tz),
}

/// Canonical UTC instant used to join consumption with prices
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Build the key for an instant, dropping sub-second precision
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let truncated = instant.with_nanosecond(0).unwrap_or(instant);
        Self(truncated.format(KEY_FORMAT).to_string())
    }

    /// Key of the hour containing `instant`
    pub fn hour_of(instant: DateTime<Utc>) -> Self {
        let hour = instant
            .with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_minute(0))
            .unwrap_or(instant);
        Self::from_instant(hour)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant this key denotes
    pub fn instant(&self) -> DateTime<Utc> {
        // Keys are only constructed from valid instants
        NaiveDateTime::parse_from_str(&self.0, KEY_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    /// UTC calendar month, `YYYY-MM`
    pub fn month_key(&self) -> String {
        let instant = self.instant();
        format!("{:04}-{:02}", instant.year(), instant.month())
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<NormalizedKey> for String {
    fn from(key: NormalizedKey) -> Self {
        key.0
    }
}

impl TryFrom<String> for NormalizedKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        let key = normalize(&value, SourceZone::Utc)?;
        if key.0 != value {
            return Err(LedgerError::malformed_timestamp(
                value,
                "not in canonical YYYY-MM-DDTHH:MM:SSZ form",
            ));
        }
        Ok(key)
    }
}

/// Resolve `timestamp` to its canonical UTC key.
///
/// An explicit offset in the input always wins over `zone`. Offset-less input
/// is read as wall time in `zone`; a wall time that does not exist there (DST
/// spring-forward gap) is malformed, an ambiguous one (fall-back overlap)
/// resolves to the earlier instant.
pub fn normalize(timestamp: &str, zone: SourceZone) -> Result<NormalizedKey> {
    let input = timestamp.trim();
    if input.is_empty() {
        return Err(LedgerError::malformed_timestamp(timestamp, "empty timestamp"));
    }

    if let Some(instant) = parse_with_offset(input) {
        return Ok(NormalizedKey::from_instant(instant.with_timezone(&Utc)));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| LedgerError::malformed_timestamp(timestamp, "unrecognized format"))?;

    let instant = match zone {
        SourceZone::Utc => naive.and_utc(),
        SourceZone::Local(tz) => resolve_local(tz, naive)
            .ok_or_else(|| {
                LedgerError::malformed_timestamp(
                    timestamp,
                    format!("wall time does not exist in {}", tz.name()),
                )
            })?
            .with_timezone(&Utc),
    };

    Ok(NormalizedKey::from_instant(instant))
}

fn parse_with_offset(input: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(input).ok().or_else(|| {
        OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(input, fmt).ok())
    })
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => None,
    }
}

//! Timeline cursor parsing and formatting
//!
//! The timeline endpoint accepts a `since` lower bound in MySQL timestamp
//! format (`YYYY-MM-DD HH:MM:SS`, UTC). A [`Cursor`] wraps that position and
//! is the only thing the paginator needs to resume a walk.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire format of cursors and record ordering keys
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-only format accepted for user supplied start cursors
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resumable position in the timeline, at one-second resolution
///
/// # Examples
///
/// ```
/// use osu_data_downloader::cursor::Cursor;
///
/// let cursor = Cursor::parse("2020-01-01 10:00:00").unwrap();
/// assert_eq!(cursor.step_back().to_string(), "2020-01-01 09:59:59");
///
/// let start = Cursor::parse("2007-10-07").unwrap();
/// assert_eq!(start.to_string(), "2007-10-07 00:00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(NaiveDateTime);

impl Cursor {
    /// Parse a cursor from `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`
    ///
    /// Date-only input resolves to the start of that day.
    pub fn parse(s: &str) -> Result<Self, CursorError> {
        let s = s.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
            return Ok(Self(dt));
        }

        let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map_err(|e| CursorError::InvalidFormat(format!("'{s}': {e}")))?;
        date.and_hms_opt(0, 0, 0)
            .map(Self)
            .ok_or_else(|| CursorError::InvalidFormat(format!("'{s}': no midnight")))
    }

    /// Parse a record's ordering key, which must carry a full timestamp
    pub fn from_ordering_key(s: &str) -> Result<Self, CursorError> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|e| CursorError::InvalidOrderingKey(format!("'{s}': {e}")))
    }

    /// One time unit earlier, used to re-include a boundary group
    pub fn step_back(&self) -> Self {
        Self(self.0 - Duration::seconds(1))
    }
}

impl From<NaiveDateTime> for Cursor {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cursor::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Cursor parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    /// Input is neither a timestamp nor a date
    #[error("invalid cursor format: {0}")]
    InvalidFormat(String),

    /// A record's ordering key could not be read as a timestamp
    #[error("invalid ordering key: {0}")]
    InvalidOrderingKey(String),

    /// A record has no ordering key field
    #[error("record has no '{0}' field")]
    MissingOrderingKey(String),
}

//! Event timestamp resolution
//!
//! A record's time comes from its configured time field, parsed with an
//! ordered list of `chrono` formats. Records without a usable time fall back
//! to a per-file default derived from the input filename.

use crate::error::{FilenameError, RecordError};
use crate::types::Record;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Format of the timestamp token embedded in input filenames, e.g. `20240101T120000`
pub const FILENAME_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

const FILENAME_TIME_LEN: usize = "20060102T150405".len();

/// Outcome of resolving a record's timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub timestamp: DateTime<Utc>,
    /// True when the timestamp came from the record itself
    pub from_record: bool,
    /// Set when the time field was present but matched no format
    pub error: Option<RecordError>,
}

/// Parse `text` with a single strftime format
///
/// The format is tried as an offset-aware date-time, then a naive
/// date-time (taken as UTC), then a bare date at midnight UTC.
pub fn parse_with_format(text: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Resolve the event time of `record`
///
/// Formats are attempted in order and the first success wins. If the field
/// is text but no format matches, the fallback is used and the failure is
/// reported in [`Resolved::error`]. A missing or non-text field uses the
/// fallback without reporting anything.
pub fn resolve(
    record: &Record,
    time_field: &str,
    formats: &[String],
    fallback: DateTime<Utc>,
) -> Resolved {
    let Some(text) = record.text(time_field) else {
        return Resolved {
            timestamp: fallback,
            from_record: false,
            error: None,
        };
    };

    match formats.iter().find_map(|format| parse_with_format(text, format)) {
        Some(timestamp) => Resolved {
            timestamp,
            from_record: true,
            error: None,
        },
        None => Resolved {
            timestamp: fallback,
            from_record: false,
            error: Some(RecordError::UnparsableTime {
                field: time_field.to_string(),
                value: text.to_string(),
            }),
        },
    }
}

// 20060102T150405
static COMPACT_TIMESTAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}T\d{6}$").unwrap());

/// Default timestamp for records in the file named `file_name`
///
/// Every `Z-` is considered and the first one preceded by a parsable
/// compact timestamp wins. If only malformed tokens are found (e.g. month
/// 13) the record time falls back to `run_start`; if no `Z-` has a token
/// in front of it at all, the filename breaks the contract.
pub fn default_from_filename(
    file_name: &str,
    run_start: DateTime<Utc>,
) -> Result<DateTime<Utc>, FilenameError> {
    let tokens = file_name.match_indices("Z-").filter_map(|(end, _)| {
        let start = end.checked_sub(FILENAME_TIME_LEN)?;
        file_name.get(start..end).filter(|token| COMPACT_TIMESTAMP.is_match(token))
    });

    let mut malformed = None;
    for token in tokens {
        match NaiveDateTime::parse_from_str(token, FILENAME_TIME_FORMAT) {
            Ok(naive) => return Ok(Utc.from_utc_datetime(&naive)),
            Err(err) => {
                malformed.get_or_insert((token, err));
            }
        }
    }

    match malformed {
        Some((token, err)) => {
            log::warn!("couldn't parse filename timestamp {token:?} in {file_name:?}: {err}; using run start");
            Ok(run_start)
        }
        None => Err(FilenameError::MissingTimestamp {
            file: file_name.to_string(),
        }),
    }
}

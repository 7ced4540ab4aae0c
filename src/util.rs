//! Small helpers shared by every component that reads/writes timestamp and
//! confidence columns the same way (spec §4.3 "All times stored as
//! ISO-8601 extended strings"; I2/P7 confidence bounds).

use chrono::{DateTime, Utc};

use crate::error::Error;

/// Parses an ISO-8601 timestamp column, raising `DataCorruption` on
/// failure rather than panicking (spec §4.3).
pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DataCorruption(format!("{field}: unparseable timestamp {raw:?}: {e}")))
}

/// Validates a confidence value lies in `[0, 1]` (I2/P7).
pub(crate) fn check_confidence(confidence: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(Error::ConstraintViolation(format!(
            "confidence {confidence} out of [0,1]"
        )))
    }
}

/// Escapes `%`, `_`, and the escape character for a `LIKE ... ESCAPE '\'`
/// predicate, so a caller-supplied substring can't smuggle in wildcard
/// behavior.
pub(crate) fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

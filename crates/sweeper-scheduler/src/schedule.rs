use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// On-disk layout of `lastExecutionTime`, e.g. `2017/09/01 03:45 PM`.
pub const EXECUTION_TIME_FORMAT: &str = "%Y/%m/%d %I:%M %p";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("empty execution time")]
    Empty,

    #[error("malformed execution time {value:?}: {source}")]
    Malformed {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The wall-clock time falls in a DST gap of the configured zone.
    #[error("execution time {value:?} does not exist in {zone}")]
    Nonexistent { value: String, zone: Tz },
}

/// Decide whether a descriptor is due at `now`.
///
/// A descriptor that has never run is always due. Otherwise the absolute
/// distance between `now` and the last run, in whole minutes, must strictly
/// exceed the interval. Clock skew in either direction counts as elapsed time.
pub fn is_due(interval_minutes: u64, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(last_run) = last_run else {
        return true;
    };
    let elapsed_minutes = (now - last_run).num_minutes().unsigned_abs();
    elapsed_minutes > interval_minutes
}

/// Parse a stored `lastExecutionTime` interpreted in `tz`.
///
/// Ambiguous local times (DST fold) resolve to the earlier instant.
pub fn parse_execution_time(value: &str, tz: Tz) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, EXECUTION_TIME_FORMAT).map_err(|source| {
        TimestampError::Malformed {
            value: value.to_string(),
            source,
        }
    })?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TimestampError::Nonexistent {
            value: value.to_string(),
            zone: tz,
        })
}

/// Render `at` as a `lastExecutionTime` value in `tz`.
pub fn format_execution_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format(EXECUTION_TIME_FORMAT).to_string()
}

// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Conversion of naive export timestamps to epoch milliseconds.
//!
//! Telegram writes message dates in the exporting machine's local time with
//! no offset. The offset applied to a timestamp is the one the configured
//! zone reports for that instant read *as UTC*. Inside a DST transition
//! window this can be off by the size of the transition.
//!
//! # Example
//!
//! ```
//! use tg2mm::timestamp::Clock;
//!
//! let clock = Clock::new(chrono_tz::UTC);
//! assert_eq!(clock.epoch_millis("2022-03-15T06:06:11").unwrap(), 1_647_324_371_000);
//! ```

use chrono::{FixedOffset, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use snafu::prelude::*;

/// Error type for timestamp conversion.
#[derive(Debug, Snafu)]
pub enum TimestampError {
    /// The timestamp string is not a valid naive date-time.
    #[snafu(display("malformed timestamp {value:?}: {source}"))]
    Malformed {
        /// The offending value.
        value: String,
        /// The underlying chrono error.
        source: chrono::ParseError,
    },
}

/// Converts naive local timestamps using one configured time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    /// Creates a clock for the given zone.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// The zone this clock resolves offsets in.
    #[must_use]
    pub const fn zone(&self) -> Tz {
        self.tz
    }

    /// Parses `value` and converts it to milliseconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Malformed`] if `value` is not a date-time
    /// such as `2022-03-15T06:06:11`.
    pub fn epoch_millis(&self, value: &str) -> Result<i64, TimestampError> {
        let naive = parse_local(value)?;
        Ok(to_epoch_millis(naive, offset_at(self.tz, naive)))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

/// Parses a naive local timestamp.
///
/// # Errors
///
/// Returns [`TimestampError::Malformed`] for anything chrono cannot read as
/// a `NaiveDateTime`.
pub fn parse_local(value: &str) -> Result<NaiveDateTime, TimestampError> {
    value
        .parse::<NaiveDateTime>()
        .context(MalformedSnafu { value })
}

/// The offset `tz` applies at `naive` interpreted as a UTC instant.
#[must_use]
pub fn offset_at(tz: Tz, naive: NaiveDateTime) -> FixedOffset {
    tz.offset_from_utc_datetime(&naive).fix()
}

/// Reads `naive` as a wall-clock time at `offset` and returns the instant in
/// milliseconds since the Unix epoch.
#[must_use]
pub fn to_epoch_millis(naive: NaiveDateTime, offset: FixedOffset) -> i64 {
    naive.and_utc().timestamp_millis() - i64::from(offset.local_minus_utc()) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    const MORNING: &str = "2022-03-15T06:06:11";

    #[test]
    fn converts_utc_timestamp() {
        assert_eq!(Clock::default().epoch_millis(MORNING).unwrap(), 1_647_324_371_000);
    }

    #[test]
    fn busingen_shifts_by_one_hour() {
        let utc = Clock::new(Tz::UTC).epoch_millis(MORNING).unwrap();
        let busingen = Clock::new(Tz::Europe__Busingen).epoch_millis(MORNING).unwrap();

        assert_eq!(utc - busingen, 3_600_000);
    }

    #[test]
    fn summer_time_uses_summer_offset() {
        let utc = Clock::new(Tz::UTC).epoch_millis("2022-07-01T12:00:00").unwrap();
        let berlin = Clock::new(Tz::Europe__Berlin).epoch_millis("2022-07-01T12:00:00").unwrap();

        assert_eq!(utc - berlin, 7_200_000);
    }

    #[test]
    fn negative_offsets_move_forward() {
        let utc = Clock::new(Tz::UTC).epoch_millis(MORNING).unwrap();
        let new_york = Clock::new(Tz::America__New_York).epoch_millis(MORNING).unwrap();

        // EDT (-4) has been in effect since 2022-03-13
        assert_eq!(new_york - utc, 4 * 3_600_000);
    }

    #[test]
    fn transition_window_uses_offset_read_as_utc() {
        // 02:30 local on the spring-forward day: read as UTC it is already
        // past the 01:00 UTC switch, so CEST (+2) applies.
        let naive = parse_local("2022-03-27T02:30:00").unwrap();
        assert_eq!(offset_at(Tz::Europe__Berlin, naive).local_minus_utc(), 7200);

        // 00:30 read as UTC is still before the switch: CET (+1).
        let naive = parse_local("2022-03-27T00:30:00").unwrap();
        assert_eq!(offset_at(Tz::Europe__Berlin, naive).local_minus_utc(), 3600);
    }

    #[test]
    fn conversion_is_pure() {
        let clock = Clock::new(Tz::Asia__Tokyo);
        let first = clock.epoch_millis(MORNING).unwrap();
        let second = clock.epoch_millis(MORNING).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn accepts_fractional_seconds() {
        assert_eq!(
            Clock::default().epoch_millis("2022-03-15T06:06:11.250").unwrap(),
            1_647_324_371_250
        );
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let err = Clock::default().epoch_millis("15/03/2022 06:06").unwrap_err();
        assert!(err.to_string().contains("15/03/2022 06:06"));
    }

    #[test]
    fn rejects_empty_timestamp() {
        assert!(parse_local("").is_err());
    }

    #[test]
    fn to_epoch_millis_subtracts_offset() {
        let naive = parse_local("1970-01-01T01:00:00").unwrap();
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(to_epoch_millis(naive, plus_one), 0);
    }
}

//! Timestamp normalization.
//!
//! Every message carries its timestamp as signed microseconds since the Unix
//! epoch. Callers may hand us wall-clock instants, numbers in an explicit
//! unit, or bare numbers whose unit has to be guessed.
//!
//! ## Unit detection
//!
//! A bare number is classified by checking, in order, whether it falls
//! between 1971-01-01 and 2100-01-01 when read as seconds, milliseconds,
//! microseconds or nanoseconds. The first unit that fits wins. The four
//! windows do not overlap, so any value inside one of them has exactly one
//! reading. Values outside all four are rejected rather than guessed at.
//! A timestamp that genuinely belongs to a different era (say, nanoseconds
//! in 1970) will be misread or rejected; that is accepted behavior.

use core::fmt;
use core::ops::RangeInclusive;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

const SECS_1971: i64 = 31_536_000;
const SECS_2100: i64 = 4_102_444_800;

/// Errors produced while normalizing a timestamp.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    /// A bare number matched none of the plausible unit windows.
    #[error("Unable to validate timestamp: {0}")]
    Unrecognized(String),

    /// The value is valid but cannot be expressed as i64 microseconds.
    #[error("timestamp {value} ({unit}) does not fit in 64-bit microseconds")]
    Overflow {
        /// The original value, rendered for display.
        value: String,
        /// The unit the value was interpreted in.
        unit: TimeUnit,
    },
}

/// Unit of a numeric timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Seconds since the epoch.
    Seconds,
    /// Milliseconds since the epoch.
    Millis,
    /// Microseconds since the epoch.
    Micros,
    /// Nanoseconds since the epoch.
    Nanos,
}

impl TimeUnit {
    /// Detection order for bare numbers.
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Seconds,
        TimeUnit::Millis,
        TimeUnit::Micros,
        TimeUnit::Nanos,
    ];

    /// How many of this unit make up one second.
    pub const fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Millis => 1_000,
            TimeUnit::Micros => 1_000_000,
            TimeUnit::Nanos => 1_000_000_000,
        }
    }

    /// The window of values that read as 1971..=2100 in this unit.
    pub const fn plausible_range(self) -> RangeInclusive<i64> {
        let scale = self.per_second();
        (SECS_1971 * scale)..=(SECS_2100 * scale)
    }

    /// Guess the unit of a bare integer.
    pub fn detect(value: i64) -> Option<TimeUnit> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.plausible_range().contains(&value))
    }

    /// Guess the unit of a bare float.
    pub fn detect_float(value: f64) -> Option<TimeUnit> {
        Self::ALL.into_iter().find(|unit| {
            let range = unit.plausible_range();
            value >= *range.start() as f64 && value <= *range.end() as f64
        })
    }

    fn to_micros(self, value: i64) -> Option<i64> {
        match self {
            TimeUnit::Seconds => value.checked_mul(1_000_000),
            TimeUnit::Millis => value.checked_mul(1_000),
            TimeUnit::Micros => Some(value),
            TimeUnit::Nanos => Some(value / 1_000),
        }
    }

    fn float_to_micros(self, value: f64) -> i64 {
        let micros = match self {
            TimeUnit::Seconds => value * 1_000_000.0,
            TimeUnit::Millis => value * 1_000.0,
            TimeUnit::Micros => value,
            TimeUnit::Nanos => value / 1_000.0,
        };
        micros as i64
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Millis => "milliseconds",
            TimeUnit::Micros => "microseconds",
            TimeUnit::Nanos => "nanoseconds",
        };
        f.write_str(name)
    }
}

/// A timestamp as supplied by the caller, before normalization.
///
/// Use the explicit-unit variants when the unit is known. `Integer` and
/// `Float` go through unit detection (see the module docs).
///
/// # Example
///
/// ```rust
/// use telltale_types::Timestamp;
///
/// let a = Timestamp::from(1_700_000_000_i64).to_micros().unwrap();
/// let b = Timestamp::Millis(1_700_000_000_000).to_micros().unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Timestamp {
    /// The current wall-clock time.
    #[default]
    Now,
    /// A specific wall-clock instant.
    At(SystemTime),
    /// Seconds since the epoch.
    Secs(i64),
    /// Milliseconds since the epoch.
    Millis(i64),
    /// Microseconds since the epoch.
    Micros(i64),
    /// Nanoseconds since the epoch.
    Nanos(i64),
    /// An integer of unknown unit.
    Integer(i64),
    /// A float of unknown unit.
    Float(f64),
}

impl Timestamp {
    /// Normalize to microseconds since the Unix epoch.
    pub fn to_micros(&self) -> Result<i64, TimestampError> {
        match *self {
            Timestamp::Now => system_time_micros(SystemTime::now()),
            Timestamp::At(instant) => system_time_micros(instant),
            Timestamp::Secs(v) => explicit(v, TimeUnit::Seconds),
            Timestamp::Millis(v) => explicit(v, TimeUnit::Millis),
            Timestamp::Micros(v) => explicit(v, TimeUnit::Micros),
            Timestamp::Nanos(v) => explicit(v, TimeUnit::Nanos),
            Timestamp::Integer(v) => {
                let unit =
                    TimeUnit::detect(v).ok_or_else(|| TimestampError::Unrecognized(v.to_string()))?;
                explicit(v, unit)
            }
            Timestamp::Float(v) => TimeUnit::detect_float(v)
                .map(|unit| unit.float_to_micros(v))
                .ok_or_else(|| TimestampError::Unrecognized(v.to_string())),
        }
    }
}

fn explicit(value: i64, unit: TimeUnit) -> Result<i64, TimestampError> {
    unit.to_micros(value).ok_or_else(|| TimestampError::Overflow {
        value: value.to_string(),
        unit,
    })
}

fn system_time_micros(instant: SystemTime) -> Result<i64, TimestampError> {
    let overflow = |micros: u128| TimestampError::Overflow {
        value: micros.to_string(),
        unit: TimeUnit::Micros,
    };
    match instant.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_micros()).map_err(|_| overflow(since.as_micros())),
        Err(before) => {
            let micros = before.duration().as_micros();
            i64::try_from(micros).map(|m| -m).map_err(|_| overflow(micros))
        }
    }
}

/// Normalize anything convertible to a [`Timestamp`] into epoch microseconds.
pub fn epoch_micros(timestamp: impl Into<Timestamp>) -> Result<i64, TimestampError> {
    timestamp.into().to_micros()
}

/// Current time as epoch microseconds.
pub fn now_micros() -> i64 {
    // Only fails for clocks set past the year 294,000.
    system_time_micros(SystemTime::now()).unwrap_or(i64::MAX)
}

impl From<SystemTime> for Timestamp {
    fn from(instant: SystemTime) -> Self {
        Timestamp::At(instant)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp::Integer(value)
    }
}

impl From<i32> for Timestamp {
    fn from(value: i32) -> Self {
        Timestamp::Integer(value.into())
    }
}

impl From<u32> for Timestamp {
    fn from(value: u32) -> Self {
        Timestamp::Integer(value.into())
    }
}

impl From<f64> for Timestamp {
    fn from(value: f64) -> Self {
        Timestamp::Float(value)
    }
}

impl<T: Into<Timestamp>> From<Option<T>> for Timestamp {
    fn from(value: Option<T>) -> Self {
        value.map_or(Timestamp::Now, Into::into)
    }
}

//! # telltale-types
//!
//! The message vocabulary shared by the telltale client and anything that
//! consumes its output.
//!
//! A [`Message`] is one self-contained JSON object. Its `type` field names
//! the [`Kind`] the downstream router dispatches on; `timestamp` is always
//! microseconds since the Unix epoch; `labels` is a flat string map.
//!
//! ## Timestamps
//!
//! Callers rarely agree on timestamp units. [`Timestamp`] accepts wall-clock
//! instants, explicit units, and bare numbers whose unit is inferred from
//! their magnitude. See the [`timestamp`] module for the detection rules.
//!
//! ## Example
//!
//! ```rust
//! use telltale_types::{epoch_micros, Kind, Message};
//!
//! let micros = epoch_micros(1_700_000_000_i64).unwrap();
//! let message = Message::builder(Kind::Gauge)
//!     .name("queue.depth")
//!     .value(12.0)
//!     .timestamp(micros)
//!     .build();
//!
//! assert_eq!(message.timestamp, 1_700_000_000_000_000);
//! ```

mod interval;
mod message;
pub mod timestamp;

pub use interval::*;
pub use message::*;
pub use timestamp::{epoch_micros, now_micros, TimeUnit, Timestamp, TimestampError};

/// Byte limit for event subjects.
pub const EVENT_SUBJECT_LIMIT: usize = 3_072;

/// Byte limit for event bodies.
pub const EVENT_BODY_LIMIT: usize = 7_168;

/// Byte limit for log subjects.
pub const LOG_SUBJECT_LIMIT: usize = 7_168;

/// Heartbeat name used when the caller does not supply one.
pub const DEFAULT_HEARTBEAT_NAME: &str = "application.heartbeat";

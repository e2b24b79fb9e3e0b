//! # telltale-sdk
//!
//! In-process telemetry client. Application code emits typed messages
//! (marks, counters, gauges, events, logs, heartbeats and registrations);
//! each one is normalized, labeled and handed to a transport. The default
//! transport is one JSON datagram per message to a local collector.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use telltale_sdk::{labels, Client, Timestamp};
//!
//! #[tokio::main]
//! async fn main() -> telltale_sdk::Result<()> {
//!     let client = Client::builder().app_name("billing").build();
//!
//!     // Start the background scheduler and register the process
//!     client.start()?;
//!
//!     client.counter("invoices.sent", Some(3), Timestamp::Now, labels([("region", "eu")]))?;
//!     client.gauge("queue.depth", 42.0, 1_700_000_000_i64, Default::default())?;
//!
//!     // Run something every minute on the background worker
//!     client.every("minute", |client| {
//!         client.mark("still.here", None, Timestamp::Now, Default::default())?;
//!         Ok(())
//!     })?;
//!
//!     // ... your application runs ...
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery
//!
//! Delivery is fire and forget. Transport failures never reach the caller;
//! instead one `log` message describing the failure is sent through the same
//! output. Only input validation errors are returned.
//!
//! ## Features
//!
//! - **Timestamp normalization**: seconds, milliseconds, microseconds or
//!   nanoseconds are detected by magnitude
//! - **Default labels**: `pid`, `tid` and `app` on every message
//! - **Swappable outputs**: UDP, in-memory buffer, or any [`Sink`]
//! - **Background scheduler**: `five_secs`, `minute`, `hour` and `day`
//!   callbacks plus an automatic process heartbeat

mod client;
mod config;
mod emit;
mod error;
mod labels;
mod output;
mod schedule;
mod scheduler;
mod sink;

pub use client::{Client, ClientBuilder, FAILURE_PAYLOAD_LIMIT};
pub use config::{
    ClientConfig, APP_NAME_ENV, DEFAULT_MAX_DATAGRAM_SIZE, DEFAULT_UDP_PORT, ENV_PREFIX,
};
pub use error::{CallbackError, DeliveryError, Error, Result};
pub use labels::{thread_id, AppRegistry, LabelManager};
pub use output::Output;
pub use schedule::{Callback, Interval};
pub use scheduler::PROCESS_HEARTBEAT;
pub use sink::{BufferSink, CallbackSink, Sink, UdpSink};

// Re-export types for convenience
pub use telltale_types::{
    labels, Kind, Labels, Message, PluginInterval, Timestamp, TimestampError, Value,
};

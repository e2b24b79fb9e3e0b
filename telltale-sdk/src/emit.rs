//! One entry point per message kind.
//!
//! Each call validates its input, normalizes the timestamp to epoch
//! microseconds, merges labels and hands exactly one message to the output.
//! Validation failures are returned before anything is sent; delivery
//! failures never are.

use std::time::Duration;

use serde_json::Value as Json;
use telltale_types::{
    truncate_bytes, Kind, Labels, MessageBuilder, PluginInterval, Timestamp,
    DEFAULT_HEARTBEAT_NAME, EVENT_BODY_LIMIT, EVENT_SUBJECT_LIMIT, LOG_SUBJECT_LIMIT,
};

use crate::client::Client;
use crate::error::Result;

impl Client {
    fn prepare(
        &self,
        kind: Kind,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<MessageBuilder> {
        let micros = timestamp.into().to_micros()?;
        Ok(MessageBuilder::new(kind)
            .timestamp(micros)
            .labels(self.labels().merge(labels)))
    }

    fn dispatch(&self, builder: MessageBuilder) -> Result<()> {
        self.send(&builder.build());
        Ok(())
    }

    /// Record that something happened, optionally with a short value.
    pub fn mark(
        &self,
        name: &str,
        value: Option<&str>,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self
            .prepare(Kind::Mark, timestamp, labels)?
            .name(name)
            .maybe_value(value);
        self.dispatch(builder)
    }

    /// Add `increment` (default 1) to a counter.
    pub fn counter(
        &self,
        name: &str,
        increment: Option<i64>,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self
            .prepare(Kind::Counter, timestamp, labels)?
            .name(name)
            .value(increment.unwrap_or(1));
        self.dispatch(builder)
    }

    /// Report an absolute reading.
    pub fn gauge(
        &self,
        name: &str,
        value: f64,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self
            .prepare(Kind::Gauge, timestamp, labels)?
            .name(name)
            .value(value);
        self.dispatch(builder)
    }

    /// Send a high-priority event.
    ///
    /// `subject` is cut to 3072 bytes and `body` to 7168 bytes.
    pub fn event(
        &self,
        name: &str,
        subject: Option<&str>,
        body: Option<&str>,
        attn: &[&str],
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let mut builder = self
            .prepare(Kind::Event, timestamp, labels)?
            .name(name)
            .attn(attn.iter().copied());
        if let Some(subject) = subject {
            builder = builder.subject(truncate_bytes(subject, EVENT_SUBJECT_LIMIT));
        }
        if let Some(body) = body {
            builder = builder.body(truncate_bytes(body, EVENT_BODY_LIMIT));
        }
        self.dispatch(builder)
    }

    /// Send a low-priority log line with structured data.
    ///
    /// `subject` is cut to 7168 bytes. A `null` payload is omitted.
    pub fn log(
        &self,
        subject: &str,
        data: Json,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self
            .prepare(Kind::Log, timestamp, labels)?
            .subject(truncate_bytes(subject, LOG_SUBJECT_LIMIT));
        self.dispatch(with_data(builder, data))
    }

    /// Signal liveness.
    ///
    /// `name` defaults to `application.heartbeat`. `timeout` tells the
    /// collector how long to wait for the next one.
    pub fn heartbeat(
        &self,
        name: Option<&str>,
        value: Option<f64>,
        timeout: Option<Duration>,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let mut builder = self
            .prepare(Kind::Heartbeat, timestamp, labels)?
            .name(name.unwrap_or(DEFAULT_HEARTBEAT_NAME))
            .maybe_value(value);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout.as_secs_f64());
        }
        self.dispatch(builder)
    }

    /// Ask the host agent to run a plugin on a fixed schedule.
    ///
    /// `interval` must be one of `five_minutes`, `thirty_minutes`, `hourly`,
    /// `daily` or `monthly`; anything else is rejected and nothing is sent.
    pub fn register_plugin(
        &self,
        name: &str,
        path: &str,
        args: &[&str],
        interval: &str,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let interval: PluginInterval = interval.parse()?;
        let builder = self
            .prepare(Kind::PluginRegistration, timestamp, labels)?
            .plugin(name, path, args.iter().copied(), interval);
        self.dispatch(builder)
    }

    /// Announce a named service.
    pub fn register_service(&self, name: &str, labels: Labels) -> Result<()> {
        let builder = self
            .prepare(Kind::ServiceRegistration, Timestamp::Now, labels)?
            .name(name);
        self.dispatch(builder)
    }

    /// Announce this process under the resolved application name.
    ///
    /// Renaming the application afterwards logs a warning.
    pub fn register_process(
        &self,
        data: Json,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self
            .prepare(Kind::ProcessRegistration, timestamp, labels)?
            .name(self.app_name());
        self.dispatch(with_data(builder, data))?;
        self.labels().mark_registered();
        Ok(())
    }

    /// Freeform information about this process, titled by `tag`.
    pub fn info_process(
        &self,
        tag: &str,
        data: Json,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        self.info(Kind::ProcessInfo, tag, data, timestamp, labels)
    }

    /// Freeform information about the host agent, titled by `tag`.
    pub fn info_agent(
        &self,
        tag: &str,
        data: Json,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        self.info(Kind::AgentInfo, tag, data, timestamp, labels)
    }

    fn info(
        &self,
        kind: Kind,
        tag: &str,
        data: Json,
        timestamp: impl Into<Timestamp>,
        labels: Labels,
    ) -> Result<()> {
        let builder = self.prepare(kind, timestamp, labels)?.tag(tag);
        self.dispatch(with_data(builder, data))
    }
}

fn with_data(builder: MessageBuilder, data: Json) -> MessageBuilder {
    if data.is_null() {
        builder
    } else {
        builder.data(data)
    }
}

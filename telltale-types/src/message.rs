//! The message model shipped to the local collector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::PluginInterval;

/// Key/value annotations attached to every message.
///
/// A sorted map keeps the serialized form stable.
pub type Labels = BTreeMap<String, String>;

/// Build a [`Labels`] map from pairs.
///
/// ```rust
/// let labels = telltale_types::labels([("region", "us-east"), ("tier", "web")]);
/// assert_eq!(labels["tier"], "web");
/// ```
pub fn labels<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Labels
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Message kind, serialized as the `type` field the router dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Something interesting happened, optionally with a string value.
    #[serde(rename = "mark")]
    Mark,
    /// A delta to add to a counter.
    #[serde(rename = "counter")]
    Counter,
    /// An absolute reading.
    #[serde(rename = "gauge")]
    Gauge,
    /// A high-priority event with subject, body and attention list.
    #[serde(rename = "event")]
    Event,
    /// A low-priority log line.
    #[serde(rename = "log")]
    Log,
    /// A liveness signal.
    #[serde(rename = "hb_process")]
    Heartbeat,
    /// Registration of a plugin the agent should run periodically.
    #[serde(rename = "reg_pluginv1")]
    PluginRegistration,
    /// Registration of a named service.
    #[serde(rename = "reg_service")]
    ServiceRegistration,
    /// Registration of the running process.
    #[serde(rename = "reg_process")]
    ProcessRegistration,
    /// Freeform information about the running process.
    #[serde(rename = "info_process")]
    ProcessInfo,
    /// Freeform information about the host agent.
    #[serde(rename = "info_agent")]
    AgentInfo,
}

impl Kind {
    /// The wire name of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Mark => "mark",
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::Event => "event",
            Kind::Log => "log",
            Kind::Heartbeat => "hb_process",
            Kind::PluginRegistration => "reg_pluginv1",
            Kind::ServiceRegistration => "reg_service",
            Kind::ProcessRegistration => "reg_process",
            Kind::ProcessInfo => "info_process",
            Kind::AgentInfo => "info_agent",
        }
    }
}

/// A metric value. Marks carry text, counters integers, gauges floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One telemetry message.
///
/// Messages are built once, handed to a sink by shared reference and then
/// dropped. Optional fields are omitted from the wire form when unset.
///
/// # Example
///
/// ```rust
/// use telltale_types::{Kind, Message, Value};
///
/// let message = Message::builder(Kind::Counter)
///     .name("requests")
///     .value(1_i64)
///     .timestamp(1_700_000_000_000_000)
///     .label("route", "/orders")
///     .build();
///
/// assert_eq!(message.value, Some(Value::Int(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// What kind of message this is.
    #[serde(rename = "type")]
    pub kind: Kind,

    /// Metric, event or heartbeat name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Reading, increment or mark value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Event or log subject line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Event body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// People, teams or components an event concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attn: Option<Vec<String>>,

    /// Structured payload for logs, registrations and info messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Title of an info message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Seconds until the next heartbeat is expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Plugin name for plugin registrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Plugin executable path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_path: Option<String>,

    /// Plugin arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_args: Option<Vec<String>>,

    /// How often the plugin should run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<PluginInterval>,

    /// Microseconds since the Unix epoch.
    pub timestamp: i64,

    /// Merged default and caller labels.
    #[serde(default)]
    pub labels: Labels,
}

impl Message {
    /// Start building a message of the given kind.
    pub fn builder(kind: Kind) -> MessageBuilder {
        MessageBuilder::new(kind)
    }

    /// Serialize to the compact wire encoding.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Look up a label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Builder for [`Message`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Create a builder with every optional field unset and a zero timestamp.
    pub fn new(kind: Kind) -> Self {
        Self {
            message: Message {
                kind,
                name: None,
                value: None,
                subject: None,
                body: None,
                attn: None,
                data: None,
                tag: None,
                timeout: None,
                plugin: None,
                plugin_path: None,
                plugin_args: None,
                interval: None,
                timestamp: 0,
                labels: Labels::new(),
            },
        }
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.message.name = Some(name.into());
        self
    }

    /// Set the value.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.message.value = Some(value.into());
        self
    }

    /// Set the value if present. `None` leaves any earlier value alone.
    pub fn maybe_value(mut self, value: Option<impl Into<Value>>) -> Self {
        if let Some(value) = value {
            self.message.value = Some(value.into());
        }
        self
    }

    /// Set the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.message.subject = Some(subject.into());
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.message.body = Some(body.into());
        self
    }

    /// Set the attention list.
    pub fn attn<S: Into<String>>(mut self, attn: impl IntoIterator<Item = S>) -> Self {
        self.message.attn = Some(attn.into_iter().map(Into::into).collect());
        self
    }

    /// Set the structured payload.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.message.data = Some(data);
        self
    }

    /// Set the info tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.message.tag = Some(tag.into());
        self
    }

    /// Set the heartbeat timeout in seconds.
    pub fn timeout(mut self, seconds: f64) -> Self {
        self.message.timeout = Some(seconds);
        self
    }

    /// Set the plugin fields.
    pub fn plugin<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        args: impl IntoIterator<Item = S>,
        interval: PluginInterval,
    ) -> Self {
        self.message.plugin = Some(name.into());
        self.message.plugin_path = Some(path.into());
        self.message.plugin_args = Some(args.into_iter().map(Into::into).collect());
        self.message.interval = Some(interval);
        self
    }

    /// Set the timestamp in epoch microseconds.
    pub fn timestamp(mut self, micros: i64) -> Self {
        self.message.timestamp = micros;
        self
    }

    /// Replace all labels.
    pub fn labels(mut self, labels: Labels) -> Self {
        self.message.labels = labels;
        self
    }

    /// Add a single label, overwriting an existing key.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.labels.insert(key.into(), value.into());
        self
    }

    /// Build the message.
    pub fn build(self) -> Message {
        self.message
    }
}

/// Truncate `text` to at most `max_bytes` bytes without splitting a
/// UTF-8 character.
pub fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

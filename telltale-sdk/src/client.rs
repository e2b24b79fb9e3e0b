//! The client handle and its builder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::json;
use telltale_types::{
    now_micros, truncate_bytes, Kind, Labels, Message, Timestamp, LOG_SUBJECT_LIMIT,
};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{DeliveryError, Result};
use crate::labels::{AppRegistry, LabelManager};
use crate::output::Output;
use crate::schedule::Interval;
use crate::scheduler::Scheduler;
use crate::sink::Sink;

/// Bytes of the failed message copied into a delivery-failure report.
pub const FAILURE_PAYLOAD_LIMIT: usize = 1_024;

/// Emits messages to the configured output and owns the background
/// scheduler.
///
/// Cloning is cheap and every clone shares the same output, labels and
/// scheduler. The scheduler stops once the last clone is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use telltale_sdk::{Client, Labels, Timestamp};
///
/// #[tokio::main]
/// async fn main() -> telltale_sdk::Result<()> {
///     let client = Client::from_env()?;
///     client.start()?;
///
///     client.counter("orders.created", None, Timestamp::Now, Labels::new())?;
///     client.every("minute", |client| {
///         client.gauge("queue.depth", 12.0, Timestamp::Now, Labels::new())?;
///         Ok(())
///     })?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    output: Output,
    labels: LabelManager,
    scheduler: Scheduler,
    background_thread: bool,
    reporting: AtomicBool,
}

/// Non-owning reference held by the scheduler's worker.
#[derive(Debug, Clone)]
pub(crate) struct WeakClient(Weak<Inner>);

impl WeakClient {
    pub(crate) fn upgrade(&self) -> Option<Client> {
        self.0.upgrade().map(|inner| Client { inner })
    }
}

impl Client {
    /// A client with default configuration, sending UDP to port 8125.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A client configured from `TELLTALE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::builder().config(ClientConfig::load()?).build())
    }

    /// Create a builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn downgrade(&self) -> WeakClient {
        WeakClient(Arc::downgrade(&self.inner))
    }

    /// The label manager shared by all clones.
    pub fn labels(&self) -> &LabelManager {
        &self.inner.labels
    }

    /// The resolved application name.
    pub fn app_name(&self) -> String {
        self.inner.labels.app_name()
    }

    /// Override the application name.
    pub fn set_app_name(&self, name: impl Into<String>) {
        self.inner.labels.set_app_name(name);
    }

    /// Add labels sent with every message from now on.
    pub fn add_default_labels(&self, labels: Labels) {
        self.inner.labels.add_default_labels(labels);
    }

    /// Stop sending previously added default labels.
    pub fn remove_default_labels<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>) {
        self.inner.labels.remove_default_labels(keys);
    }

    /// Drop every added default label.
    pub fn reset_default_labels(&self) {
        self.inner.labels.reset_default_labels();
    }

    /// Bring the client up: start the scheduler unless background work is
    /// turned off, then register the process.
    pub fn start(&self) -> Result<()> {
        if self.inner.background_thread && !self.inner.scheduler.is_disabled() {
            self.start_scheduler()?;
        }
        self.register_process(serde_json::Value::Null, Timestamp::Now, Labels::new())
    }

    /// Start the background scheduler on the current tokio runtime.
    ///
    /// Does nothing if already running. Fails with
    /// [`SchedulerDisabled`](crate::Error::SchedulerDisabled) after
    /// [`disable_scheduler`](Self::disable_scheduler) and with
    /// [`NoRuntime`](crate::Error::NoRuntime) outside a runtime.
    pub fn start_scheduler(&self) -> Result<()> {
        self.inner.scheduler.start(self)
    }

    /// Permanently prevent the scheduler from starting.
    ///
    /// A scheduler that is already running keeps running until killed.
    pub fn disable_scheduler(&self) {
        self.inner.scheduler.disable();
    }

    /// Stop the scheduler and forget every registered callback.
    pub fn kill_scheduler(&self) {
        self.inner.scheduler.kill();
    }

    /// Kill and start again. Only the process heartbeat survives.
    pub fn restart_scheduler(&self) -> Result<()> {
        self.kill_scheduler();
        self.start_scheduler()
    }

    /// Whether the scheduler's worker is alive.
    pub fn is_scheduler_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Run `callback` every `interval`: one of `five_secs`, `minute`, `hour`
    /// or `day`.
    ///
    /// The first run happens on the scheduler's next tick. Errors and panics
    /// from the callback are logged and do not affect other callbacks.
    ///
    /// The interval name is checked first. With the scheduler disabled a
    /// valid name logs a warning, sends a log message saying so, and
    /// registers nothing.
    pub fn every<F>(&self, interval: &str, callback: F) -> Result<()>
    where
        F: Fn(&Client) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let parsed: Interval = interval.parse()?;

        if self.inner.scheduler.is_disabled() {
            warn!(interval, "every() called while the background scheduler is disabled");
            return self.log(
                "You called every(), but background threads are specifically prevented.",
                json!({ "interval": interval }),
                Timestamp::Now,
                Labels::new(),
            );
        }

        self.inner.scheduler.register(parsed, Arc::new(callback))
    }

    /// Deliver a finished message.
    ///
    /// Transport failures are never returned. They are reported once as a
    /// log message through the same output.
    pub fn send(&self, message: &Message) {
        if let Err(err) = self.inner.output.deliver(message) {
            self.report_failure(message, &err);
        }
    }

    fn report_failure(&self, failed: &Message, err: &DeliveryError) {
        let Some(_guard) = ReportingGuard::acquire(&self.inner.reporting) else {
            debug!(error = %err, "dropping delivery failure raised while reporting another");
            return;
        };
        warn!(kind = failed.kind.as_str(), error = %err, "failed to deliver message");

        let payload = match failed.to_json() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => format!("{failed:?}"),
        };
        let headline = match err {
            DeliveryError::Oversized { .. } => "Message too long to send via UDP socket",
            _ => "Exception sending message",
        };
        let subject = format!(
            "{headline}: {err}. (Truncated) Message: {}",
            truncate_bytes(&payload, FAILURE_PAYLOAD_LIMIT)
        );

        let report = Message::builder(Kind::Log)
            .subject(truncate_bytes(&subject, LOG_SUBJECT_LIMIT))
            .data(json!({ "error": err.to_string(), "type": failed.kind.as_str() }))
            .timestamp(now_micros())
            .labels(self.inner.labels.merge(Labels::new()))
            .build();

        if let Err(nested) = self.inner.output.deliver(&report) {
            debug!(error = %nested, "failed to deliver delivery-failure report");
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Held while a delivery failure is being reported; a second failure during
/// that time is dropped instead of reported.
struct ReportingGuard<'a>(&'a AtomicBool);

impl<'a> ReportingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ReportingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builder for configuring a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    output: Option<Output>,
    app_name: Option<String>,
    app_name_env: Option<String>,
    registry: Option<AppRegistry>,
    no_background_thread: bool,
}

impl ClientBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use these settings instead of the defaults.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the output destination.
    ///
    /// Defaults to UDP as described by the configuration.
    pub fn output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    /// Fix the application name up front.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Read the application name from this environment variable instead of
    /// `TELLTALE_APP_NAME`.
    pub fn app_name_env(mut self, var: impl Into<String>) -> Self {
        self.app_name_env = Some(var.into());
        self
    }

    /// Look the application name up here when nothing else supplies it.
    pub fn app_registry<F>(mut self, lookup: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.registry = Some(Arc::new(lookup));
        self
    }

    /// Never run the background scheduler.
    pub fn no_background_thread(mut self) -> Self {
        self.no_background_thread = true;
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let mut labels = LabelManager::new(&self.config);
        if let Some(var) = self.app_name_env {
            labels = labels.with_app_name_env(var);
        }
        if let Some(registry) = self.registry {
            labels = labels.with_registry(registry);
        }
        if let Some(name) = self.app_name {
            labels.set_app_name(name);
        }

        let scheduler = Scheduler::default();
        if self.no_background_thread {
            scheduler.disable();
        }

        let output = self
            .output
            .unwrap_or_else(|| Output::from_config(&self.config));

        Client {
            inner: Arc::new(Inner {
                output,
                labels,
                scheduler,
                background_thread: self.config.background_thread,
                reporting: AtomicBool::new(false),
            }),
        }
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("output", &self.output)
            .field("app_name", &self.app_name)
            .field("no_background_thread", &self.no_background_thread)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::time::Duration;

    use parking_lot::Mutex;
    use telltale_types::labels;

    use crate::sink::BufferSink;

    fn buffered() -> (Client, BufferSink) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (output, buffer) = Output::buffer();
        let client = Client::builder()
            .output(output)
            .app_name("client-test")
            .build();
        (client, buffer)
    }

    #[test]
    fn clones_share_state() {
        let (client, buffer) = buffered();
        let other = client.clone();

        other.add_default_labels(labels([("env", "test")]));
        client
            .mark("deploy", None, Timestamp::Now, Labels::new())
            .unwrap();

        assert_eq!(buffer.last().unwrap().label("env"), Some("test"));
        assert_eq!(other.app_name(), "client-test");
    }

    #[test]
    fn builder_app_name_and_registry() {
        let client = Client::builder()
            .output(Output::buffer().0)
            .app_name_env("TELLTALE_TEST_CLIENT_UNSET")
            .app_registry(|| Some("from-registry".to_string()))
            .build();
        assert_eq!(client.app_name(), "from-registry");

        client.set_app_name("renamed");
        assert_eq!(client.app_name(), "renamed");
    }

    #[test]
    fn builder_takes_host_and_port_from_config() {
        let client = Client::builder()
            .config(ClientConfig {
                udp_port: 9555,
                ..ClientConfig::default()
            })
            .build();
        let Output::Udp(sink) = &client.inner.output else {
            panic!("expected UDP output");
        };
        assert_eq!(sink.port(), 9555);
    }

    #[test]
    fn oversized_message_is_reported_once_as_a_log() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let client = Client::builder()
            .config(ClientConfig {
                udp_port: receiver.local_addr().unwrap().port(),
                max_datagram_size: 4_096,
                ..ClientConfig::default()
            })
            .app_name("oversize")
            .build();

        client
            .log(
                "big",
                json!({ "blob": "x".repeat(10_000) }),
                Timestamp::Now,
                Labels::new(),
            )
            .unwrap();

        let mut buf = [0u8; 8_192];
        let len = receiver.recv(&mut buf).unwrap();
        let report: Message = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(report.kind, Kind::Log);
        let subject = report.subject.unwrap();
        assert!(subject.starts_with("Message too long to send via UDP socket"));
        assert!(subject.contains("(Truncated) Message: {"));
        assert_eq!(report.labels["app"], "oversize");

        assert!(receiver.recv(&mut buf).is_err());
    }

    #[test]
    fn failure_report_copies_at_most_1024_payload_bytes() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reports);
        let client = Client::builder()
            .output(Output::callback(move |message| {
                if message.kind == Kind::Log {
                    seen.lock().push(message.clone());
                    return Ok(());
                }
                Err(DeliveryError::rejected("collector offline"))
            }))
            .build();

        client
            .event(
                "outage",
                Some(&"s".repeat(2_000)),
                None,
                &[],
                Timestamp::Now,
                Labels::new(),
            )
            .unwrap();

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        let subject = reports[0].subject.as_deref().unwrap();
        let prefix = "Exception sending message: delivery rejected: collector offline. (Truncated) Message: ";
        assert!(subject.starts_with(prefix));
        assert_eq!(subject.len() - prefix.len(), FAILURE_PAYLOAD_LIMIT);
        assert_eq!(reports[0].data.as_ref().unwrap()["type"], "event");
    }

    #[test]
    fn failures_while_reporting_are_dropped() {
        let calls = Arc::new(Mutex::new(0_usize));
        let counter = Arc::clone(&calls);
        let client = Client::builder()
            .output(Output::callback(move |_| {
                *counter.lock() += 1;
                Err(DeliveryError::rejected("always"))
            }))
            .build();

        client
            .counter("c", None, Timestamp::Now, Labels::new())
            .unwrap();
        assert_eq!(*calls.lock(), 2);

        // the guard is released afterwards
        client
            .counter("c", None, Timestamp::Now, Labels::new())
            .unwrap();
        assert_eq!(*calls.lock(), 4);
    }

    #[test]
    fn start_without_background_thread_only_registers() {
        let (output, buffer) = Output::buffer();
        let client = Client::builder()
            .config(ClientConfig {
                background_thread: false,
                ..ClientConfig::default()
            })
            .output(output)
            .app_name("quiet")
            .build();

        client.start().unwrap();

        assert!(!client.is_scheduler_running());
        let registration = buffer.last().unwrap();
        assert_eq!(registration.kind, Kind::ProcessRegistration);
        assert_eq!(registration.name.as_deref(), Some("quiet"));
        assert!(client.labels().is_registered());
    }

    #[test]
    fn start_with_disabled_scheduler_still_registers() {
        let (output, buffer) = Output::buffer();
        let client = Client::builder()
            .output(output)
            .no_background_thread()
            .build();

        client.start().unwrap();
        assert_eq!(buffer.len(), 1);
        assert!(!client.is_scheduler_running());
    }

    #[test]
    fn disabled_every_still_checks_the_interval() {
        let (output, buffer) = Output::buffer();
        let client = Client::builder()
            .output(output)
            .no_background_thread()
            .build();

        let err = client.every("fortnight", |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::UnknownInterval { ref given, .. } if given == "fortnight"
        ));
        assert!(buffer.is_empty());

        client.every("hour", |_| Ok(())).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_the_scheduler_and_registers() {
        let (client, buffer) = buffered();
        client.start().unwrap();
        assert!(client.is_scheduler_running());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let kinds: Vec<_> = buffer.messages().into_iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![Kind::ProcessRegistration, Kind::Heartbeat]);
    }
}

//! Output destinations for messages.

use telltale_types::Message;

use crate::config::ClientConfig;
use crate::error::DeliveryError;
use crate::sink::{BufferSink, CallbackSink, Sink, UdpSink};

/// Where a client delivers its messages.
///
/// Exactly one output is active per client. The default is UDP to the
/// configured loopback port.
#[derive(Debug)]
pub enum Output {
    /// One JSON datagram per message.
    Udp(UdpSink),

    /// Append to an in-memory buffer.
    ///
    /// Use `Output::buffer()` to create this variant and get a handle to
    /// the buffer.
    Buffer(BufferSink),

    /// A user-supplied sink or callback.
    Custom(Box<dyn Sink>),
}

impl Output {
    /// UDP to `127.0.0.1:port`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use telltale_sdk::Output;
    ///
    /// let output = Output::udp(8125);
    /// ```
    pub fn udp(port: u16) -> Self {
        Output::Udp(UdpSink::localhost(port))
    }

    /// UDP as described by configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Output::Udp(
            UdpSink::new(config.udp_host.clone(), config.udp_port)
                .with_max_datagram_size(config.max_datagram_size),
        )
    }

    /// Create a buffer output and return both the output and the buffer.
    ///
    /// # Example
    ///
    /// ```rust
    /// use telltale_sdk::{Client, Output};
    ///
    /// let (output, buffer) = Output::buffer();
    /// let client = Client::builder().output(output).build();
    ///
    /// client.counter("jobs.done", None, None::<i64>, Default::default()).unwrap();
    /// assert_eq!(buffer.len(), 1);
    /// ```
    pub fn buffer() -> (Self, BufferSink) {
        let sink = BufferSink::new();
        (Output::Buffer(sink.clone()), sink)
    }

    /// Deliver through a function.
    ///
    /// # Example
    ///
    /// ```rust
    /// use telltale_sdk::Output;
    ///
    /// let output = Output::callback(|message| {
    ///     println!("{}", message.kind.as_str());
    ///     Ok(())
    /// });
    /// ```
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Output::Custom(Box::new(CallbackSink::new(callback)))
    }

    /// Deliver through any [`Sink`].
    pub fn custom(sink: impl Sink + 'static) -> Self {
        Output::Custom(Box::new(sink))
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::from_config(&ClientConfig::default())
    }
}

impl Sink for Output {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        match self {
            Output::Udp(sink) => sink.deliver(message),
            Output::Buffer(sink) => sink.deliver(message),
            Output::Custom(sink) => sink.deliver(message),
        }
    }
}

impl std::fmt::Debug for dyn Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telltale_types::Kind;

    #[test]
    fn default_is_udp_on_8125() {
        match Output::default() {
            Output::Udp(sink) => {
                assert_eq!(sink.host(), "127.0.0.1");
                assert_eq!(sink.port(), 8125);
            }
            other => panic!("expected UDP output, got {:?}", other),
        }
    }

    #[test]
    fn config_selects_host_and_port() {
        let config = ClientConfig {
            udp_host: "localhost".into(),
            udp_port: 9000,
            ..ClientConfig::default()
        };
        let Output::Udp(sink) = Output::from_config(&config) else {
            panic!("expected UDP output");
        };
        assert_eq!(sink.host(), "localhost");
        assert_eq!(sink.port(), 9000);
    }

    #[test]
    fn buffer_output_feeds_the_returned_handle() {
        let (output, buffer) = Output::buffer();
        output
            .deliver(&Message::builder(Kind::Mark).name("m").build())
            .unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn callback_output_invokes_the_function() {
        let (inner, seen) = Output::buffer();
        let output = Output::callback(move |message| inner.deliver(message));

        output
            .deliver(&Message::builder(Kind::Mark).name("m").build())
            .unwrap();
        assert_eq!(seen.last().unwrap().name.as_deref(), Some("m"));
    }
}

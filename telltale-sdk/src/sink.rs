//! Delivery sinks.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;
use telltale_types::Message;

use crate::config::DEFAULT_MAX_DATAGRAM_SIZE;
use crate::error::DeliveryError;

/// Something that accepts finished messages.
///
/// Delivery is synchronous: `deliver` returns once the message has been
/// handed off or has failed. Implementations must be safe to call from any
/// thread, including the scheduler's worker.
pub trait Sink: Send + Sync {
    /// Hand one message to the transport.
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        (**self).deliver(message)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        (**self).deliver(message)
    }
}

const BIND_V4: &str = "0.0.0.0:0";
const BIND_V6: &str = "[::]:0";

/// Sends each message as one JSON datagram.
///
/// No acknowledgement and no retry. The host is resolved and a socket of the
/// matching address family bound on first use; both are redone after a send
/// error.
#[derive(Debug)]
pub struct UdpSink {
    host: String,
    port: u16,
    max_datagram_size: usize,
    socket: Mutex<Option<(UdpSocket, SocketAddr)>>,
}

impl UdpSink {
    /// Send to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            socket: Mutex::new(None),
        }
    }

    /// Send to `127.0.0.1:port`.
    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// Refuse to send encoded messages larger than `bytes`.
    pub fn with_max_datagram_size(mut self, bytes: usize) -> Self {
        self.max_datagram_size = bytes;
        self
    }

    /// Destination host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn send(&self, payload: &[u8]) -> io::Result<()> {
        let mut slot = self.socket.lock();
        let (socket, target) = match slot.take() {
            Some(bound) => bound,
            None => self.connect()?,
        };
        socket.send_to(payload, target)?;
        *slot = Some((socket, target));
        Ok(())
    }

    fn connect(&self) -> io::Result<(UdpSocket, SocketAddr)> {
        let target = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} resolved to no addresses", self.host),
                )
            })?;
        let local = if target.is_ipv6() { BIND_V6 } else { BIND_V4 };
        Ok((UdpSocket::bind(local)?, target))
    }
}

impl Sink for UdpSink {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let payload = message.to_json()?;
        if payload.len() > self.max_datagram_size {
            return Err(DeliveryError::Oversized {
                size: payload.len(),
                limit: self.max_datagram_size,
            });
        }
        self.send(&payload)?;
        Ok(())
    }
}

/// Hands each message to a user function.
///
/// Useful for redirecting output to another transport.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync,
{
    /// Wrap a function.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Sink for CallbackSink<F>
where
    F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        (self.callback)(message)
    }
}

impl<F> std::fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

/// Keeps every message in memory, in delivery order.
///
/// Meant for tests. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl BufferSink {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// The most recent message.
    pub fn last(&self) -> Option<Message> {
        self.messages.lock().last().cloned()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Discard everything.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Sink for BufferSink {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

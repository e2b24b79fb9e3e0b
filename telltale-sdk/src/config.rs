//! Client configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional file, and `TELLTALE_*` environment variables. Builder calls on
//! [`ClientBuilder`](crate::ClientBuilder) override all of them.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "TELLTALE";

/// Environment variable consulted when resolving the application name.
pub const APP_NAME_ENV: &str = "TELLTALE_APP_NAME";

/// Default collector port on the loopback interface.
pub const DEFAULT_UDP_PORT: u16 = 8125;

/// Largest UDP payload that fits in one IPv4 datagram.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65_507;

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Collector host.
    pub udp_host: String,
    /// Collector port.
    pub udp_port: u16,
    /// Encoded messages larger than this are not sent.
    pub max_datagram_size: usize,
    /// Whether `Client::start` runs the background scheduler.
    pub background_thread: bool,
    /// Application name, consulted after the explicit setter and the
    /// `TELLTALE_APP_NAME` variable.
    pub app_name: Option<String>,
    /// Attach the automatic `pid`, `tid` and `app` labels.
    pub default_labels: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            udp_host: "127.0.0.1".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            background_thread: true,
            app_name: None,
            default_labels: true,
        }
    }
}

impl ClientConfig {
    /// Load from `TELLTALE_*` environment variables over the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(None, ENV_PREFIX)
    }

    /// Load from a file (if it exists) with environment variables on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from(Some(path.as_ref()), ENV_PREFIX)
    }

    pub(crate) fn load_from(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

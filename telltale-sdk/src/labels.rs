//! Default labels and application-name resolution.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use telltale_types::Labels;
use tracing::warn;

use crate::config::{ClientConfig, APP_NAME_ENV};

/// External lookup consulted for the application name when neither the
/// setter, the environment nor the configuration supplied one.
pub type AppRegistry = Arc<dyn Fn() -> Option<String> + Send + Sync>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small, stable identifier for the calling thread.
///
/// Assigned on first use and cached for the life of the thread.
pub fn thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Produces the label map attached to each message.
///
/// Every message gets `pid`, `tid` and `app`, then any process-wide extra
/// defaults, then the caller's labels. Later layers win on key collisions.
pub struct LabelManager {
    pid: String,
    app_name: RwLock<Option<String>>,
    app_name_env: String,
    configured_app_name: Option<String>,
    registry: Option<AppRegistry>,
    include_defaults: bool,
    extra: RwLock<Labels>,
    registered: AtomicBool,
}

impl LabelManager {
    /// Create a manager from client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            pid: std::process::id().to_string(),
            app_name: RwLock::new(None),
            app_name_env: APP_NAME_ENV.to_string(),
            configured_app_name: config.app_name.clone(),
            registry: None,
            include_defaults: config.default_labels,
            extra: RwLock::new(Labels::new()),
            registered: AtomicBool::new(false),
        }
    }

    /// Read the application name from a different environment variable.
    pub fn with_app_name_env(mut self, var: impl Into<String>) -> Self {
        self.app_name_env = var.into();
        self
    }

    /// Consult an external registry when nothing else names the application.
    pub fn with_registry(mut self, registry: AppRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The application name, resolved once and cached.
    ///
    /// Resolution order: [`set_app_name`](Self::set_app_name), the
    /// environment variable, the configured name, the registry, and finally
    /// the base name of the running program.
    pub fn app_name(&self) -> String {
        if let Some(name) = self.app_name.read().as_ref() {
            return name.clone();
        }
        self.app_name
            .write()
            .get_or_insert_with(|| self.resolve_app_name())
            .clone()
    }

    fn resolve_app_name(&self) -> String {
        std::env::var(&self.app_name_env)
            .ok()
            .filter(|name| !name.is_empty())
            .or_else(|| self.configured_app_name.clone())
            .or_else(|| self.registry.as_ref().and_then(|lookup| lookup()))
            .unwrap_or_else(program_name)
    }

    /// Override the application name.
    ///
    /// Registrations already sent keep the old name; a warning is logged
    /// when that has happened.
    pub fn set_app_name(&self, name: impl Into<String>) {
        let name = name.into();
        let previous = self.app_name.write().replace(name.clone());
        if self.registered.load(Ordering::Acquire) && previous.as_deref() != Some(name.as_str()) {
            warn!(
                previous = previous.as_deref().unwrap_or(""),
                current = %name,
                "application name changed after the process was registered"
            );
        }
    }

    pub(crate) fn mark_registered(&self) {
        self.registered.store(true, Ordering::Release);
    }

    /// Whether a process registration has been sent.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// The automatic `pid`, `tid` and `app` labels for the calling thread.
    pub fn defaults(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert("pid".to_string(), self.pid.clone());
        labels.insert("tid".to_string(), thread_id().to_string());
        labels.insert("app".to_string(), self.app_name());
        labels
    }

    /// Add labels sent with every message from now on.
    pub fn add_default_labels(&self, labels: Labels) {
        self.extra.write().extend(labels);
    }

    /// Stop sending previously added default labels.
    ///
    /// The automatic labels cannot be removed this way; unknown keys are
    /// ignored.
    pub fn remove_default_labels<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>) {
        let mut extra = self.extra.write();
        for key in keys {
            extra.remove(key.as_ref());
        }
    }

    /// Drop every added default label.
    pub fn reset_default_labels(&self) {
        self.extra.write().clear();
    }

    /// Merge defaults with per-call labels. Caller keys win.
    pub fn merge(&self, overrides: Labels) -> Labels {
        let mut merged = if self.include_defaults {
            self.defaults()
        } else {
            Labels::new()
        };
        merged.extend(
            self.extra
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged.extend(overrides);
        merged
    }
}

impl std::fmt::Debug for LabelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelManager")
            .field("pid", &self.pid)
            .field("app_name", &*self.app_name.read())
            .field("include_defaults", &self.include_defaults)
            .finish()
    }
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

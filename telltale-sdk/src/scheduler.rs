//! Background scheduler.
//!
//! A single tokio task wakes once a second and runs every bucket whose
//! period has elapsed. Callbacks and their sends run on the blocking pool,
//! so a slow callback only delays the next tick. The task holds only a weak
//! reference to the client and exits when the client is dropped or the
//! scheduler is killed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telltale_types::{Labels, Timestamp};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::client::{Client, WeakClient};
use crate::error::{CallbackError, Error, Result};
use crate::schedule::{BucketRegistry, Callback, Interval};

/// How often the worker checks its buckets.
pub(crate) const TICK: Duration = Duration::from_secs(1);

/// Heartbeat name sent from the minute bucket while the scheduler runs.
pub const PROCESS_HEARTBEAT: &str = "process_heartbeat";

struct Running {
    registry: Arc<BucketRegistry>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Running {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Default)]
enum State {
    #[default]
    Stopped,
    Running(Running),
}

/// Start/stop state for one client's worker.
#[derive(Default)]
pub(crate) struct Scheduler {
    disabled: AtomicBool,
    state: Mutex<State>,
}

impl Scheduler {
    /// Prevent the scheduler from ever starting. One way.
    pub(crate) fn disable(&self) {
        self.disabled.store(true, Ordering::Release);
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), State::Running(running) if running.is_alive())
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// A fresh registry is created holding only the process heartbeat.
    /// Starting a running scheduler does nothing.
    pub(crate) fn start(&self, client: &Client) -> Result<()> {
        if self.is_disabled() {
            return Err(Error::SchedulerDisabled);
        }

        let mut state = self.state.lock();
        if let State::Running(running) = &*state {
            if running.is_alive() {
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let registry = Arc::new(BucketRegistry::new());
        registry.register(Interval::Minute, heartbeat());

        let (stop, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run_worker(
            client.downgrade(),
            Arc::clone(&registry),
            stop_rx,
        ));

        *state = State::Running(Running {
            registry,
            stop,
            task,
        });
        debug!("background scheduler started");
        Ok(())
    }

    /// Stop the worker and discard every registration. Idempotent.
    pub(crate) fn kill(&self) {
        let previous = std::mem::take(&mut *self.state.lock());
        if let State::Running(running) = previous {
            let _ = running.stop.send(true);
            running.task.abort();
            debug!("background scheduler stopped");
        }
    }

    /// Registry of the running worker, if any.
    pub(crate) fn registry(&self) -> Option<Arc<BucketRegistry>> {
        match &*self.state.lock() {
            State::Running(running) if running.is_alive() => Some(Arc::clone(&running.registry)),
            _ => None,
        }
    }

    pub(crate) fn register(&self, interval: Interval, callback: Callback) -> Result<()> {
        let registry = self.registry().ok_or(Error::SchedulerStopped)?;
        registry.register(interval, callback);
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("disabled", &self.is_disabled())
            .field("running", &self.is_running())
            .finish()
    }
}

fn heartbeat() -> Callback {
    Arc::new(|client: &Client| -> anyhow::Result<()> {
        client.heartbeat(
            Some(PROCESS_HEARTBEAT),
            None,
            None,
            Timestamp::Now,
            Labels::new(),
        )?;
        Ok(())
    })
}

async fn run_worker(
    client: WeakClient,
    registry: Arc<BucketRegistry>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(client) = client.upgrade() else {
                    debug!("client dropped, background scheduler exiting");
                    break;
                };
                let registry = Arc::clone(&registry);
                let now = Instant::now();
                let tick = tokio::task::spawn_blocking(move || run_due(&client, &registry, now));
                if let Err(err) = tick.await {
                    warn!(error = %err, "scheduler tick did not complete");
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

/// Run every bucket due at `now`, in period order. Returns how many
/// callbacks ran.
pub(crate) fn run_due(client: &Client, registry: &BucketRegistry, now: Instant) -> usize {
    let mut ran = 0;
    for interval in Interval::ALL {
        let Some(callbacks) = registry.take_due(interval, now) else {
            continue;
        };
        for callback in callbacks.iter() {
            ran += 1;
            if let Err(err) = invoke(callback, client) {
                warn!(interval = interval.as_str(), error = %err, "scheduled callback failed");
            }
        }
    }
    ran
}

fn invoke(callback: &Callback, client: &Client) -> Result<(), CallbackError> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(client))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CallbackError::Failed(err)),
        Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

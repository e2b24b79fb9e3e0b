//! Interval buckets for the background scheduler.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::client::Client;
use crate::error::Error;

/// A function run by the scheduler.
///
/// Callbacks receive the client instead of capturing it, so registering one
/// never keeps the client alive.
pub type Callback = Arc<dyn Fn(&Client) -> anyhow::Result<()> + Send + Sync>;

/// Scheduler periods, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    /// Every 5 seconds.
    FiveSecs,
    /// Every 60 seconds.
    Minute,
    /// Every hour.
    Hour,
    /// Every 24 hours.
    Day,
}

impl Interval {
    /// Every interval, shortest first.
    pub const ALL: [Interval; 4] = [
        Interval::FiveSecs,
        Interval::Minute,
        Interval::Hour,
        Interval::Day,
    ];

    /// Name accepted by [`Client::every`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Interval::FiveSecs => "five_secs",
            Interval::Minute => "minute",
            Interval::Hour => "hour",
            Interval::Day => "day",
        }
    }

    /// Time between firings.
    pub const fn period(self) -> Duration {
        match self {
            Interval::FiveSecs => Duration::from_secs(5),
            Interval::Minute => Duration::from_secs(60),
            Interval::Hour => Duration::from_secs(3_600),
            Interval::Day => Duration::from_secs(86_400),
        }
    }

    fn names() -> String {
        Interval::ALL
            .iter()
            .map(|interval| interval.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| Error::UnknownInterval {
                given: s.to_string(),
                expected: Interval::names(),
            })
    }
}

struct Bucket {
    interval: Interval,
    last_fired: Option<Instant>,
    callbacks: Arc<Vec<Callback>>,
}

impl Bucket {
    fn new(interval: Interval) -> Self {
        Self {
            interval,
            last_fired: None,
            callbacks: Arc::new(Vec::new()),
        }
    }

    // Never fired counts as due.
    fn is_due(&self, now: Instant) -> bool {
        self.last_fired.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.interval.period()
        })
    }
}

/// The callbacks of one running scheduler, grouped by interval.
///
/// A single lock guards all buckets. It is held only to append a callback or
/// to take a snapshot of a due bucket; callbacks run outside it, so they may
/// register further callbacks.
pub(crate) struct BucketRegistry {
    buckets: Mutex<Vec<Bucket>>,
}

impl BucketRegistry {
    pub(crate) fn new() -> Self {
        Self {
            buckets: Mutex::new(Interval::ALL.into_iter().map(Bucket::new).collect()),
        }
    }

    pub(crate) fn register(&self, interval: Interval, callback: Callback) {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.interval == interval) {
            Arc::make_mut(&mut bucket.callbacks).push(callback);
        }
    }

    /// If `interval` is due at `now`, mark it fired and return its callbacks.
    pub(crate) fn take_due(
        &self,
        interval: Interval,
        now: Instant,
    ) -> Option<Arc<Vec<Callback>>> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.iter_mut().find(|b| b.interval == interval)?;
        if !bucket.is_due(now) {
            return None;
        }
        bucket.last_fired = Some(now);
        Some(Arc::clone(&bucket.callbacks))
    }

    #[cfg(test)]
    pub(crate) fn len(&self, interval: Interval) -> usize {
        self.buckets
            .lock()
            .iter()
            .find(|b| b.interval == interval)
            .map_or(0, |b| b.callbacks.len())
    }
}

impl fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets.lock();
        let mut map = f.debug_map();
        for bucket in buckets.iter() {
            map.entry(&bucket.interval.as_str(), &bucket.callbacks.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Arc::new(|_: &Client| -> anyhow::Result<()> { Ok(()) })
    }

    #[test]
    fn names_parse_and_unknown_names_list_the_choices() {
        assert_eq!("minute".parse::<Interval>().unwrap(), Interval::Minute);
        assert_eq!("five_secs".parse::<Interval>().unwrap(), Interval::FiveSecs);

        let err = "fortnight".parse::<Interval>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Interval must be one of these: five_secs, minute, hour, day, you gave \"fortnight\""
        );
    }

    #[test]
    fn periods() {
        assert_eq!(Interval::FiveSecs.period(), Duration::from_secs(5));
        assert_eq!(Interval::Minute.period(), Duration::from_secs(60));
        assert_eq!(Interval::Hour.period(), Duration::from_secs(3_600));
        assert_eq!(Interval::Day.period(), Duration::from_secs(86_400));
    }

    #[test]
    fn every_bucket_is_due_before_its_first_firing() {
        let registry = BucketRegistry::new();
        let now = Instant::now();
        for interval in Interval::ALL {
            assert!(registry.take_due(interval, now).is_some());
        }
    }

    #[test]
    fn a_bucket_fires_once_per_period() {
        let registry = BucketRegistry::new();
        let start = Instant::now();

        assert!(registry.take_due(Interval::Minute, start).is_some());
        assert!(registry
            .take_due(Interval::Minute, start + Duration::from_secs(59))
            .is_none());
        assert!(registry
            .take_due(Interval::Minute, start + Duration::from_secs(60))
            .is_some());
        assert!(registry
            .take_due(Interval::Minute, start + Duration::from_secs(61))
            .is_none());
    }

    #[test]
    fn snapshots_do_not_see_later_registrations() {
        let registry = BucketRegistry::new();
        registry.register(Interval::Hour, noop());

        let snapshot = registry.take_due(Interval::Hour, Instant::now()).unwrap();
        registry.register(Interval::Hour, noop());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(Interval::Hour), 2);
    }

    #[test]
    fn registrations_land_in_their_own_bucket() {
        let registry = BucketRegistry::new();
        registry.register(Interval::Day, noop());
        registry.register(Interval::Day, noop());
        registry.register(Interval::FiveSecs, noop());

        assert_eq!(registry.len(Interval::Day), 2);
        assert_eq!(registry.len(Interval::FiveSecs), 1);
        assert_eq!(registry.len(Interval::Minute), 0);
    }
}

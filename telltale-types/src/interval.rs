//! Plugin run intervals.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How often the agent should run a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginInterval {
    /// Every five minutes.
    FiveMinutes,
    /// Every thirty minutes.
    ThirtyMinutes,
    /// Once an hour.
    Hourly,
    /// Once a day.
    Daily,
    /// Once a month.
    Monthly,
}

impl PluginInterval {
    /// Every accepted interval, in increasing length.
    pub const ALL: [PluginInterval; 5] = [
        PluginInterval::FiveMinutes,
        PluginInterval::ThirtyMinutes,
        PluginInterval::Hourly,
        PluginInterval::Daily,
        PluginInterval::Monthly,
    ];

    /// The wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PluginInterval::FiveMinutes => "five_minutes",
            PluginInterval::ThirtyMinutes => "thirty_minutes",
            PluginInterval::Hourly => "hourly",
            PluginInterval::Daily => "daily",
            PluginInterval::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PluginInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known plugin interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Interval must be one of: five_minutes, thirty_minutes, hourly, daily, monthly (got {0:?})")]
pub struct ParseIntervalError(pub String);

impl FromStr for PluginInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| ParseIntervalError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for interval in PluginInterval::ALL {
            assert_eq!(interval.as_str().parse::<PluginInterval>(), Ok(interval));
        }
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "weekly".parse::<PluginInterval>().unwrap_err();
        assert_eq!(err, ParseIntervalError("weekly".to_string()));
        assert!(err.to_string().starts_with("Interval must be one of"));

        // scheduler bucket names are not plugin intervals
        assert!("minute".parse::<PluginInterval>().is_err());
    }

    #[test]
    fn serde_matches_wire_names() {
        let json = serde_json::to_string(&PluginInterval::ThirtyMinutes).unwrap();
        assert_eq!(json, "\"thirty_minutes\"");
    }
}

//! Fixed time windows for rate limiting.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time window kind. Every (client, endpoint) pair has one live counter per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl WindowKind {
    /// All window kinds, shortest first.
    pub const ALL: [WindowKind; 3] = [WindowKind::Minute, WindowKind::Hour, WindowKind::Day];

    /// Get the length of this window in seconds.
    pub fn size_secs(&self) -> u64 {
        match self {
            WindowKind::Minute => 60,
            WindowKind::Hour => 3600,
            WindowKind::Day => 86400,
        }
    }

    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.size_secs())
    }

    /// Start of the window instance containing `now`.
    ///
    /// A timestamp exactly on a boundary belongs to the window starting there.
    pub fn window_start(&self, now: u64) -> u64 {
        now - now % self.size_secs()
    }

    /// Epoch second at which the window instance containing `now` ends.
    pub fn reset_time(&self, now: u64) -> u64 {
        self.window_start(now) + self.size_secs()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(WindowKind::Minute),
            "hour" => Ok(WindowKind::Hour),
            "day" => Ok(WindowKind::Day),
            other => Err(format!("unknown window kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_duration() {
        assert_eq!(WindowKind::Minute.duration(), Duration::from_secs(60));
        assert_eq!(WindowKind::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(WindowKind::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_window_start_floors_to_boundary() {
        assert_eq!(WindowKind::Minute.window_start(119), 60);
        assert_eq!(WindowKind::Minute.window_start(120), 120);
        assert_eq!(WindowKind::Hour.window_start(7_199), 3_600);
        assert_eq!(WindowKind::Day.window_start(86_400 * 3 + 5), 86_400 * 3);
    }

    #[test]
    fn test_reset_time_is_end_of_window() {
        assert_eq!(WindowKind::Minute.reset_time(60), 120);
        assert_eq!(WindowKind::Minute.reset_time(119), 120);
        assert_eq!(WindowKind::Day.reset_time(1), 86_400);
    }

    #[test]
    fn test_parse_round_trip() {
        for kind in WindowKind::ALL {
            assert_eq!(kind.as_str().parse::<WindowKind>(), Ok(kind));
        }
        assert!("week".parse::<WindowKind>().is_err());
    }
}

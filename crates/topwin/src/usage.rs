//! File-backed usage statistics for the usage-access gate.

use std::{
    fs,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use permissions::UsageStatsProvider;
use tracing::debug;

/// Reads the small event log the activity monitor appends to: one line per
/// foreground change, starting with a unix timestamp in seconds.
///
/// An unreadable or empty log reads as zero events, which the usage-access
/// heuristic treats as "denied"; that is the documented false-negative
/// window right after a grant.
pub struct FileUsageStats {
    /// Path of the monitor's event log.
    path: PathBuf,
}

impl FileUsageStats {
    /// Create a provider over the given log path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UsageStatsProvider for FileUsageStats {
    fn events_since(&self, cutoff: SystemTime) -> usize {
        let cutoff_secs = cutoff
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let Ok(text) = fs::read_to_string(&self.path) else {
            debug!(path = %self.path.display(), "no usage log");
            return 0;
        };
        text.lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|stamp| stamp.parse::<u64>().ok())
            .filter(|&ts| ts >= cutoff_secs)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("clock")
            .as_secs()
    }

    #[test]
    fn counts_only_recent_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.log");
        let recent = now_secs() - 60;
        let stale = now_secs() - 7200;
        fs::write(&path, format!("{stale} OldApp\n{recent} SomeApp\nnot-a-line\n"))
            .expect("write log");

        let stats = FileUsageStats::new(&path);
        let cutoff = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(stats.events_since(cutoff), 1);
    }

    #[test]
    fn missing_log_reads_as_zero() {
        let stats = FileUsageStats::new("/nonexistent/usage.log");
        assert_eq!(stats.events_since(SystemTime::UNIX_EPOCH), 0);
    }
}

//! # Threshold Alerts
//!
//! Alert records are immutable and timestamped. They are retained in a
//! bounded ring so memory stays constant regardless of run time, and
//! rate-limited per metric so a value oscillating around a boundary
//! cannot flood the log.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

/// Severity of a threshold boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertLevel {
    /// Worth noting, no action required.
    Warning,
    /// Something is wrong and should be investigated.
    Error,
    /// Immediate action required (hard ceilings live here).
    Critical,
}

impl AlertLevel {
    /// Returns the level name as a static string (for log fields).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// A registered threshold boundary for a metric.
#[derive(Clone, Copy, Debug)]
pub struct Threshold {
    /// Severity assigned when the boundary is crossed.
    pub level: AlertLevel,
    /// Crossing means `observed >= value`.
    pub value: f64,
}

/// An immutable record of a threshold breach or security violation.
#[derive(Clone, Debug)]
pub struct Alert {
    /// Metric (or violation source) that triggered the alert.
    pub metric: String,
    /// Severity of the breach.
    pub level: AlertLevel,
    /// The observed value that crossed the boundary.
    pub observed: f64,
    /// The boundary that was crossed.
    pub threshold: f64,
    /// Wall-clock timestamp for audit correlation.
    pub at: SystemTime,
}

/// Bounded ring of alert records.
///
/// The ring holds at most `capacity` records. Records older than the
/// retention window are purged opportunistically, but the most recent
/// `min_keep` records survive purging so a quiet period never empties
/// the audit trail entirely.
#[derive(Debug)]
pub struct AlertRing {
    records: VecDeque<(Instant, Alert)>,
    capacity: usize,
    retention: Duration,
    min_keep: usize,
}

impl AlertRing {
    /// Creates a ring with the given capacity and retention window.
    #[must_use]
    pub fn new(capacity: usize, retention: Duration, min_keep: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            retention,
            min_keep,
        }
    }

    /// Appends an alert, evicting the oldest record if the ring is full.
    pub fn push(&mut self, alert: Alert) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back((Instant::now(), alert));
    }

    /// Purges records older than the retention window.
    ///
    /// The most recent `min_keep` records are never purged.
    pub fn purge_expired(&mut self) {
        while self.records.len() > self.min_keep {
            match self.records.front() {
                Some((at, _)) if at.elapsed() > self.retention => {
                    self.records.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Returns the number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshots the retained alerts, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Alert> {
        self.records.iter().map(|(_, a)| a.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(metric: &str) -> Alert {
        Alert {
            metric: metric.to_string(),
            level: AlertLevel::Warning,
            observed: 1.0,
            threshold: 0.5,
            at: SystemTime::now(),
        }
    }

    #[test]
    fn test_ring_bounded() {
        let mut ring = AlertRing::new(3, Duration::from_secs(60), 1);

        for i in 0..5 {
            ring.push(alert(&format!("m{i}")));
        }

        assert_eq!(ring.len(), 3);
        let snap = ring.snapshot();
        assert_eq!(snap[0].metric, "m2");
        assert_eq!(snap[2].metric, "m4");
    }

    #[test]
    fn test_purge_keeps_recent() {
        let mut ring = AlertRing::new(8, Duration::from_secs(0), 2);

        for i in 0..4 {
            ring.push(alert(&format!("m{i}")));
        }

        // Zero retention: everything is expired, but min_keep holds two.
        std::thread::sleep(Duration::from_millis(5));
        ring.purge_expired();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.snapshot()[0].metric, "m2");
    }

    #[test]
    fn test_level_ordering() {
        assert!(AlertLevel::Critical > AlertLevel::Error);
        assert!(AlertLevel::Error > AlertLevel::Warning);
        assert_eq!(AlertLevel::Critical.as_str(), "critical");
    }
}

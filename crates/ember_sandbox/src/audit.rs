//! # Audit Log
//!
//! Every denial and every quota breach lands here: immutable,
//! timestamped records in a bounded ring with a minimum retention
//! window. The log doubles as the rate limiter for repeated alerts from
//! the same source, so one misbehaving extension cannot flood the
//! alert channel.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime};

/// An immutable record of a denial or threshold breach.
#[derive(Clone, Debug)]
pub struct ViolationRecord {
    /// The extension the record is about.
    pub extension: String,
    /// The operation that was denied or breached a threshold.
    pub operation: String,
    /// Why it was denied.
    pub reason: String,
    /// Wall-clock timestamp for correlation with external logs.
    pub at: SystemTime,
}

/// Bounded, retention-windowed audit trail.
#[derive(Debug)]
pub struct AuditLog {
    records: VecDeque<(Instant, ViolationRecord)>,
    capacity: usize,
    retention: Duration,
    min_keep: usize,
    /// Last alert instant per source, for rate limiting.
    last_alert: HashMap<String, Instant>,
    alert_window: Duration,
}

impl AuditLog {
    /// Creates an audit log.
    ///
    /// `capacity` bounds the ring; records older than `retention` are
    /// purged except for the most recent `min_keep`; `alert_window` is
    /// the minimum interval between alerts from one source.
    #[must_use]
    pub fn new(
        capacity: usize,
        retention: Duration,
        min_keep: usize,
        alert_window: Duration,
    ) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            retention,
            min_keep,
            last_alert: HashMap::new(),
            alert_window,
        }
    }

    /// Appends a record, evicting the oldest when full.
    ///
    /// Recording is unconditional - rate limiting applies to alert
    /// fan-out, never to the audit trail itself.
    pub fn record(&mut self, extension: &str, operation: &str, reason: &str) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back((
            Instant::now(),
            ViolationRecord {
                extension: extension.to_string(),
                operation: operation.to_string(),
                reason: reason.to_string(),
                at: SystemTime::now(),
            },
        ));
    }

    /// Rate-limit check: true if `source` may raise an alert now.
    ///
    /// A true result claims the slot - the next call within the window
    /// returns false.
    pub fn should_alert(&mut self, source: &str) -> bool {
        let now = Instant::now();
        match self.last_alert.get(source) {
            Some(&last) if now.duration_since(last) < self.alert_window => false,
            _ => {
                self.last_alert.insert(source.to_string(), now);
                true
            }
        }
    }

    /// Purges records older than the retention window, always keeping
    /// the most recent `min_keep`.
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

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the trail is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ViolationRecord> {
        self.records.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Retained records about one extension, oldest first.
    #[must_use]
    pub fn records_for(&self, extension: &str) -> Vec<ViolationRecord> {
        self.records
            .iter()
            .filter(|(_, r)| r.extension == extension)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> AuditLog {
        AuditLog::new(
            4,
            Duration::from_secs(60),
            1,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_bounded_ring() {
        let mut audit = log();
        for i in 0..6 {
            audit.record("mod_a", &format!("op{i}"), "denied");
        }
        assert_eq!(audit.len(), 4);
        assert_eq!(audit.snapshot()[0].operation, "op2");
    }

    #[test]
    fn test_records_always_kept_despite_rate_limit() {
        let mut audit = log();
        assert!(audit.should_alert("mod_a"));
        assert!(!audit.should_alert("mod_a"));
        // A different source has its own window.
        assert!(audit.should_alert("mod_b"));

        audit.record("mod_a", "destroy", "denied");
        audit.record("mod_a", "destroy", "denied");
        assert_eq!(audit.records_for("mod_a").len(), 2);
    }

    #[test]
    fn test_purge_respects_min_keep() {
        let mut audit = AuditLog::new(
            8,
            Duration::from_secs(0),
            2,
            Duration::from_secs(1),
        );
        for i in 0..4 {
            audit.record("mod_a", &format!("op{i}"), "denied");
        }
        std::thread::sleep(Duration::from_millis(5));
        audit.purge_expired();
        assert_eq!(audit.len(), 2);
    }
}

//! # EMBER Metrics
//!
//! Lock-light metrics collection for the EMBER engine core.
//!
//! Three metric kinds are supported:
//! - **Counters**: monotonic accumulation (atomic, no locks)
//! - **Gauges**: last-write-wins instantaneous values (atomic)
//! - **Histograms**: time-windowed distributions with percentile estimates
//!
//! Every recorded sample is checked against registered thresholds. A
//! crossed boundary emits at most one alert per metric per cooldown
//! window, so a value oscillating near a threshold cannot cause an alert
//! storm. Alerts land in a bounded ring (for audit) and on a bounded
//! channel (for live consumers); when the channel is full the alert is
//! dropped rather than blocking the recording path.
//!
//! ## Thread Safety
//!
//! Recording is safe from concurrent callers. Counters and gauges are
//! plain atomics; histograms take a per-metric lock. A [`MetricsHub::snapshot`]
//! may observe different metrics at slightly different instants - the
//! cross-metric view is eventually consistent by design.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod alert;
pub mod histogram;

pub use alert::{Alert, AlertLevel, AlertRing, Threshold};
pub use histogram::{Histogram, HistogramSummary};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

/// Configuration for the metrics hub.
#[derive(Clone, Copy, Debug)]
pub struct MetricsConfig {
    /// Minimum interval between alerts for the same metric.
    pub alert_cooldown: Duration,
    /// Maximum alert records retained in the audit ring.
    pub alert_ring_capacity: usize,
    /// Alerts older than this are purged from the ring.
    pub alert_retention: Duration,
    /// Most recent alerts that survive purging even past retention.
    pub alert_min_keep: usize,
    /// Capacity of the live alert channel.
    pub alert_channel_capacity: usize,
    /// Per-histogram sample cap.
    pub histogram_max_samples: usize,
    /// Per-histogram sample age horizon.
    pub histogram_horizon: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            alert_cooldown: Duration::from_secs(5),
            alert_ring_capacity: 1024,
            alert_retention: Duration::from_secs(300),
            alert_min_keep: 64,
            alert_channel_capacity: 256,
            histogram_max_samples: 4096,
            histogram_horizon: Duration::from_secs(60),
        }
    }
}

/// Eventually-consistent snapshot of all metrics.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    /// Counter values by name.
    pub counters: HashMap<String, u64>,
    /// Gauge values by name.
    pub gauges: HashMap<String, f64>,
    /// Histogram summaries by name (empty histograms omitted).
    pub histograms: HashMap<String, HistogramSummary>,
}

/// Alert bookkeeping shared under one lock.
#[derive(Debug)]
struct AlertState {
    ring: AlertRing,
    last_emitted: HashMap<String, Instant>,
}

/// The central metrics registry.
///
/// Cheap to share (`Arc<MetricsHub>`); all mutation goes through `&self`.
pub struct MetricsHub {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<HashMap<String, Arc<Mutex<Histogram>>>>,
    thresholds: RwLock<HashMap<String, Vec<Threshold>>>,
    alert_state: Mutex<AlertState>,
    alert_tx: Sender<Alert>,
    alert_rx: Receiver<Alert>,
    config: MetricsConfig,
}

impl MetricsHub {
    /// Creates a hub with the given configuration.
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        let (alert_tx, alert_rx) = bounded(config.alert_channel_capacity);
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            thresholds: RwLock::new(HashMap::new()),
            alert_state: Mutex::new(AlertState {
                ring: AlertRing::new(
                    config.alert_ring_capacity,
                    config.alert_retention,
                    config.alert_min_keep,
                ),
                last_emitted: HashMap::new(),
            }),
            alert_tx,
            alert_rx,
            config,
        }
    }

    /// Adds `delta` to a counter, creating it at zero on first use.
    ///
    /// Returns the counter value after the addition.
    pub fn increment(&self, name: &str, delta: u64) -> u64 {
        let cell = self.counter_cell(name);
        let new = cell.fetch_add(delta, Ordering::Relaxed) + delta;
        #[allow(clippy::cast_precision_loss)]
        self.check_thresholds(name, new as f64);
        new
    }

    /// Returns the current value of a counter (zero if never incremented).
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Sets a gauge to `value` (last write wins).
    pub fn set_gauge(&self, name: &str, value: f64) {
        let cell = self.gauge_cell(name);
        cell.store(value.to_bits(), Ordering::Relaxed);
        self.check_thresholds(name, value);
    }

    /// Returns the current gauge value, if the gauge exists.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges
            .read()
            .get(name)
            .map(|c| f64::from_bits(c.load(Ordering::Relaxed)))
    }

    /// Records an observation into a histogram, creating it on first use.
    pub fn observe(&self, name: &str, value: f64) {
        let hist = self.histogram_cell(name);
        hist.lock().record(value);
        self.check_thresholds(name, value);
    }

    /// Returns the summary of a histogram's current window.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<HistogramSummary> {
        let hist = self.histograms.read().get(name).cloned()?;
        let guard = hist.lock();
        guard.summary()
    }

    /// Registers a threshold boundary for a metric.
    ///
    /// Multiple levels may be registered for the same metric; a recorded
    /// sample triggers the highest level whose boundary it crosses.
    pub fn set_threshold(&self, name: &str, level: AlertLevel, value: f64) {
        let mut thresholds = self.thresholds.write();
        let entry = thresholds.entry(name.to_string()).or_default();
        entry.retain(|t| t.level != level);
        entry.push(Threshold { level, value });
    }

    /// Raises an alert directly, bypassing threshold lookup.
    ///
    /// Used by the scheduler and sandbox for violations that are not
    /// numeric boundary crossings. The per-metric cooldown still applies.
    pub fn raise(&self, source: &str, level: AlertLevel, observed: f64, threshold: f64) {
        self.emit(source, level, observed, threshold);
    }

    /// Snapshots the retained alert ring, oldest first.
    ///
    /// Expired records are purged before the snapshot is taken.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        let mut state = self.alert_state.lock();
        state.ring.purge_expired();
        state.ring.snapshot()
    }

    /// Returns a receiver for live alert delivery.
    ///
    /// All receivers share one queue: each alert is observed by exactly
    /// one consumer.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Alert> {
        self.alert_rx.clone()
    }

    /// Takes an eventually-consistent snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), f64::from_bits(v.load(Ordering::Relaxed))))
            .collect();
        let histograms = self
            .histograms
            .read()
            .iter()
            .filter_map(|(k, v)| v.lock().summary().map(|s| (k.clone(), s)))
            .collect();

        MetricsSnapshot {
            counters,
            gauges,
            histograms,
        }
    }

    fn counter_cell(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(cell) = self.counters.read().get(name) {
            return Arc::clone(cell);
        }
        let mut map = self.counters.write();
        Arc::clone(map.entry(name.to_string()).or_default())
    }

    fn gauge_cell(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(cell) = self.gauges.read().get(name) {
            return Arc::clone(cell);
        }
        let mut map = self.gauges.write();
        Arc::clone(map.entry(name.to_string()).or_default())
    }

    fn histogram_cell(&self, name: &str) -> Arc<Mutex<Histogram>> {
        if let Some(cell) = self.histograms.read().get(name) {
            return Arc::clone(cell);
        }
        let mut map = self.histograms.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Histogram::new(
                self.config.histogram_max_samples,
                self.config.histogram_horizon,
            )))
        }))
    }

    /// Checks a sample against registered thresholds for `name`.
    ///
    /// The highest crossed level wins; emission is rate-limited per metric.
    fn check_thresholds(&self, name: &str, observed: f64) {
        let crossed = {
            let thresholds = self.thresholds.read();
            let Some(registered) = thresholds.get(name) else {
                return;
            };
            registered
                .iter()
                .filter(|t| observed >= t.value)
                .max_by_key(|t| t.level)
                .copied()
        };

        if let Some(threshold) = crossed {
            self.emit(name, threshold.level, observed, threshold.value);
        }
    }

    fn emit(&self, metric: &str, level: AlertLevel, observed: f64, threshold: f64) {
        let mut state = self.alert_state.lock();

        if let Some(last) = state.last_emitted.get(metric) {
            if last.elapsed() < self.config.alert_cooldown {
                return;
            }
        }
        state.last_emitted.insert(metric.to_string(), Instant::now());

        let alert = Alert {
            metric: metric.to_string(),
            level,
            observed,
            threshold,
            at: SystemTime::now(),
        };

        tracing::warn!(
            metric,
            level = level.as_str(),
            observed,
            threshold,
            "metric threshold crossed"
        );

        state.ring.push(alert.clone());
        drop(state);

        if let Err(TrySendError::Full(_)) = self.alert_tx.try_send(alert) {
            // Live consumers are behind; the ring still has the record.
        }
    }
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let hub = MetricsHub::default();
        assert_eq!(hub.increment("ticks", 1), 1);
        assert_eq!(hub.increment("ticks", 4), 5);
        assert_eq!(hub.counter("ticks"), 5);
        assert_eq!(hub.counter("missing"), 0);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let hub = MetricsHub::default();
        assert!(hub.gauge("entities").is_none());
        hub.set_gauge("entities", 10.0);
        hub.set_gauge("entities", 3.0);
        assert!((hub.gauge("entities").unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_alert_and_cooldown() {
        let hub = MetricsHub::new(MetricsConfig {
            alert_cooldown: Duration::from_secs(60),
            ..MetricsConfig::default()
        });
        hub.set_threshold("frame_ms", AlertLevel::Warning, 16.0);
        hub.set_threshold("frame_ms", AlertLevel::Critical, 33.0);

        hub.observe("frame_ms", 10.0);
        assert!(hub.alerts().is_empty());

        // Crosses both boundaries: the highest level wins.
        hub.observe("frame_ms", 40.0);
        let alerts = hub.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);

        // Within cooldown: suppressed.
        hub.observe("frame_ms", 50.0);
        assert_eq!(hub.alerts().len(), 1);
    }

    #[test]
    fn test_live_alert_channel() {
        let hub = MetricsHub::default();
        let rx = hub.subscribe();
        hub.set_threshold("queries", AlertLevel::Error, 100.0);
        hub.increment("queries", 150);

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.metric, "queries");
        assert_eq!(alert.level, AlertLevel::Error);
    }

    #[test]
    fn test_snapshot() {
        let hub = MetricsHub::default();
        hub.increment("a", 2);
        hub.set_gauge("b", 1.5);
        hub.observe("c", 3.0);

        let snap = hub.snapshot();
        assert_eq!(snap.counters["a"], 2);
        assert!((snap.gauges["b"] - 1.5).abs() < f64::EPSILON);
        assert_eq!(snap.histograms["c"].count, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let hub = Arc::new(MetricsHub::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        hub.increment("shared", 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(hub.counter("shared"), 4000);
    }
}

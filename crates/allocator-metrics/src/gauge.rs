//! Metric value sources.
//!
//! A catalog entry is backed by one of four sources:
//!
//! | Source | Value comes from | Read cost |
//! |--------|------------------|-----------|
//! | [`Counter`] | increments by the owning registry | atomic load |
//! | [`PushGauge`] | last value set by the owning registry | atomic load |
//! | [`PullGauge`] | asynchronous query to an external owner | one request per read |
//! | [`Timer`] | duration samples inside a sliding window | sort of the window |
//!
//! Pull gauges never hold a value. Each read calls the producer again and is
//! bounded by the gauge's timeout, so a slow or stopped owner yields a
//! [`SourceError`] rather than a stalled reader.

use crate::errors::SourceError;
use crate::observability;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Future resolving to a pull-gauge value.
pub type ValueFuture = BoxFuture<'static, Result<f64, SourceError>>;

/// Monotonic event counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new shared counter starting at zero.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment the counter by one.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current count.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge holding the last value pushed by its owner.
///
/// The value is stored as the bit pattern of an `f64` so reads and writes
/// are single atomic operations.
#[derive(Debug)]
pub struct PushGauge {
    bits: AtomicU64,
}

impl PushGauge {
    /// Create a new shared gauge with an initial value.
    #[must_use]
    pub fn new(initial: f64) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU64::new(initial.to_bits()),
        })
    }

    /// Store a new value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Last stored value.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for PushGauge {
    fn default() -> Self {
        Self {
            bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }
}

type Producer = Arc<dyn Fn() -> ValueFuture + Send + Sync>;

/// Gauge whose value is produced on demand by an external owner.
#[derive(Clone)]
pub struct PullGauge {
    producer: Producer,
    timeout: Duration,
}

impl PullGauge {
    /// Create a pull gauge from a producer.
    ///
    /// The producer must only dispatch a request; it runs on the reader's
    /// task and must not touch the owner's state directly.
    pub fn new<F>(timeout: Duration, producer: F) -> Self
    where
        F: Fn() -> ValueFuture + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
            timeout,
        }
    }

    /// Read timeout applied to every read.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Trigger the producer and return a future for the value.
    ///
    /// The returned future resolves to [`SourceError::Timeout`] if the owner
    /// does not answer within the gauge's timeout.
    pub fn read(&self) -> ValueFuture {
        let pending = (self.producer)();
        let timeout = self.timeout;

        Box::pin(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(timeout)),
            };

            let status = match &result {
                Ok(_) => "success",
                Err(e) => {
                    debug!(
                        target: "allocator.metrics.gauge",
                        error = %e,
                        "Pull gauge read failed"
                    );
                    e.error_type_label()
                }
            };
            observability::record_pull_read(status, started.elapsed());

            result
        })
    }
}

impl fmt::Debug for PullGauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullGauge")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Summary of the samples inside a timer's window, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerStatistics {
    /// Number of samples in the window.
    pub count: usize,
    /// Most recent sample.
    pub last_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Default)]
struct TimerWindow {
    samples: VecDeque<(Instant, Duration)>,
}

impl TimerWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((recorded_at, _)) = self.samples.front() {
            if now.saturating_duration_since(*recorded_at) > window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Windowed duration statistic.
///
/// Samples older than the window are discarded on the next record or read.
#[derive(Debug)]
pub struct Timer {
    window: Duration,
    inner: Mutex<TimerWindow>,
}

impl Timer {
    /// Create a new shared timer keeping samples for `window`.
    #[must_use]
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            inner: Mutex::new(TimerWindow::default()),
        })
    }

    /// Record one duration sample.
    pub fn record(&self, duration: Duration) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.prune(now, self.window);
        inner.samples.push_back((now, duration));
    }

    /// Statistics over the current window, or `None` if it holds no samples.
    #[must_use]
    pub fn statistics(&self) -> Option<TimerStatistics> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.prune(Instant::now(), self.window);

        let last_ms = inner.samples.back().map(|(_, d)| as_millis(*d))?;
        let mut sorted: Vec<f64> = inner.samples.iter().map(|(_, d)| as_millis(*d)).collect();
        drop(inner);
        sorted.sort_by(f64::total_cmp);

        Some(TimerStatistics {
            count: sorted.len(),
            last_ms,
            min_ms: sorted.first().copied().unwrap_or_default(),
            max_ms: sorted.last().copied().unwrap_or_default(),
            p50_ms: percentile(&sorted, 0.50),
            p90_ms: percentile(&sorted, 0.90),
            p99_ms: percentile(&sorted, 0.99),
        })
    }
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Nearest-rank percentile over an ascending slice.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len().max(1)) - 1;
    sorted.get(index).copied().unwrap_or_default()
}

/// A value source registered under a catalog name.
#[derive(Debug, Clone)]
pub enum MetricSource {
    Counter(Arc<Counter>),
    Gauge(Arc<PushGauge>),
    Pull(PullGauge),
    Timer(Arc<Timer>),
}

impl MetricSource {
    /// Returns the source kind as a bounded metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            MetricSource::Counter(_) => "counter",
            MetricSource::Gauge(_) => "push_gauge",
            MetricSource::Pull(_) => "pull_gauge",
            MetricSource::Timer(_) => "timer",
        }
    }
}

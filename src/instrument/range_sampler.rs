use log::{trace, warn};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::instrument::{Histogram, Instrument, InstrumentIdentity, MeasurementUnit};
use crate::range::DynamicRange;
use crate::snapshot::MetricValue;

/// Tracks a value that moves up and down (queue sizes, in-flight requests)
/// and periodically records its minimum, maximum and current value into an
/// internal histogram.
#[derive(Debug)]
pub struct RangeSampler {
    histogram: Histogram,
    sample_interval: Duration,
    current: AtomicI64,
    min: AtomicI64,
    max: AtomicI64,
}

impl RangeSampler {
    pub(crate) fn new(histogram: Histogram, sample_interval: Duration) -> Self {
        Self {
            histogram,
            sample_interval,
            current: AtomicI64::new(0),
            min: AtomicI64::new(0),
            max: AtomicI64::new(0),
        }
    }

    /// Raise the current value by one
    pub fn increment(&self) {
        self.increment_by(1);
    }

    /// Move the current value by `times`, which may be negative
    pub fn increment_by(&self, times: i64) {
        let value = self.current.fetch_add(times, Ordering::AcqRel) + times;
        self.widen_window(value);
    }

    /// Lower the current value by one
    pub fn decrement(&self) {
        self.decrement_by(1);
    }

    /// Move the current value down by `times`, which may be negative
    pub fn decrement_by(&self, times: i64) {
        let value = self.current.fetch_sub(times, Ordering::AcqRel) - times;
        self.widen_window(value);
    }

    fn widen_window(&self, value: i64) {
        self.max.fetch_max(value, Ordering::AcqRel);
        self.min.fetch_min(value, Ordering::AcqRel);
    }

    /// Value after all increments and decrements so far
    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }

    /// Record min, max and current into the histogram, then restart the
    /// min/max window at the current value.
    pub fn sample(&self) -> Result<()> {
        let current = self.current();
        let min = self.min.swap(current, Ordering::AcqRel);
        let max = self.max.swap(current, Ordering::AcqRel);

        for value in [min, max, current] {
            // negative values are not trackable
            self.histogram.record(value.max(0) as u64)?;
        }
        Ok(())
    }

    /// Interval at which [`sample`](Self::sample) should run
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Precision of the backing histogram
    pub fn dynamic_range(&self) -> DynamicRange {
        self.histogram.dynamic_range()
    }

    /// Spawn a task sampling this instrument every sample interval. The task
    /// stops once the last `Arc` to the sampler is dropped.
    pub fn spawn_sampling(self: &Arc<Self>) -> JoinHandle<()> {
        let sampler: Weak<Self> = Arc::downgrade(self);
        let period = self.sample_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;

                let Some(sampler) = sampler.upgrade() else {
                    break;
                };
                if let Err(e) = sampler.sample() {
                    warn!("Failed to sample {}: {}", sampler.identity(), e);
                }
            }
            trace!("Range sampler dropped, sampling stopped");
        })
    }
}

impl Instrument for RangeSampler {
    fn identity(&self) -> &InstrumentIdentity {
        self.histogram.identity()
    }

    fn unit(&self) -> MeasurementUnit {
        self.histogram.unit()
    }

    fn collect(&self) -> Result<MetricValue> {
        self.histogram.take_snapshot().map(MetricValue::RangeSampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(interval: Duration) -> RangeSampler {
        let histogram = Histogram::new(
            InstrumentIdentity::new("pool.in-flight"),
            MeasurementUnit::None,
            DynamicRange::new(1, 1000, 2).unwrap(),
        );
        RangeSampler::new(histogram, interval)
    }

    #[test]
    fn test_sample_records_min_max_current() {
        let sampler = sampler(Duration::from_millis(100));
        sampler.increment_by(5);
        sampler.decrement_by(3);
        sampler.sample().unwrap();

        assert_eq!(sampler.current(), 2);
        let snapshot = sampler.collect().unwrap();
        let histogram = snapshot.histogram().unwrap();
        assert_eq!(histogram.count(), 3);
        assert_eq!(histogram.min(), 0);
        assert_eq!(histogram.max(), 5);
    }

    #[test]
    fn test_window_restarts_at_current() {
        let sampler = sampler(Duration::from_millis(100));
        sampler.increment_by(7);
        sampler.sample().unwrap();
        sampler.collect().unwrap();

        sampler.sample().unwrap();
        let snapshot = sampler.collect().unwrap();
        let histogram = snapshot.histogram().unwrap();
        assert_eq!(histogram.min(), 7);
        assert_eq!(histogram.max(), 7);
    }

    #[test]
    fn test_negative_values_clamp_to_zero() {
        let sampler = sampler(Duration::from_millis(100));
        sampler.decrement_by(4);
        sampler.sample().unwrap();

        let snapshot = sampler.collect().unwrap();
        assert_eq!(snapshot.histogram().unwrap().max(), 0);
    }

    #[test]
    fn test_negative_steps_widen_the_opposite_bound() {
        let sampler = sampler(Duration::from_millis(100));
        sampler.increment_by(10);
        sampler.sample().unwrap();
        sampler.collect().unwrap();

        sampler.increment_by(-8);
        sampler.increment_by(5);
        sampler.sample().unwrap();
        let snapshot = sampler.collect().unwrap();
        let histogram = snapshot.histogram().unwrap();
        assert_eq!(histogram.min(), 2);
        assert_eq!(histogram.max(), 10);

        sampler.decrement_by(5);
        sampler.sample().unwrap();
        sampler.collect().unwrap();

        sampler.decrement_by(-8);
        sampler.decrement_by(5);
        sampler.sample().unwrap();
        let snapshot = sampler.collect().unwrap();
        let histogram = snapshot.histogram().unwrap();
        assert_eq!(histogram.min(), 2);
        assert_eq!(histogram.max(), 10);
    }

    #[tokio::test]
    async fn test_spawned_sampling_runs_and_stops() {
        let sampler = Arc::new(sampler(Duration::from_millis(10)));
        sampler.increment_by(3);
        let handle = sampler.spawn_sampling();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = sampler.collect().unwrap();
        assert!(snapshot.histogram().unwrap().count() >= 3);

        drop(sampler);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

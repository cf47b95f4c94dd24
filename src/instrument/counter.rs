use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::instrument::{Instrument, InstrumentIdentity, MeasurementUnit};
use crate::snapshot::MetricValue;

/// Monotonically increasing counter. Each collection reports the increase
/// since the previous one.
#[derive(Debug)]
pub struct Counter {
    identity: InstrumentIdentity,
    unit: MeasurementUnit,
    count: AtomicU64,
}

impl Counter {
    pub(crate) fn new(identity: InstrumentIdentity, unit: MeasurementUnit) -> Self {
        Self {
            identity,
            unit,
            count: AtomicU64::new(0),
        }
    }

    /// Add one
    pub fn increment(&self) {
        self.increment_by(1);
    }

    /// Add `times`
    pub fn increment_by(&self, times: u64) {
        self.count.fetch_add(times, Ordering::Relaxed);
    }

    /// Count accumulated since the last collection
    pub fn value(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Instrument for Counter {
    fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    fn unit(&self) -> MeasurementUnit {
        self.unit
    }

    fn collect(&self) -> Result<MetricValue> {
        Ok(MetricValue::Counter(self.count.swap(0, Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_resets() {
        let counter = Counter::new(InstrumentIdentity::new("jobs.done"), MeasurementUnit::None);
        counter.increment();
        counter.increment_by(4);
        assert_eq!(counter.value(), 5);

        assert!(matches!(counter.collect().unwrap(), MetricValue::Counter(5)));
        assert!(matches!(counter.collect().unwrap(), MetricValue::Counter(0)));
    }
}

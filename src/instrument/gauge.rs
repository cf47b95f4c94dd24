use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;
use crate::instrument::{Instrument, InstrumentIdentity, MeasurementUnit};
use crate::snapshot::MetricValue;

/// Point-in-time value that can move in both directions
#[derive(Debug)]
pub struct Gauge {
    identity: InstrumentIdentity,
    unit: MeasurementUnit,
    value: AtomicI64,
}

impl Gauge {
    pub(crate) fn new(identity: InstrumentIdentity, unit: MeasurementUnit) -> Self {
        Self {
            identity,
            unit,
            value: AtomicI64::new(0),
        }
    }

    /// Replace the value
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Raise the value by one
    pub fn increment(&self) {
        self.add(1);
    }

    /// Lower the value by one
    pub fn decrement(&self) {
        self.add(-1);
    }

    /// Move the value by `delta`
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Instrument for Gauge {
    fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    fn unit(&self) -> MeasurementUnit {
        self.unit
    }

    fn collect(&self) -> Result<MetricValue> {
        Ok(MetricValue::Gauge(self.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_moves_both_ways_and_keeps_value() {
        let gauge = Gauge::new(InstrumentIdentity::new("queue.depth"), MeasurementUnit::None);
        gauge.set(10);
        gauge.increment();
        gauge.decrement();
        gauge.decrement();
        gauge.add(-4);
        assert_eq!(gauge.value(), 5);

        assert!(matches!(gauge.collect().unwrap(), MetricValue::Gauge(5)));
        assert_eq!(gauge.value(), 5);
    }
}

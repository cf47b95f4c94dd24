use std::sync::Mutex;

use crate::error::{MetricsError, Result};
use crate::instrument::{Instrument, InstrumentIdentity, MeasurementUnit};
use crate::range::DynamicRange;
use crate::snapshot::{HistogramSnapshot, MetricValue};

/// Histogram backed by an HDR histogram sized from its resolved dynamic range
#[derive(Debug)]
pub struct Histogram {
    identity: InstrumentIdentity,
    unit: MeasurementUnit,
    range: DynamicRange,
    values: Mutex<hdrhistogram::Histogram<u64>>,
}

impl Histogram {
    pub(crate) fn new(identity: InstrumentIdentity, unit: MeasurementUnit, range: DynamicRange) -> Self {
        let values = match hdrhistogram::Histogram::new_with_bounds(
            range.lowest_discernible_value(),
            range.highest_trackable_value(),
            range.significant_value_digits(),
        ) {
            Ok(values) => values,
            // DynamicRange::new rejects every combination hdrhistogram refuses
            Err(e) => unreachable!("validated dynamic range {:?} rejected: {}", range, e),
        };

        Self {
            identity,
            unit,
            range,
            values: Mutex::new(values),
        }
    }

    /// Record a single value
    pub fn record(&self, value: u64) -> Result<()> {
        self.record_n(value, 1)
    }

    /// Record `count` occurrences of a value
    pub fn record_n(&self, value: u64, count: u64) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| MetricsError::Instrument("Lock poisoned".to_string()))?;

        values.record_n(value, count).map_err(|_| {
            MetricsError::Instrument(format!(
                "value {} is outside the trackable range of {} ({}..={})",
                value,
                self.identity,
                self.range.lowest_discernible_value(),
                self.range.highest_trackable_value()
            ))
        })
    }

    /// Resolved dynamic range this histogram was built with
    pub fn dynamic_range(&self) -> DynamicRange {
        self.range
    }

    /// Copy out the recorded distribution and start over
    pub fn take_snapshot(&self) -> Result<HistogramSnapshot> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| MetricsError::Instrument("Lock poisoned".to_string()))?;

        let snapshot = HistogramSnapshot::new(self.range, values.clone());
        values.reset();
        Ok(snapshot)
    }
}

impl Instrument for Histogram {
    fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    fn unit(&self) -> MeasurementUnit {
        self.unit
    }

    fn collect(&self) -> Result<MetricValue> {
        self.take_snapshot().map(MetricValue::Histogram)
    }
}

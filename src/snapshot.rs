//! Per-tick metric snapshots and the rules for merging them across ticks.

use chrono::{DateTime, Utc};
use log::error;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MetricsError, Result};
use crate::instrument::{Instrument, InstrumentIdentity, MeasurementUnit};
use crate::range::DynamicRange;

/// Recorded distribution of a histogram for one or more ticks
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    range: DynamicRange,
    values: hdrhistogram::Histogram<u64>,
}

impl HistogramSnapshot {
    pub(crate) fn new(range: DynamicRange, values: hdrhistogram::Histogram<u64>) -> Self {
        Self { range, values }
    }

    /// Precision the distribution was recorded with
    pub fn dynamic_range(&self) -> DynamicRange {
        self.range
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.values.len()
    }

    pub fn min(&self) -> u64 {
        self.values.min()
    }

    pub fn max(&self) -> u64 {
        self.values.max()
    }

    pub fn mean(&self) -> f64 {
        self.values.mean()
    }

    /// Highest value below the given quantile, in `[0.0, 1.0]`
    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        self.values.value_at_quantile(quantile)
    }

    /// Fold another distribution into this one
    pub fn merge(&mut self, other: &HistogramSnapshot) -> Result<()> {
        self.values
            .add(&other.values)
            .map_err(|e| MetricsError::Snapshot(format!("cannot merge histograms: {:?}", e)))
    }
}

/// Value of one instrument in a snapshot
#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Histogram(HistogramSnapshot),
    RangeSampler(HistogramSnapshot),
}

impl MetricValue {
    /// Kind name, as used in log output and JSON summaries
    pub fn kind(&self) -> &'static str {
        match self {
            MetricValue::Counter(_) => "counter",
            MetricValue::Gauge(_) => "gauge",
            MetricValue::Histogram(_) => "histogram",
            MetricValue::RangeSampler(_) => "range-sampler",
        }
    }

    /// The distribution behind a histogram or range sampler value
    pub fn histogram(&self) -> Option<&HistogramSnapshot> {
        match self {
            MetricValue::Histogram(h) | MetricValue::RangeSampler(h) => Some(h),
            _ => None,
        }
    }

    /// Combine a later value for the same instrument into this one.
    ///
    /// Counters add up, gauges keep the later value and distributions merge.
    pub fn merge(&mut self, later: MetricValue) -> Result<()> {
        match (self, later) {
            (MetricValue::Counter(a), MetricValue::Counter(b)) => {
                *a = a.saturating_add(b);
                Ok(())
            }
            (MetricValue::Gauge(a), MetricValue::Gauge(b)) => {
                *a = b;
                Ok(())
            }
            (MetricValue::Histogram(a), MetricValue::Histogram(b))
            | (MetricValue::RangeSampler(a), MetricValue::RangeSampler(b)) => a.merge(&b),
            (current, later) => Err(MetricsError::Snapshot(format!(
                "cannot merge {} into {}",
                later.kind(),
                current.kind()
            ))),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            MetricValue::Counter(v) => json!({ "kind": self.kind(), "value": v }),
            MetricValue::Gauge(v) => json!({ "kind": self.kind(), "value": v }),
            MetricValue::Histogram(h) | MetricValue::RangeSampler(h) => json!({
                "kind": self.kind(),
                "range": {
                    "lowest": h.dynamic_range().lowest_discernible_value(),
                    "highest": h.dynamic_range().highest_trackable_value(),
                    "digits": h.dynamic_range().significant_value_digits(),
                },
                "count": h.count(),
                "min": h.min(),
                "max": h.max(),
                "mean": h.mean(),
                "p50": h.value_at_quantile(0.5),
                "p99": h.value_at_quantile(0.99),
            }),
        }
    }
}

/// All instrument values observed over `[from, to)`
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    metrics: HashMap<InstrumentIdentity, (MeasurementUnit, MetricValue)>,
}

impl TickSnapshot {
    /// Create an empty snapshot for the given window
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            metrics: HashMap::new(),
        }
    }

    /// Collect the current tick from every instrument.
    ///
    /// An instrument that fails to collect, or whose value cannot be merged
    /// with an earlier instrument of the same identity, is logged and left
    /// out. The remaining instruments are still collected, since collection
    /// already drained their tick.
    pub fn collect(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        instruments: &[Arc<dyn Instrument>],
    ) -> Self {
        let mut snapshot = Self::new(from, to);
        for instrument in instruments {
            let identity = instrument.identity();
            let value = match instrument.collect() {
                Ok(value) => value,
                Err(e) => {
                    error!("Error collecting '{}': {}", identity, e);
                    continue;
                }
            };
            if let Err(e) = snapshot.insert(identity.clone(), instrument.unit(), value) {
                error!("Skipping '{}' in tick snapshot: {}", identity, e);
            }
        }
        snapshot
    }

    /// Add a value, merging with an existing value for the same identity
    pub fn insert(
        &mut self,
        identity: InstrumentIdentity,
        unit: MeasurementUnit,
        value: MetricValue,
    ) -> Result<()> {
        match self.metrics.get_mut(&identity) {
            Some((_, existing)) => existing.merge(value),
            None => {
                self.metrics.insert(identity, (unit, value));
                Ok(())
            }
        }
    }

    /// Fold a later snapshot into this one, widening the window to cover both.
    ///
    /// Entries merge one by one. A later entry that conflicts with the kind
    /// already held for its identity is logged and dropped, and the held
    /// value stays as it was.
    pub fn merge(&mut self, later: TickSnapshot) {
        self.from = self.from.min(later.from);
        self.to = self.to.max(later.to);
        for (identity, (unit, value)) in later.metrics {
            match self.metrics.get_mut(&identity) {
                Some((_, existing)) => {
                    if let Err(e) = existing.merge(value) {
                        error!("Dropping '{}' from merged snapshot: {}", identity, e);
                    }
                }
                None => {
                    self.metrics.insert(identity, (unit, value));
                }
            }
        }
    }

    /// Value recorded for an identity
    pub fn get(&self, identity: &InstrumentIdentity) -> Option<&MetricValue> {
        self.metrics.get(identity).map(|(_, value)| value)
    }

    /// Every entry with its unit, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentIdentity, &MeasurementUnit, &MetricValue)> {
        self.metrics
            .iter()
            .map(|(identity, (unit, value))| (identity, unit, value))
    }

    /// Number of distinct identities
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Summarise the snapshot as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let metrics: Vec<serde_json::Value> = entries
            .into_iter()
            .map(|(identity, unit, value)| {
                json!({
                    "name": identity.name,
                    "tags": identity.tags,
                    "unit": unit,
                    "value": value.to_json(),
                })
            })
            .collect();

        json!({
            "from": self.from.to_rfc3339(),
            "to": self.to.to_rfc3339(),
            "metrics": metrics,
        })
    }
}

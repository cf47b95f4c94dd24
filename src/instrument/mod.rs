//! Measurement instruments handed out by the [`InstrumentFactory`](crate::factory::InstrumentFactory).

mod counter;
mod gauge;
mod histogram;
mod range_sampler;

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::Histogram;
pub use range_sampler::RangeSampler;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::snapshot::MetricValue;

/// Physical unit of the values an instrument records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementUnit {
    #[default]
    None,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Percentage,
}

impl MeasurementUnit {
    /// The dimension this unit measures
    pub fn dimension(&self) -> &'static str {
        match self {
            MeasurementUnit::None => "none",
            MeasurementUnit::Nanoseconds
            | MeasurementUnit::Microseconds
            | MeasurementUnit::Milliseconds
            | MeasurementUnit::Seconds => "time",
            MeasurementUnit::Bytes | MeasurementUnit::Kilobytes | MeasurementUnit::Megabytes => {
                "information"
            }
            MeasurementUnit::Percentage => "percentage",
        }
    }
}

/// Name and tags of an instrument. Tags are an unordered set of unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstrumentIdentity {
    pub name: String,
    pub tags: BTreeMap<String, String>,
}

impl InstrumentIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag, replacing any previous value for the key
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for InstrumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self
                .tags
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

/// Common surface of every instrument, used when collecting tick snapshots
pub trait Instrument: Send + Sync + 'static {
    /// Name and tags of this instrument
    fn identity(&self) -> &InstrumentIdentity;

    /// Unit of the recorded values
    fn unit(&self) -> MeasurementUnit;

    /// Take the value for the current tick, resetting per-tick state
    fn collect(&self) -> Result<MetricValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_tags_are_unordered() {
        let a = InstrumentIdentity::new("http.requests")
            .with_tag("method", "GET")
            .with_tag("status", "200");
        let b = InstrumentIdentity::new("http.requests")
            .with_tag("status", "200")
            .with_tag("method", "GET");

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "http.requests{method=GET,status=200}");
    }

    #[test]
    fn test_unit_dimension() {
        assert_eq!(MeasurementUnit::Milliseconds.dimension(), "time");
        assert_eq!(MeasurementUnit::Kilobytes.dimension(), "information");
        assert_eq!(MeasurementUnit::default().dimension(), "none");
    }
}

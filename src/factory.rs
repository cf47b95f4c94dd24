//! Builds instruments with their precision and sampling settings resolved
//! from process-wide defaults and per-name overrides.

use config::{Config, ConfigError, Value};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{parse_duration, require_duration, require_int};
use crate::error::{MetricsError, Result};
use crate::instrument::{Counter, Gauge, Histogram, InstrumentIdentity, MeasurementUnit, RangeSampler};
use crate::range::{self, CustomInstrumentSettings, DynamicRange};

const HISTOGRAM_DEFAULTS: &str = "default-settings.histogram";
const RANGE_SAMPLER_DEFAULTS: &str = "default-settings.range-sampler";
const CUSTOM_SETTINGS: &str = "custom-settings";

const LOWEST_DISCERNIBLE_VALUE: &str = "lowest-discernible-value";
const HIGHEST_TRACKABLE_VALUE: &str = "highest-trackable-value";
const SIGNIFICANT_VALUE_DIGITS: &str = "significant-value-digits";
const SAMPLE_INTERVAL: &str = "sample-interval";

/// Process-wide instrument settings, built once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFactoryConfig {
    pub default_histogram_range: DynamicRange,
    pub default_range_sampler_range: DynamicRange,
    pub default_sample_interval: Duration,
    pub custom_settings: HashMap<String, CustomInstrumentSettings>,
}

impl InstrumentFactoryConfig {
    /// Read the defaults and per-name overrides from a key-value source.
    ///
    /// Missing or malformed defaults are fatal. Override sections without
    /// any recognised key are skipped.
    pub fn from_config(config: &Config) -> Result<Self> {
        let default_histogram_range = read_dynamic_range(config, HISTOGRAM_DEFAULTS)?;
        let default_range_sampler_range = read_dynamic_range(config, RANGE_SAMPLER_DEFAULTS)?;
        let default_sample_interval =
            require_duration(config, &format!("{}.{}", RANGE_SAMPLER_DEFAULTS, SAMPLE_INTERVAL))?;

        let sections = match config.get_table(CUSTOM_SETTINGS) {
            Ok(sections) => sections,
            Err(ConfigError::NotFound(_)) => Default::default(),
            Err(e) => return Err(MetricsError::config_key(CUSTOM_SETTINGS, e)),
        };

        let mut custom_settings = HashMap::new();
        for (name, section) in sections {
            let settings = read_custom_settings(&name, section)?;
            if settings.is_empty() {
                debug!("Skipping empty custom settings for '{}'", name);
                continue;
            }
            custom_settings.insert(name, settings);
        }

        let settings = Self {
            default_histogram_range,
            default_range_sampler_range,
            default_sample_interval,
            custom_settings,
        };
        settings.resolve_overrides()?;

        debug!(
            "Loaded instrument settings with {} custom override(s)",
            settings.custom_settings.len()
        );
        Ok(settings)
    }

    /// Resolve every override against both type defaults.
    ///
    /// An override whose merged range is invalid for either instrument type
    /// is a configuration error.
    fn resolve_overrides(&self) -> Result<HashMap<String, ResolvedRanges>> {
        self.custom_settings
            .iter()
            .map(|(name, custom)| -> Result<(String, ResolvedRanges)> {
                let key = format!("{}.{}", CUSTOM_SETTINGS, name);
                let histogram = range::resolve(self.default_histogram_range, Some(custom))
                    .map_err(|e| MetricsError::config_key(&key, e))?;
                let range_sampler = range::resolve(self.default_range_sampler_range, Some(custom))
                    .map_err(|e| MetricsError::config_key(&key, e))?;
                Ok((
                    name.clone(),
                    ResolvedRanges {
                        histogram,
                        range_sampler,
                    },
                ))
            })
            .collect()
    }
}

/// Override ranges merged with each type default
#[derive(Debug, Clone, Copy)]
struct ResolvedRanges {
    histogram: DynamicRange,
    range_sampler: DynamicRange,
}

fn read_dynamic_range(config: &Config, prefix: &str) -> Result<DynamicRange> {
    let lowest_key = format!("{}.{}", prefix, LOWEST_DISCERNIBLE_VALUE);
    let highest_key = format!("{}.{}", prefix, HIGHEST_TRACKABLE_VALUE);
    let digits_key = format!("{}.{}", prefix, SIGNIFICANT_VALUE_DIGITS);

    let lowest = to_u64(&lowest_key, require_int(config, &lowest_key)?)?;
    let highest = to_u64(&highest_key, require_int(config, &highest_key)?)?;
    let digits = to_u8(&digits_key, require_int(config, &digits_key)?)?;

    DynamicRange::new(lowest, highest, digits).map_err(|e| MetricsError::config_key(prefix, e))
}

fn to_u64(key: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| MetricsError::config_key(key, "must not be negative"))
}

fn to_u8(key: &str, value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| MetricsError::config_key(key, "out of range"))
}

/// Parse one `custom-settings.<name>` section. Presence of a key, not its
/// value, decides whether the field overrides the default.
fn read_custom_settings(name: &str, section: Value) -> Result<CustomInstrumentSettings> {
    let prefix = format!("{}.{}", CUSTOM_SETTINGS, name);
    let mut table = section
        .into_table()
        .map_err(|e| MetricsError::config_key(&prefix, e))?;

    let mut int_field = |field: &str| -> Result<Option<i64>> {
        table
            .remove(field)
            .map(|value| {
                value
                    .into_int()
                    .map_err(|e| MetricsError::config_key(&format!("{}.{}", prefix, field), e))
            })
            .transpose()
    };

    let lowest_discernible_value = int_field(LOWEST_DISCERNIBLE_VALUE)?
        .map(|v| -> Result<u64> {
            let key = format!("{}.{}", prefix, LOWEST_DISCERNIBLE_VALUE);
            match to_u64(&key, v)? {
                0 => Err(MetricsError::config_key(&key, "must be at least 1")),
                v => Ok(v),
            }
        })
        .transpose()?;
    let highest_trackable_value = int_field(HIGHEST_TRACKABLE_VALUE)?
        .map(|v| to_u64(&format!("{}.{}", prefix, HIGHEST_TRACKABLE_VALUE), v))
        .transpose()?;
    let significant_value_digits = int_field(SIGNIFICANT_VALUE_DIGITS)?
        .map(|v| -> Result<u8> {
            let key = format!("{}.{}", prefix, SIGNIFICANT_VALUE_DIGITS);
            match to_u8(&key, v)? {
                d if d > range::MAX_SIGNIFICANT_VALUE_DIGITS => {
                    Err(MetricsError::config_key(&key, "must be between 0 and 5"))
                }
                d => Ok(d),
            }
        })
        .transpose()?;

    let sample_interval = table
        .remove(SAMPLE_INTERVAL)
        .map(|value| -> Result<Duration> {
            let key = format!("{}.{}", prefix, SAMPLE_INTERVAL);
            let raw = value
                .into_string()
                .map_err(|e| MetricsError::config_key(&key, e))?;
            parse_duration(&raw).map_err(|e| MetricsError::config_key(&key, e))
        })
        .transpose()?;

    Ok(CustomInstrumentSettings {
        lowest_discernible_value,
        highest_trackable_value,
        significant_value_digits,
        sample_interval,
    })
}

/// Builds instruments from an immutable [`InstrumentFactoryConfig`].
///
/// Cheap to clone and safe to share between threads. Every build call
/// returns a new, independent instrument and never fails.
#[derive(Debug, Clone)]
pub struct InstrumentFactory {
    config: Arc<InstrumentFactoryConfig>,
    resolved: Arc<HashMap<String, ResolvedRanges>>,
}

impl InstrumentFactory {
    /// Create a factory, resolving every per-name override up front
    pub fn new(config: Arc<InstrumentFactoryConfig>) -> Result<Self> {
        let resolved = config.resolve_overrides()?;
        Ok(Self {
            config,
            resolved: Arc::new(resolved),
        })
    }

    /// Load the settings from a key-value source and build a factory
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = InstrumentFactoryConfig::from_config(config)?;
        info!(
            "Instrument factory ready: histogram {:?}, range sampler {:?} every {:?}",
            settings.default_histogram_range,
            settings.default_range_sampler_range,
            settings.default_sample_interval
        );
        Self::new(Arc::new(settings))
    }

    /// Settings this factory was built from
    pub fn config(&self) -> &InstrumentFactoryConfig {
        &self.config
    }

    fn custom_settings(&self, name: &str) -> Option<&CustomInstrumentSettings> {
        self.config.custom_settings.get(name)
    }

    fn histogram_range_for(&self, name: &str, explicit: Option<DynamicRange>) -> DynamicRange {
        let configured = self.resolved.get(name).map(|r| r.histogram);
        range::pick(explicit, configured, self.config.default_histogram_range)
    }

    fn range_sampler_range_for(&self, name: &str, explicit: Option<DynamicRange>) -> DynamicRange {
        let configured = self.resolved.get(name).map(|r| r.range_sampler);
        range::pick(explicit, configured, self.config.default_range_sampler_range)
    }

    fn sample_interval_for(&self, name: &str, explicit: Option<Duration>) -> Duration {
        range::pick(
            explicit,
            self.custom_settings(name).and_then(|c| c.sample_interval),
            self.config.default_sample_interval,
        )
    }

    /// Build a histogram. An explicit range wins over any configured one.
    pub fn build_histogram(
        &self,
        identity: InstrumentIdentity,
        unit: MeasurementUnit,
        explicit_range: Option<DynamicRange>,
    ) -> Histogram {
        let range = self.histogram_range_for(&identity.name, explicit_range);
        Histogram::new(identity, unit, range)
    }

    /// Build a range sampler around a freshly built histogram.
    ///
    /// The returned sampler is not sampling yet; see
    /// [`RangeSampler::spawn_sampling`].
    pub fn build_range_sampler(
        &self,
        identity: InstrumentIdentity,
        unit: MeasurementUnit,
        explicit_range: Option<DynamicRange>,
        explicit_interval: Option<Duration>,
    ) -> RangeSampler {
        let range = self.range_sampler_range_for(&identity.name, explicit_range);
        let interval = self.sample_interval_for(&identity.name, explicit_interval);
        RangeSampler::new(Histogram::new(identity, unit, range), interval)
    }

    /// Build a counter; counters carry no precision settings
    pub fn build_counter(&self, identity: InstrumentIdentity, unit: MeasurementUnit) -> Counter {
        Counter::new(identity, unit)
    }

    /// Build a gauge; gauges carry no precision settings
    pub fn build_gauge(&self, identity: InstrumentIdentity, unit: MeasurementUnit) -> Gauge {
        Gauge::new(identity, unit)
    }
}

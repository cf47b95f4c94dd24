//! Value-tracking precision for histograms and the per-instrument override
//! settings that refine it.

use std::time::Duration;

use crate::error::{MetricsError, Result};

/// Highest number of significant value digits a histogram can track.
pub const MAX_SIGNIFICANT_VALUE_DIGITS: u8 = 5;

/// Precision and trackable span of a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicRange {
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_value_digits: u8,
}

impl DynamicRange {
    /// Create a validated dynamic range.
    ///
    /// This is narrower than `highest > lowest`: the highest trackable value
    /// must be at least twice the lowest discernible value, the minimum the
    /// underlying HDR histogram accepts. A pair such as `(10, 15)` is
    /// rejected. Combinations of lowest value and digits that the histogram
    /// cannot represent are rejected too, so building a histogram from a
    /// `DynamicRange` never fails.
    pub fn new(
        lowest_discernible_value: u64,
        highest_trackable_value: u64,
        significant_value_digits: u8,
    ) -> Result<Self> {
        if lowest_discernible_value < 1 {
            return Err(MetricsError::Config(
                "lowest discernible value must be at least 1".to_string(),
            ));
        }
        if lowest_discernible_value > u64::MAX / 2 {
            return Err(MetricsError::Config(format!(
                "lowest discernible value {} exceeds the trackable maximum",
                lowest_discernible_value
            )));
        }
        if highest_trackable_value < lowest_discernible_value * 2 {
            return Err(MetricsError::Config(format!(
                "highest trackable value {} must be at least twice the lowest discernible value {}",
                highest_trackable_value, lowest_discernible_value
            )));
        }
        if significant_value_digits > MAX_SIGNIFICANT_VALUE_DIGITS {
            return Err(MetricsError::Config(format!(
                "significant value digits must be between 0 and {}, got {}",
                MAX_SIGNIFICANT_VALUE_DIGITS, significant_value_digits
            )));
        }

        // unit magnitude plus sub-bucket magnitude has to fit in a u64
        let largest_single_unit = 2 * 10_u32.pow(u32::from(significant_value_digits));
        let sub_bucket_magnitude = largest_single_unit.next_power_of_two().ilog2();
        if lowest_discernible_value.ilog2() + sub_bucket_magnitude > 62 {
            return Err(MetricsError::Config(format!(
                "cannot track {} significant digits above {}",
                significant_value_digits, lowest_discernible_value
            )));
        }

        Ok(Self {
            lowest_discernible_value,
            highest_trackable_value,
            significant_value_digits,
        })
    }

    /// Smallest value distinguishable from zero
    pub fn lowest_discernible_value(&self) -> u64 {
        self.lowest_discernible_value
    }

    /// Largest value that can be recorded
    pub fn highest_trackable_value(&self) -> u64 {
        self.highest_trackable_value
    }

    /// Decimal digits of precision kept across the range
    pub fn significant_value_digits(&self) -> u8 {
        self.significant_value_digits
    }
}

/// Per-instrument-name overrides. Every field is independent: an unset field
/// inherits the default for that field only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomInstrumentSettings {
    pub lowest_discernible_value: Option<u64>,
    pub highest_trackable_value: Option<u64>,
    pub significant_value_digits: Option<u8>,
    pub sample_interval: Option<Duration>,
}

impl CustomInstrumentSettings {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        !self.overrides_range() && self.sample_interval.is_none()
    }

    /// True when at least one of the three range fields is set
    pub fn overrides_range(&self) -> bool {
        self.lowest_discernible_value.is_some()
            || self.highest_trackable_value.is_some()
            || self.significant_value_digits.is_some()
    }
}

/// Precedence chain for a single setting: explicit call argument, then the
/// per-name override, then the type default.
pub fn pick<T: Copy>(explicit: Option<T>, custom: Option<T>, default: T) -> T {
    explicit.or(custom).unwrap_or(default)
}

/// Resolve a dynamic range against optional per-name overrides, field by field.
///
/// Each field takes the override when present and the default otherwise; no
/// field ever influences another. Fails only when the merged triple is not a
/// valid range, which the factory checks once when loading its settings.
pub fn resolve(
    default: DynamicRange,
    custom: Option<&CustomInstrumentSettings>,
) -> Result<DynamicRange> {
    let custom = match custom {
        Some(custom) if custom.overrides_range() => custom,
        _ => return Ok(default),
    };

    DynamicRange::new(
        pick(None, custom.lowest_discernible_value, default.lowest_discernible_value),
        pick(None, custom.highest_trackable_value, default.highest_trackable_value),
        pick(None, custom.significant_value_digits, default.significant_value_digits),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_range() -> DynamicRange {
        DynamicRange::new(1, 3_600_000_000, 2).unwrap()
    }

    #[test]
    fn test_new_validates_bounds() {
        assert!(DynamicRange::new(0, 100, 2).is_err());
        assert!(DynamicRange::new(10, 15, 2).is_err());
        assert!(DynamicRange::new(1, 100, 6).is_err());
        assert!(DynamicRange::new(1, 2, 0).is_ok());
        assert!(DynamicRange::new(1, u64::MAX, 5).is_ok());
        assert!(DynamicRange::new(1 << 58, u64::MAX, 5).is_err());
    }

    #[test]
    fn test_resolve_without_override_returns_default() {
        assert_eq!(resolve(default_range(), None).unwrap(), default_range());

        let only_interval = CustomInstrumentSettings {
            sample_interval: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        assert_eq!(
            resolve(default_range(), Some(&only_interval)).unwrap(),
            default_range()
        );
    }

    #[test]
    fn test_resolve_digits_only() {
        let custom = CustomInstrumentSettings {
            significant_value_digits: Some(3),
            ..Default::default()
        };
        let resolved = resolve(default_range(), Some(&custom)).unwrap();

        assert_eq!(resolved.lowest_discernible_value(), 1);
        assert_eq!(resolved.highest_trackable_value(), 3_600_000_000);
        assert_eq!(resolved.significant_value_digits(), 3);
    }

    #[test]
    fn test_fields_resolve_independently() {
        let low = CustomInstrumentSettings {
            lowest_discernible_value: Some(1000),
            ..Default::default()
        };
        let resolved = resolve(default_range(), Some(&low)).unwrap();
        assert_eq!(resolved.lowest_discernible_value(), 1000);
        assert_eq!(resolved.highest_trackable_value(), 3_600_000_000);
        assert_eq!(resolved.significant_value_digits(), 2);

        let high = CustomInstrumentSettings {
            highest_trackable_value: Some(60_000),
            ..Default::default()
        };
        let resolved = resolve(default_range(), Some(&high)).unwrap();
        assert_eq!(resolved.lowest_discernible_value(), 1);
        assert_eq!(resolved.highest_trackable_value(), 60_000);
        assert_eq!(resolved.significant_value_digits(), 2);
    }

    #[test]
    fn test_inconsistent_override_is_an_error() {
        let custom = CustomInstrumentSettings {
            lowest_discernible_value: Some(5_000_000_000),
            significant_value_digits: Some(3),
            ..Default::default()
        };
        assert!(resolve(default_range(), Some(&custom)).is_err());
    }

    #[test]
    fn test_pick_precedence() {
        assert_eq!(pick(Some(1), Some(2), 3), 1);
        assert_eq!(pick(None, Some(2), 3), 2);
        assert_eq!(pick(None, None, 3), 3);
    }
}

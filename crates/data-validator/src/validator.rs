//! Data Validator for Range Checking

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Mean wind speed range (m/s), upper bound exclusive
    pub wind_speed_range: (f64, f64),
    /// Gust speed range (m/s), upper bound exclusive
    pub wind_gust_range: (f64, f64),
    /// Wind direction range (degrees), both bounds inclusive
    pub wind_direction_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            wind_speed_range: (0.0, 100.0),
            wind_gust_range: (0.0, 100.0),
            wind_direction_range: (0.0, 360.0),
        }
    }
}

/// Result of validating one observation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all present values are valid
    pub valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// Number of present (non-null) fields checked
    pub fields_checked: usize,
}

impl ValidationResult {
    /// Create a valid result
    pub fn valid(fields_checked: usize) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            fields_checked,
        }
    }

    /// Create an invalid result with errors
    pub fn invalid(errors: Vec<ValidationError>, fields_checked: usize) -> Self {
        Self {
            valid: false,
            errors,
            fields_checked,
        }
    }
}

/// Validator for wind observations
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::NotFinite { field })
        }
    }

    /// Validate a value against a half-open range `[min, max)`
    pub fn validate_half_open(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        Self::check_finite(field, value)?;
        if value < range.0 || value >= range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a value against a closed range `[min, max]`
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        Self::check_finite(field, value)?;
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate mean wind speed
    pub fn validate_wind_speed(&self, speed: f64) -> Result<(), ValidationError> {
        self.validate_half_open("wind_speed", speed, self.config.wind_speed_range)
    }

    /// Validate gust speed
    pub fn validate_wind_gust(&self, gust: f64) -> Result<(), ValidationError> {
        self.validate_half_open("wind_gust", gust, self.config.wind_gust_range)
    }

    /// Validate wind direction
    pub fn validate_wind_direction(&self, direction: f64) -> Result<(), ValidationError> {
        self.validate_range("wind_direction", direction, self.config.wind_direction_range)
    }

    /// Validate every present measurement of an observation.
    ///
    /// Absent values are not errors; an observation with no values at all is
    /// valid with zero fields checked.
    pub fn validate_wind(
        &self,
        speed: Option<f64>,
        gust: Option<f64>,
        direction: Option<f64>,
    ) -> ValidationResult {
        let checks = [
            speed.map(|v| self.validate_wind_speed(v)),
            gust.map(|v| self.validate_wind_gust(v)),
            direction.map(|v| self.validate_wind_direction(v)),
        ];

        let fields_checked = checks.iter().flatten().count();
        let errors: Vec<_> = checks
            .into_iter()
            .flatten()
            .filter_map(Result::err)
            .collect();

        if errors.is_empty() {
            ValidationResult::valid(fields_checked)
        } else {
            debug!("Observation rejected: {:?}", errors);
            ValidationResult::invalid(errors, fields_checked)
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wind_speed_range() {
        let validator = Validator::default();
        assert!(validator.validate_wind_speed(0.0).is_ok());
        assert!(validator.validate_wind_speed(5.2).is_ok());
        assert!(validator.validate_wind_speed(-0.1).is_err());
        assert!(validator.validate_wind_speed(100.0).is_err());
    }

    #[test]
    fn test_direction_range() {
        let validator = Validator::default();
        assert!(validator.validate_wind_direction(0.0).is_ok());
        assert!(validator.validate_wind_direction(360.0).is_ok());
        assert!(validator.validate_wind_direction(361.0).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let validator = Validator::default();
        assert_eq!(
            validator.validate_wind_speed(f64::NAN),
            Err(ValidationError::NotFinite { field: "wind_speed" })
        );
    }

    #[test]
    fn test_absent_values_are_not_errors() {
        let validator = Validator::default();
        let result = validator.validate_wind(Some(3.0), None, None);
        assert!(result.valid);
        assert_eq!(result.fields_checked, 1);

        let empty = validator.validate_wind(None, None, None);
        assert!(empty.valid);
        assert_eq!(empty.fields_checked, 0);
    }

    #[test]
    fn test_one_bad_field_invalidates_observation() {
        let validator = Validator::default();
        let result = validator.validate_wind(Some(-3.0), Some(4.0), Some(400.0));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.fields_checked, 3);
    }

    proptest! {
        #[test]
        fn prop_directions_within_compass_are_valid(direction in 0.0f64..=360.0) {
            let validator = Validator::default();
            prop_assert!(validator.validate_wind_direction(direction).is_ok());
        }

        #[test]
        fn prop_negative_speeds_are_rejected(speed in -1000.0f64..-0.0001) {
            let validator = Validator::default();
            prop_assert!(!validator.validate_wind(Some(speed), None, None).valid);
        }
    }
}

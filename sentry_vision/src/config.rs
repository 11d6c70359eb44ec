//! Tunable parameters of the tracking pipeline

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core_modules::decision::AxisPolicy;
use crate::core_modules::pixel::{HsvRange, RED_HIGH, RED_LOW};
use crate::error::ConfigError;

/// Complete vision configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VisionConfig {
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
    pub dispatch: DispatchConfig,
}

impl VisionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.blur_kernel % 2 == 0 {
            return Err(ConfigError::invalid(
                "vision.detection.blur_kernel",
                "Blur kernel size must be odd",
            ));
        }

        if self.detection.morph_kernel == 0 {
            return Err(ConfigError::invalid(
                "vision.detection.morph_kernel",
                "Morphology kernel size must be greater than 0",
            ));
        }

        if self.detection.ranges.is_empty() {
            return Err(ConfigError::invalid(
                "vision.detection.ranges",
                "At least one HSV range is required",
            ));
        }

        for (i, range) in self.detection.ranges.iter().enumerate() {
            if range.lower.iter().zip(range.upper.iter()).any(|(low, high)| low > high) {
                return Err(ConfigError::invalid(
                    &format!("vision.detection.ranges[{i}]"),
                    "Lower bound must not exceed upper bound",
                ));
            }
        }

        if self.tracking.deadzone <= 0 {
            return Err(ConfigError::invalid(
                "vision.tracking.deadzone",
                "Deadzone must be greater than 0",
            ));
        }

        if self.dispatch.resend_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "vision.dispatch.resend_interval_ms",
                "Resend interval must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Color detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Gaussian blur kernel size (odd)
    pub blur_kernel: usize,
    /// Square structuring element size for close/open
    pub morph_kernel: usize,
    /// HSV ranges whose union is the target color
    pub ranges: Vec<HsvRange>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 7,
            morph_kernel: 5,
            ranges: vec![RED_LOW, RED_HIGH],
        }
    }
}

/// Target selection and steering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Regions must be strictly larger than this many pixels
    pub min_area: u64,
    /// Centering tolerance in pixels
    pub deadzone: i32,
    pub axis_policy: AxisPolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_area: 500,
            deadzone: 50,
            axis_policy: AxisPolicy::DominantAxis,
        }
    }
}

/// Command debouncing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum time between repeats of the same intent
    pub resend_interval_ms: u64,
    /// Speed field of MOVE_DIR commands
    pub speed: u8,
}

impl DispatchConfig {
    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            resend_interval_ms: 100,
            speed: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VisionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking.deadzone, 50);
        assert_eq!(config.tracking.min_area, 500);
        assert_eq!(config.dispatch.resend_interval(), Duration::from_millis(100));
        assert_eq!(config.detection.ranges, vec![RED_LOW, RED_HIGH]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: VisionConfig =
            serde_json::from_str(r#"{"tracking":{"deadzone":30,"axis_policy":"independent"}}"#)
                .expect("parse");
        assert_eq!(config.tracking.deadzone, 30);
        assert_eq!(config.tracking.axis_policy, AxisPolicy::Independent);
        assert_eq!(config.tracking.min_area, 500);
        assert_eq!(config.detection.blur_kernel, 7);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = VisionConfig::default();
        config.detection.blur_kernel = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "vision.detection.blur_kernel"
        ));

        let mut config = VisionConfig::default();
        config.detection.ranges = vec![HsvRange::new([20, 0, 0], [10, 255, 255])];
        assert!(config.validate().is_err());

        let mut config = VisionConfig::default();
        config.tracking.deadzone = 0;
        assert!(config.validate().is_err());
    }
}

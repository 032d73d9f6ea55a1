//! Environment-driven settings for the DK1 driver and the fusion filter.

use crate::types::UserProfile;
use std::str::FromStr;

/// Settings for [`RiftDriver`](crate::device::RiftDriver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Keep-alive interval requested from the tracker, in milliseconds.
    pub keep_alive_ms: u16,
    /// Capacity of the sample channel between the reader thread and the session.
    pub channel_capacity: usize,
    /// Report samples in raw sensor coordinates instead of the HMD frame.
    pub sensor_coordinates: bool,
    /// Profile to associate with the opened HMD.
    pub profile: Option<UserProfile>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: 10_000,
            channel_capacity: 256,
            sensor_coordinates: false,
            profile: None,
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `RIFT_KEEP_ALIVE_MS`, `RIFT_CHANNEL_CAPACITY`
    /// and `RIFT_SENSOR_COORDINATES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            keep_alive_ms: read_env_parse("RIFT_KEEP_ALIVE_MS", defaults.keep_alive_ms).max(1000),
            channel_capacity: read_env_parse("RIFT_CHANNEL_CAPACITY", defaults.channel_capacity)
                .max(1),
            sensor_coordinates: read_env_bool(
                "RIFT_SENSOR_COORDINATES",
                defaults.sensor_coordinates,
            ),
            profile: None,
        }
    }
}

/// Settings for [`OrientationFusion`](crate::fusion::OrientationFusion).
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Correct pitch/roll drift toward the measured gravity vector.
    pub gravity_correction: bool,
    /// Quaternion distance beyond which a new magnetic yaw reference is captured.
    pub mag_ref_distance: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gravity_correction: true,
            mag_ref_distance: 0.5,
        }
    }
}

impl FusionConfig {
    /// Defaults overridden by `HMD_GRAVITY_CORRECTION` and `HMD_MAG_REF_DISTANCE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gravity_correction: read_env_bool(
                "HMD_GRAVITY_CORRECTION",
                defaults.gravity_correction,
            ),
            mag_ref_distance: read_env_parse("HMD_MAG_REF_DISTANCE", defaults.mag_ref_distance),
        }
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        assert_eq!(read_env_parse("RIFTCORE_TEST_UNSET_U16", 42u16), 42);
        assert!(read_env_bool("RIFTCORE_TEST_UNSET_BOOL", true));
    }

    #[test]
    fn test_fusion_defaults() {
        let config = FusionConfig::default();
        assert!(config.gravity_correction);
        assert_eq!(config.mag_ref_distance, 0.5);
    }
}

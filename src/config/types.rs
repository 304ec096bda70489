use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::constants::{
    DEFAULT_DATA_RETENTION_MINUTES, DEFAULT_DEVICE_ID, DEFAULT_MAX_ACCEPTABLE_HEART_RATE,
    DEFAULT_MAX_NORMAL_HEART_RATE, DEFAULT_MIN_NORMAL_HEART_RATE, DEFAULT_PROVIDER_KEY,
    DEFAULT_PULSE_READING_INTERVAL,
};
use crate::error::ConfigError;

/// Bounds used to classify a pulse rate, in beats per minute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartRateThresholds {
    pub min_normal_heart_rate: u32,
    pub max_normal_heart_rate: u32,
    pub max_acceptable_heart_rate: u32,
}

impl Default for HeartRateThresholds {
    fn default() -> Self {
        HeartRateThresholds {
            min_normal_heart_rate: DEFAULT_MIN_NORMAL_HEART_RATE,
            max_normal_heart_rate: DEFAULT_MAX_NORMAL_HEART_RATE,
            max_acceptable_heart_rate: DEFAULT_MAX_ACCEPTABLE_HEART_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    #[serde(flatten)]
    pub thresholds: HeartRateThresholds,
    pub pulse_reading_interval_ms: u64,
    pub data_retention_minutes: u32,
    // passed to DeviceManager::connect_to_device by the connect command
    pub device_id: String,
    // a provider is selected when its name contains this key
    pub provider_key: String,
    // when the vendor has no data point, return a placeholder sample instead of failing
    pub fallback_to_placeholder: bool,
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.min_normal_heart_rate > t.max_normal_heart_rate || t.max_normal_heart_rate > t.max_acceptable_heart_rate {
            return Err(ConfigError::InvalidThresholds {
                min_normal: t.min_normal_heart_rate,
                max_normal: t.max_normal_heart_rate,
                max_acceptable: t.max_acceptable_heart_rate,
            });
        }

        if self.pulse_reading_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(())
    }

    pub fn pulse_reading_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_reading_interval_ms)
    }

    pub fn data_retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.data_retention_minutes))
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            thresholds: HeartRateThresholds::default(),
            pulse_reading_interval_ms: DEFAULT_PULSE_READING_INTERVAL,
            data_retention_minutes: DEFAULT_DATA_RETENTION_MINUTES,
            device_id: DEFAULT_DEVICE_ID.to_string(),
            provider_key: DEFAULT_PROVIDER_KEY.to_string(),
            fallback_to_placeholder: true,
        }
    }
}

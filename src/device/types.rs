use chrono::{DateTime, Local};

use crate::config::types::HeartRateThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthDataType {
    Pulse,
    HeartRate,
    BloodPressure,
    Steps,
    Sleep,
    Calories,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseQuality {
    #[default]
    Unknown,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl PulseQuality {
    /// Classify a pulse rate against the configured bounds.
    ///
    /// - below min normal: Poor
    /// - min normal ..= max normal: Good
    /// - above max normal, up to max acceptable: Fair
    /// - above max acceptable: Poor
    pub fn classify(rate: u32, thresholds: &HeartRateThresholds) -> PulseQuality {
        if rate < thresholds.min_normal_heart_rate {
            PulseQuality::Poor
        }
        else if rate <= thresholds.max_normal_heart_rate {
            PulseQuality::Good
        }
        else if rate <= thresholds.max_acceptable_heart_rate {
            PulseQuality::Fair
        }
        else {
            PulseQuality::Poor
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            PulseQuality::Excellent => "#4CAF50",
            PulseQuality::Good => "#8BC34A",
            PulseQuality::Fair => "#FFC107",
            PulseQuality::Poor => "#FF5722",
            PulseQuality::Unknown => "#9E9E9E",
        }
    }
}

impl std::fmt::Display for PulseQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            PulseQuality::Excellent => "Excellent",
            PulseQuality::Good => "Good",
            PulseQuality::Fair => "Fair",
            PulseQuality::Poor => "Poor",
            PulseQuality::Unknown => "Unknown",
        };

        write!(f, "{}", result)
    }
}

/// One heart rate reading. Built fresh for every read or push and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseSample {
    pub timestamp: DateTime<Local>,
    pub device_id: String,
    pub device_name: String,
    pub data_type: HealthDataType,
    pub pulse_rate: u32,
    pub min_pulse_rate: Option<u32>,
    pub max_pulse_rate: Option<u32>,
    pub average_pulse_rate: Option<f64>,
    pub quality: PulseQuality,
    // false for placeholder samples that carry no vendor data
    pub real_time: bool,
}

impl PulseSample {
    pub fn new(
        timestamp: DateTime<Local>,
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        pulse_rate: u32,
        thresholds: &HeartRateThresholds,
        real_time: bool,
    ) -> Self {
        PulseSample {
            timestamp,
            device_id: device_id.into(),
            device_name: device_name.into(),
            data_type: HealthDataType::Pulse,
            pulse_rate,
            min_pulse_rate: None,
            max_pulse_rate: None,
            average_pulse_rate: None,
            quality: PulseQuality::classify(pulse_rate, thresholds),
            real_time,
        }
    }

    pub fn with_range(mut self, min: u32, max: u32, average: f64) -> Self {
        self.min_pulse_rate = Some(min);
        self.max_pulse_rate = Some(max);
        self.average_pulse_rate = Some(average);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Connected,
    Monitoring,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    PulseReceived(PulseSample),
    ConnectionStatusChanged(String),
    ErrorOccurred(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HeartRateThresholds {
        HeartRateThresholds {
            min_normal_heart_rate: 60,
            max_normal_heart_rate: 100,
            max_acceptable_heart_rate: 120,
        }
    }

    #[test]
    fn classify_boundaries() {
        let t = thresholds();
        assert_eq!(PulseQuality::classify(0, &t), PulseQuality::Poor);
        assert_eq!(PulseQuality::classify(59, &t), PulseQuality::Poor);
        assert_eq!(PulseQuality::classify(60, &t), PulseQuality::Good);
        assert_eq!(PulseQuality::classify(100, &t), PulseQuality::Good);
        assert_eq!(PulseQuality::classify(101, &t), PulseQuality::Fair);
        assert_eq!(PulseQuality::classify(120, &t), PulseQuality::Fair);
        assert_eq!(PulseQuality::classify(121, &t), PulseQuality::Poor);
        assert_eq!(PulseQuality::classify(250, &t), PulseQuality::Poor);
    }

    #[test]
    fn classify_follows_configured_bounds() {
        let t = HeartRateThresholds {
            min_normal_heart_rate: 50,
            max_normal_heart_rate: 70,
            max_acceptable_heart_rate: 90,
        };
        assert_eq!(PulseQuality::classify(55, &t), PulseQuality::Good);
        assert_eq!(PulseQuality::classify(82, &t), PulseQuality::Fair);
        assert_eq!(PulseQuality::classify(95, &t), PulseQuality::Poor);
    }

    #[test]
    fn classify_is_stable() {
        let t = thresholds();
        for rate in 0..200 {
            assert_eq!(PulseQuality::classify(rate, &t), PulseQuality::classify(rate, &t));
        }
    }

    #[test]
    fn quality_display_table() {
        assert_eq!(PulseQuality::Excellent.to_string(), "Excellent");
        assert_eq!(PulseQuality::Unknown.to_string(), "Unknown");
        assert_eq!(PulseQuality::Excellent.color(), "#4CAF50");
        assert_eq!(PulseQuality::Good.color(), "#8BC34A");
        assert_eq!(PulseQuality::Fair.color(), "#FFC107");
        assert_eq!(PulseQuality::Poor.color(), "#FF5722");
        assert_eq!(PulseQuality::Unknown.color(), "#9E9E9E");
    }

    #[test]
    fn sample_quality_is_derived_from_rate() {
        let sample = PulseSample::new(Local::now(), "id", "Watch", 82, &thresholds(), true);
        assert_eq!(sample.quality, PulseQuality::Good);
        assert_eq!(sample.data_type, HealthDataType::Pulse);
        assert_eq!(sample.min_pulse_rate, None);

        let sample = sample.with_range(70, 90, 80.5);
        assert_eq!(sample.max_pulse_rate, Some(90));
        assert_eq!(sample.average_pulse_rate, Some(80.5));
    }
}

//! In-process stand-in for the vendor health SDK.
//!
//! Used by the `--simulate` mode of the desktop app and by tests. Readings are either scripted
//! with [`SimulatedHmsClient::push_reading`] or, when `generate` is enabled, synthesized around a
//! resting heart rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::debug;
use uuid::Uuid;

use crate::device::hms::{HeartRatePoint, HmsClient, HmsSession};
use crate::error::SdkError;

#[derive(Debug, Default)]
struct Failures {
    sign_in: Option<String>,
    subscribe: Option<String>,
    read: Option<String>,
    close: Option<String>,
}

pub struct SimulatedHmsClient {
    available: AtomicBool,
    generate: AtomicBool,
    subscribed: AtomicBool,
    tick: AtomicU32,
    session: Mutex<HmsSession>,
    readings: Mutex<VecDeque<Vec<f64>>>,
    failures: Mutex<Failures>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedHmsClient {
    pub fn new() -> Self {
        SimulatedHmsClient {
            available: AtomicBool::new(true),
            generate: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            tick: AtomicU32::new(0),
            session: Mutex::new(HmsSession {
                device_id: Some(format!("sim-{}", Uuid::new_v4())),
                device_name: Some("Simulated Watch".to_string()),
            }),
            readings: Mutex::new(VecDeque::new()),
            failures: Mutex::new(Failures::default()),
        }
    }

    /// A client that synthesizes a plausible heart rate on every read.
    pub fn generating() -> Self {
        let client = SimulatedHmsClient::new();
        client.generate.store(true, Ordering::Relaxed);
        client
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn set_device(&self, device_id: Option<&str>, device_name: Option<&str>) {
        *locked(&self.session) = HmsSession {
            device_id: device_id.map(str::to_string),
            device_name: device_name.map(str::to_string),
        };
    }

    /// Queue the points returned by the next read. Reads beyond the queue return no points
    /// (unless generating).
    pub fn push_reading(&self, heart_rates: &[f64]) {
        locked(&self.readings).push_back(heart_rates.to_vec());
    }

    pub fn fail_sign_in(&self, reason: Option<&str>) {
        locked(&self.failures).sign_in = reason.map(str::to_string);
    }

    pub fn fail_subscribe(&self, reason: Option<&str>) {
        locked(&self.failures).subscribe = reason.map(str::to_string);
    }

    pub fn fail_read(&self, reason: Option<&str>) {
        locked(&self.failures).read = reason.map(str::to_string);
    }

    pub fn fail_close(&self, reason: Option<&str>) {
        locked(&self.failures).close = reason.map(str::to_string);
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Relaxed)
    }

    fn generated_rate(&self) -> f64 {
        // slow drift between 66 and 84 bpm
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let offset = f64::from(tick % 19) - 9.0;
        75.0 + offset
    }
}

impl Default for SimulatedHmsClient {
    fn default() -> Self {
        SimulatedHmsClient::new()
    }
}

#[async_trait]
impl HmsClient for SimulatedHmsClient {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn silent_sign_in(&self) -> Result<HmsSession, SdkError> {
        if let Some(reason) = locked(&self.failures).sign_in.clone() {
            return Err(SdkError::SignInFailed { reason });
        }
        Ok(locked(&self.session).clone())
    }

    async fn subscribe_heart_rate(&self) -> Result<(), SdkError> {
        if let Some(reason) = locked(&self.failures).subscribe.clone() {
            return Err(SdkError::SubscriptionFailed { reason });
        }
        self.subscribed.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn unsubscribe_heart_rate(&self) -> Result<(), SdkError> {
        self.subscribed.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn read_heart_rate(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<HeartRatePoint>, SdkError> {
        if let Some(reason) = locked(&self.failures).read.clone() {
            return Err(SdkError::ReadFailed { reason });
        }

        let rates = match locked(&self.readings).pop_front() {
            Some(rates) => rates,
            None if self.generate.load(Ordering::Relaxed) => vec![self.generated_rate()],
            None => Vec::new(),
        };
        debug!("Simulated read {} - {}: {:?}", start, end, rates);

        // spread the points evenly, the last one at `end`
        let end_ms = end.timestamp_millis();
        let count = rates.len() as i64;
        Ok(rates
            .into_iter()
            .enumerate()
            .map(|(index, heart_rate)| HeartRatePoint {
                start_time_ms: end_ms - (count - 1 - index as i64) * 1000,
                heart_rate,
            })
            .collect())
    }

    async fn close(&self) -> Result<(), SdkError> {
        self.subscribed.store(false, Ordering::Relaxed);
        if let Some(reason) = locked(&self.failures).close.clone() {
            return Err(SdkError::CloseFailed { reason });
        }
        Ok(())
    }
}

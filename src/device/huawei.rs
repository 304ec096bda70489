use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::types::{HealthConfig, HeartRateThresholds};
use crate::device::constants::{
    HUAWEI_DEFAULT_DEVICE_ID, HUAWEI_DEFAULT_DEVICE_NAME, HUAWEI_PROVIDER_NAME,
    PLACEHOLDER_PULSE_RATE, STATUS_CONNECTED, STATUS_DISCONNECTED,
};
use crate::device::events::EventBus;
use crate::device::hms::{HeartRatePoint, HmsClient, SdkBootstrap};
use crate::device::provider::HealthDataProvider;
use crate::device::types::{DeviceEvent, PulseSample};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
struct Session {
    device_id: String,
    device_name: String,
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    bootstrap: Arc<SdkBootstrap>,
    thresholds: HeartRateThresholds,
    interval: Duration,
    retention: chrono::Duration,
    fallback_to_placeholder: bool,
    events: EventBus,
    monitoring: AtomicBool,
    session: Mutex<Option<Session>>,
    monitor: Mutex<Option<MonitorTask>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Latest point in the window plus min/max/average over the whole window.
fn summarize(points: &[HeartRatePoint]) -> Option<(HeartRatePoint, u32, u32, f64)> {
    let valid: Vec<&HeartRatePoint> = points
        .iter()
        .filter(|point| point.heart_rate.is_finite() && point.heart_rate >= 0.0)
        .collect();

    let latest = **valid.iter().max_by_key(|point| point.start_time_ms)?;
    let rates: Vec<u32> = valid.iter().map(|point| point.heart_rate.round() as u32).collect();
    let min = *rates.iter().min()?;
    let max = *rates.iter().max()?;
    let average = valid.iter().map(|point| point.heart_rate).sum::<f64>() / valid.len() as f64;

    Some((latest, min, max, average))
}

impl Inner {
    fn client(&self) -> &Arc<dyn HmsClient> {
        self.bootstrap.client()
    }

    fn session(&self) -> Option<Session> {
        locked(&self.session).clone()
    }

    async fn read_current_pulse(&self) -> Result<PulseSample, ProviderError> {
        let session = self.session().ok_or_else(|| ProviderError::NotConnected {
            provider: HUAWEI_PROVIDER_NAME.to_string(),
        })?;

        let end = Local::now();
        let start = end - self.retention;
        let points = self.client().read_heart_rate(start, end).await?;

        match summarize(&points) {
            Some((latest, min, max, average)) => {
                let timestamp = Local
                    .timestamp_millis_opt(latest.start_time_ms)
                    .single()
                    .unwrap_or(end);
                let rate = latest.heart_rate.round() as u32;

                Ok(PulseSample::new(timestamp, session.device_id, session.device_name, rate, &self.thresholds, true)
                    .with_range(min, max, average))
            },
            None if self.fallback_to_placeholder => {
                debug!("No heart rate data in the last {} minutes, using placeholder", self.retention.num_minutes());
                Ok(PulseSample::new(
                    Local::now(),
                    session.device_id,
                    session.device_name,
                    PLACEHOLDER_PULSE_RATE,
                    &self.thresholds,
                    false,
                ))
            },
            None => Err(ProviderError::NoData),
        }
    }

    // returns false when the loop should stop; the monitoring flag is already cleared by then,
    // and before the error event goes out
    async fn poll_once(&self) -> bool {
        match self.read_current_pulse().await {
            Ok(sample) => {
                debug!("Polled pulse {} bpm ({})", sample.pulse_rate, sample.quality);
                self.events.emit(DeviceEvent::PulseReceived(sample)).await;
                true
            },
            Err(err) => {
                warn!("Heart rate reading failed: {}", err);
                self.monitoring.store(false, Ordering::SeqCst);
                self.events.emit(DeviceEvent::ErrorOccurred(format!("Heart rate reading error: {}", err))).await;
                false
            },
        }
    }
}

fn poll_pulse_task(inner: Arc<Inner>, cancel: CancellationToken) -> JoinHandle<()> {
    spawn(async move {
        info!("Pulse monitoring started, polling every {:?}", inner.interval);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                keep_going = inner.poll_once() => {
                    if !keep_going {
                        break 'mainloop;
                    }
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                _ = sleep(inner.interval) => {},
            }
        }

        info!("Pulse monitoring loop stopped");
    })
}

/// Heart rate provider backed by the Huawei Health Kit.
pub struct HuaweiHealthProvider {
    inner: Arc<Inner>,
}

impl HuaweiHealthProvider {
    pub fn new(bootstrap: Arc<SdkBootstrap>, config: &HealthConfig) -> Self {
        HuaweiHealthProvider {
            inner: Arc::new(Inner {
                bootstrap,
                thresholds: config.thresholds,
                interval: config.pulse_reading_interval(),
                retention: config.data_retention(),
                fallback_to_placeholder: config.fallback_to_placeholder,
                events: EventBus::new(),
                monitoring: AtomicBool::new(false),
                session: Mutex::new(None),
                monitor: Mutex::new(None),
            }),
        }
    }

    async fn report_error(&self, message: String) {
        warn!("{}", message);
        self.inner.events.emit(DeviceEvent::ErrorOccurred(message)).await;
    }
}

#[async_trait]
impl HealthDataProvider for HuaweiHealthProvider {
    fn provider_name(&self) -> &str {
        HUAWEI_PROVIDER_NAME
    }

    fn is_connected(&self) -> bool {
        locked(&self.inner.session).is_some()
    }

    fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    fn events(&self) -> &EventBus {
        &self.inner.events
    }

    async fn connect(&self) -> bool {
        if let Err(err) = self.inner.bootstrap.initialize() {
            self.report_error(format!("Failed to initialize Huawei HMS Core: {}", err)).await;
            return false;
        }

        info!("Signing in to Huawei Health...");
        match self.inner.client().silent_sign_in().await {
            Ok(session) => {
                let session = Session {
                    device_id: session.device_id.unwrap_or_else(|| HUAWEI_DEFAULT_DEVICE_ID.to_string()),
                    device_name: session.device_name.unwrap_or_else(|| HUAWEI_DEFAULT_DEVICE_NAME.to_string()),
                };
                info!("Connected to {} ({})", session.device_name, session.device_id);
                *locked(&self.inner.session) = Some(session);

                self.inner.events.emit(DeviceEvent::ConnectionStatusChanged(STATUS_CONNECTED.to_string())).await;
                true
            },
            Err(err) => {
                self.report_error(format!("Connection error: {}", err)).await;
                false
            },
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.stop_pulse_monitoring().await;

        let previous = locked(&self.inner.session).take();
        if previous.is_none() {
            debug!("Disconnect requested while not connected");
            return Ok(());
        }

        let result = self.inner.client().close().await;
        if let Err(err) = &result {
            warn!("Closing the Huawei Health session failed: {}", err);
        }

        info!("Disconnected from Huawei Health");
        self.inner.events.emit(DeviceEvent::ConnectionStatusChanged(STATUS_DISCONNECTED.to_string())).await;
        result.map_err(ProviderError::from)
    }

    async fn start_pulse_monitoring(&self) -> bool {
        if !self.is_connected() {
            self.report_error(format!("Not connected to {}", HUAWEI_PROVIDER_NAME)).await;
            return false;
        }

        if self.inner.monitoring.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("Pulse monitoring already active");
            return true;
        }

        if let Err(err) = self.inner.client().subscribe_heart_rate().await {
            self.inner.monitoring.store(false, Ordering::SeqCst);
            self.report_error(format!("Start monitoring error: {}", err)).await;
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = poll_pulse_task(self.inner.clone(), cancel.clone());
        let previous = locked(&self.inner.monitor).replace(MonitorTask { cancel, handle });
        if let Some(previous) = previous {
            // left over from a loop that exited after a read error
            previous.cancel.cancel();
        }

        true
    }

    async fn stop_pulse_monitoring(&self) {
        let task = locked(&self.inner.monitor).take();
        let was_monitoring = self.inner.monitoring.swap(false, Ordering::SeqCst);

        if task.is_none() && !was_monitoring {
            return;
        }

        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                warn!("Pulse monitoring task ended abnormally: {}", err);
            }
        }

        if let Err(err) = self.inner.client().unsubscribe_heart_rate().await {
            self.report_error(format!("Stop monitoring error: {}", err)).await;
        }
        info!("Pulse monitoring stopped");
    }

    async fn get_current_pulse(&self) -> Result<PulseSample, ProviderError> {
        match self.inner.read_current_pulse().await {
            Ok(sample) => Ok(sample),
            Err(err @ ProviderError::NotConnected { .. }) => Err(err),
            Err(err) => {
                self.report_error(format!("Get current pulse error: {}", err)).await;
                Err(err)
            },
        }
    }
}

impl Drop for HuaweiHealthProvider {
    fn drop(&mut self) {
        if let Some(task) = locked(&self.inner.monitor).take() {
            task.cancel.cancel();
        }
    }
}

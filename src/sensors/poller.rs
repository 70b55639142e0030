//! Background polling of the sensor and the cached reading it maintains

use crate::config::{Settings, SettingsSource};
use crate::error::{SensorError, Severity};
use crate::sensors::client::{DeviceClient, DeviceHandle};
use crate::sensors::reading::SensorReading;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn report(err: &SensorError) {
    match err.severity() {
        Severity::Warning => tracing::warn!("{}", err),
        Severity::Error => tracing::error!("{}", err),
    }
}

// === Poller ===

/// One polling worker's state. Owns the device connection; nothing else
/// ever touches it.
pub struct Poller<C: DeviceClient, S: SettingsSource> {
    client: Arc<C>,
    settings: Arc<S>,
    reading: Arc<watch::Sender<SensorReading>>,
    handle: Option<C::Handle>,
}

impl<C: DeviceClient, S: SettingsSource> Poller<C, S> {
    /// Whether a device connection is currently held
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn clear(&self) {
        self.reading.send_replace(SensorReading::absent());
    }

    /// Run a single poll cycle. Never fails: every problem is logged and
    /// leaves the cached reading absent.
    pub async fn poll_once(&mut self) {
        let settings = self.settings.settings();
        if let Err(err) = self.try_poll(&settings).await {
            report(&err);
            self.clear();
        }
    }

    async fn try_poll(&mut self, settings: &Settings) -> Result<(), SensorError> {
        if !settings.is_configured() {
            return Err(SensorError::ConfigurationMissing);
        }
        let address = settings.address();

        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                tracing::info!("Connecting to sensor at {}", address);
                self.client.connect(address).await?
            }
        };

        // On failure the handle is dropped here, so the next cycle reconnects
        let measurement = handle.read().await?;
        self.handle = Some(handle);

        tracing::debug!(
            "Sensor data - Temp: {:.1}°C, Humidity: {}%, Battery: {}%",
            measurement.temperature,
            measurement.humidity,
            measurement.battery
        );
        self.reading
            .send_replace(SensorReading::new(measurement, chrono::Utc::now()));
        Ok(())
    }

    /// Poll, then sleep for the configured interval, until cancelled
    async fn run(mut self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            if AssertUnwindSafe(self.poll_once()).catch_unwind().await.is_err() {
                tracing::error!("Sensor poll panicked, connection dropped");
                self.clear();
            }

            let interval = self.settings.settings().poll_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("Sensor polling stopped");
    }
}

// === Monitor ===

struct Worker {
    cancel: CancellationToken,
    /// Cancelled by the task itself once it has exited
    done: CancellationToken,
}

/// Owns the polling worker and the latest reading. Create one per sensor
/// and share it by `Arc`.
pub struct SensorMonitor<C: DeviceClient, S: SettingsSource> {
    client: Arc<C>,
    settings: Arc<S>,
    reading: Arc<watch::Sender<SensorReading>>,
    worker: Mutex<Option<Worker>>,
}

impl<C: DeviceClient, S: SettingsSource> std::fmt::Debug for SensorMonitor<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorMonitor")
            .field("running", &self.is_running())
            .field("reading", &self.get_reading())
            .finish_non_exhaustive()
    }
}

impl<C: DeviceClient, S: SettingsSource> SensorMonitor<C, S> {
    pub fn new(client: C, settings: Arc<S>) -> Self {
        let (reading, _) = watch::channel(SensorReading::absent());
        Self {
            client: Arc::new(client),
            settings,
            reading: Arc::new(reading),
            worker: Mutex::new(None),
        }
    }

    /// Current settings as seen by the poller
    pub fn settings(&self) -> Settings {
        self.settings.settings()
    }

    /// A fresh poller sharing this monitor's client, settings and cache,
    /// with no connection yet
    pub fn poller(&self) -> Poller<C, S> {
        Poller {
            client: Arc::clone(&self.client),
            settings: Arc::clone(&self.settings),
            reading: Arc::clone(&self.reading),
            handle: None,
        }
    }

    /// Latest cached reading. Never waits on the device.
    pub fn get_reading(&self) -> SensorReading {
        *self.reading.borrow()
    }

    /// Receiver notified on every cache replacement
    pub fn subscribe(&self) -> watch::Receiver<SensorReading> {
        self.reading.subscribe()
    }

    fn worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True from `start` until the worker has actually exited, including
    /// while a stopped worker is still finishing its read
    pub fn is_running(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|w| !w.done.is_cancelled())
    }

    /// Spawn the polling task unless one is already running.
    ///
    /// If a previous worker was stopped but is still inside a device read,
    /// the new worker waits for it to exit before its first poll, so at most
    /// one poller ever talks to the sensor. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker();
        let previous = match worker.take() {
            Some(w) if w.done.is_cancelled() => None,
            Some(w) if !w.cancel.is_cancelled() => {
                tracing::debug!("Sensor polling already running");
                *worker = Some(w);
                return;
            }
            stopping => stopping,
        };

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let exit_guard = done.clone().drop_guard();
        let poller = self.poller();
        let run_cancel = cancel.clone();

        tokio::spawn(async move {
            let _exit_guard = exit_guard;
            // Exits only after the previous worker, even if stopped first
            if let Some(previous) = previous {
                tracing::info!("Waiting for the previous poller to finish its read");
                previous.done.cancelled().await;
            }
            poller.run(run_cancel).await;
        });

        *worker = Some(Worker { cancel, done });
        tracing::info!("Sensor polling started");
    }

    /// Signal the worker to stop and wait up to `timeout` for it.
    ///
    /// Returns `true` if the worker finished in time. On timeout the worker
    /// keeps its slot and exits on its own once its in-flight read completes.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let tokens = self
            .worker()
            .as_ref()
            .map(|w| (w.cancel.clone(), w.done.clone()));
        let Some((cancel, done)) = tokens else {
            return true;
        };
        cancel.cancel();

        if tokio::time::timeout(timeout, done.cancelled()).await.is_err() {
            tracing::warn!("Sensor polling did not stop within {:?}", timeout);
            return false;
        }
        true
    }

    /// Host start-up hook: begin polling if a sensor address is configured
    pub fn on_start(&self) {
        let settings = self.settings();
        if settings.is_configured() {
            tracing::info!("Starting sensor monitoring for MAC: {}", settings.address());
            self.start();
        } else {
            tracing::warn!(
                "No MAC address configured. Please configure the sensor MAC address in settings."
            );
        }
    }
}

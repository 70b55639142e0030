//! Device client seam between the poller and the BLE backend

use crate::error::{Result, SensorError};
use crate::sensors::reading::Measurement;
use async_trait::async_trait;

/// Creates connections to a sensor by address
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    type Handle: DeviceHandle;

    async fn connect(&self, address: &str) -> Result<Self::Handle>;
}

/// A live connection bound to one sensor
#[async_trait]
pub trait DeviceHandle: Send + 'static {
    async fn read(&mut self) -> Result<Measurement>;
}

/// Client used when the binary is built without a BLE backend
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingBackend;

/// Uninhabited: a [`MissingBackend`] never hands out a connection
#[derive(Debug)]
pub enum NoHandle {}

#[async_trait]
impl DeviceClient for MissingBackend {
    type Handle = NoHandle;

    async fn connect(&self, _address: &str) -> Result<NoHandle> {
        Err(SensorError::DependencyMissing(
            "built without BLE support. Rebuild with `--features ble`".to_string(),
        ))
    }
}

#[async_trait]
impl DeviceHandle for NoHandle {
    async fn read(&mut self) -> Result<Measurement> {
        match *self {}
    }
}

/// The backend the binary talks to
#[cfg(feature = "ble")]
pub type PlatformClient = crate::sensors::lywsd03mmc::Lywsd03mmcClient;

#[cfg(not(feature = "ble"))]
pub type PlatformClient = MissingBackend;

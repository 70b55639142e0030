//! lywsd03mmc-graph: LYWSD03MMC thermometer feed for a host graphing pipeline
//!
//! A [`SensorMonitor`] polls one Xiaomi LYWSD03MMC over BLE in the
//! background, keeps the latest [`SensorReading`], and injects it into the
//! host's temperature series through two hooks:
//! - [`SensorMonitor::callback`]: points without a target
//! - [`SensorMonitor::get_temperature_data`]: points with a zero target
//!
//! Features:
//! - ble (default): btleplug backend for the sensor. Without it the poller
//!   runs but reports the missing backend and never has data.

pub mod config;
pub mod error;
pub mod hooks;
pub mod sensors;
pub mod shared;

pub use config::{FileSettings, MemorySettings, Settings, SettingsSource};
pub use error::SensorError;
pub use hooks::{inject, update_information, Series, TargetPolicy};
pub use sensors::client::{DeviceClient, DeviceHandle, PlatformClient};
pub use sensors::poller::{Poller, SensorMonitor};
pub use sensors::reading::{Measurement, SensorReading};

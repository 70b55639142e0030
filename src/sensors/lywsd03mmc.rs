//! Xiaomi LYWSD03MMC thermometer over BLE (btleplug)
//!
//! The sensor pushes its current sample as a 5-byte notification on a vendor
//! characteristic once a client subscribes:
//!
//! | bytes | type     | meaning                 |
//! |-------|----------|-------------------------|
//! | 0..2  | i16 LE   | temperature, 0.01 °C    |
//! | 2     | u8       | relative humidity, %    |
//! | 3..5  | u16 LE   | battery voltage, mV     |

use crate::error::{Result, SensorError};
use crate::sensors::client::{DeviceClient, DeviceHandle};
use crate::sensors::reading::Measurement;
use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Notify characteristic carrying temperature, humidity and voltage
pub const DATA_CHAR: Uuid = Uuid::from_u128(0xebe0ccc1_7a0a_4b0c_8a1a_6ff2997da3a6);

const PAYLOAD_LEN: usize = 5;
const SCAN_STEP: Duration = Duration::from_millis(500);

/// Battery is considered empty at 2.1 V
const EMPTY_MILLIVOLTS: u16 = 2100;

// === Payload Decoding ===

/// Decode a data notification into a [`Measurement`]
pub fn parse_payload(bytes: &[u8]) -> Result<Measurement> {
    if bytes.len() < PAYLOAD_LEN {
        return Err(SensorError::read(format!(
            "payload too short: expected {} bytes, got {}",
            PAYLOAD_LEN,
            bytes.len()
        )));
    }

    let centi_celsius = i16::from_le_bytes([bytes[0], bytes[1]]);
    let humidity = bytes[2];
    let millivolts = u16::from_le_bytes([bytes[3], bytes[4]]);

    Ok(Measurement {
        temperature: f64::from(centi_celsius) / 100.0,
        humidity,
        battery: battery_percent(millivolts),
    })
}

/// Charge estimate: one percent per 10 mV above 2.1 V, capped at 100
pub fn battery_percent(millivolts: u16) -> u8 {
    let centivolts = (millivolts.saturating_sub(EMPTY_MILLIVOLTS) + 5) / 10;
    centivolts.min(100) as u8
}

// === Client ===

/// Connects to LYWSD03MMC sensors through the first local Bluetooth adapter
#[derive(Debug, Clone)]
pub struct Lywsd03mmcClient {
    scan_timeout: Duration,
    notification_timeout: Duration,
}

impl Default for Lywsd03mmcClient {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            notification_timeout: Duration::from_secs(10),
        }
    }
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| SensorError::DependencyMissing(format!("Failed to create BT manager: {}", e)))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|e| SensorError::DependencyMissing(format!("Failed to get adapters: {}", e)))?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| SensorError::DependencyMissing("No Bluetooth adapters found".to_string()))
}

async fn known_peripheral(adapter: &Adapter, address: BDAddr) -> Result<Option<Peripheral>> {
    let peripherals = adapter
        .peripherals()
        .await
        .map_err(|e| SensorError::connection(address.to_string(), e))?;

    Ok(peripherals.into_iter().find(|p| p.address() == address))
}

/// Look the sensor up among known peripherals, scanning for it if needed
async fn find_peripheral(
    adapter: &Adapter,
    address: BDAddr,
    scan_timeout: Duration,
) -> Result<Option<Peripheral>> {
    if let Some(peripheral) = known_peripheral(adapter, address).await? {
        return Ok(Some(peripheral));
    }

    tracing::debug!("Scanning for {} (up to {:?})", address, scan_timeout);
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| SensorError::connection(address.to_string(), format!("Could not scan: {}", e)))?;

    let deadline = Instant::now() + scan_timeout;
    let found = loop {
        match known_peripheral(adapter, address).await {
            Ok(Some(peripheral)) => break Ok(Some(peripheral)),
            Ok(None) if Instant::now() >= deadline => break Ok(None),
            Ok(None) => tokio::time::sleep(SCAN_STEP).await,
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = adapter.stop_scan().await {
        tracing::debug!("Failed to stop scan: {}", e);
    }

    found
}

#[async_trait]
impl DeviceClient for Lywsd03mmcClient {
    type Handle = Lywsd03mmcHandle;

    async fn connect(&self, address: &str) -> Result<Lywsd03mmcHandle> {
        let bdaddr: BDAddr = address
            .parse()
            .map_err(|_| SensorError::connection(address, "invalid Bluetooth address"))?;

        let adapter = first_adapter().await?;

        let peripheral = find_peripheral(&adapter, bdaddr, self.scan_timeout)
            .await?
            .ok_or_else(|| {
                SensorError::connection(
                    address,
                    format!("device not found within {:?}", self.scan_timeout),
                )
            })?;

        peripheral
            .connect()
            .await
            .map_err(|e| SensorError::connection(address, e))?;

        let data = match locate_data_characteristic(&peripheral).await {
            Ok(characteristic) => characteristic,
            Err(reason) => {
                if let Err(e) = peripheral.disconnect().await {
                    tracing::warn!(%e, "failed to disconnect LYWSD03MMC peripheral");
                }
                return Err(SensorError::connection(address, reason));
            }
        };

        Ok(Lywsd03mmcHandle {
            peripheral,
            data,
            notification_timeout: self.notification_timeout,
        })
    }
}

async fn locate_data_characteristic(peripheral: &Peripheral) -> std::result::Result<Characteristic, String> {
    peripheral
        .discover_services()
        .await
        .map_err(|e| format!("service discovery failed: {}", e))?;

    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == DATA_CHAR)
        .ok_or_else(|| format!("characteristic {} not found", DATA_CHAR))
}

// === Handle ===

/// Connected LYWSD03MMC; disconnects in the background when dropped
pub struct Lywsd03mmcHandle {
    peripheral: Peripheral,
    data: Characteristic,
    notification_timeout: Duration,
}

impl std::fmt::Debug for Lywsd03mmcHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lywsd03mmcHandle")
            .field("address", &self.peripheral.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceHandle for Lywsd03mmcHandle {
    async fn read(&mut self) -> Result<Measurement> {
        let connected = self
            .peripheral
            .is_connected()
            .await
            .map_err(SensorError::read)?;
        if !connected {
            tracing::debug!("Reconnecting to {}", self.peripheral.address());
            self.peripheral.connect().await.map_err(SensorError::read)?;
        }

        let mut notifications = self.peripheral.notifications().await.map_err(SensorError::read)?;
        self.peripheral
            .subscribe(&self.data)
            .await
            .map_err(SensorError::read)?;

        let uuid = self.data.uuid;
        let waited = tokio::time::timeout(self.notification_timeout, async {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    return Some(notification.value);
                }
            }
            None
        })
        .await;

        if let Err(e) = self.peripheral.unsubscribe(&self.data).await {
            tracing::debug!("Failed to unsubscribe: {}", e);
        }

        match waited {
            Ok(Some(value)) => parse_payload(&value),
            Ok(None) => Err(SensorError::read("notification stream closed")),
            Err(_) => Err(SensorError::read(format!(
                "no data within {:?}",
                self.notification_timeout
            ))),
        }
    }
}

impl Drop for Lywsd03mmcHandle {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let peripheral = self.peripheral.clone();
        runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                tracing::debug!("Failed to disconnect: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        // 21.50 °C, 45 %, 2900 mV
        let bytes = [0x66, 0x08, 0x2d, 0x54, 0x0b];
        let m = parse_payload(&bytes).unwrap();
        assert_eq!(m.temperature, 21.5);
        assert_eq!(m.humidity, 45);
        assert_eq!(m.battery, 80);
    }

    #[test]
    fn test_parse_negative_temperature() {
        // -5.25 °C
        let raw = (-525i16).to_le_bytes();
        let bytes = [raw[0], raw[1], 90, 0xb8, 0x0b];
        let m = parse_payload(&bytes).unwrap();
        assert_eq!(m.temperature, -5.25);
        assert_eq!(m.humidity, 90);
        assert_eq!(m.battery, 90);
    }

    #[test]
    fn test_short_payload_is_read_error() {
        let err = parse_payload(&[0x66, 0x08, 0x2d]).unwrap_err();
        assert!(matches!(err, SensorError::Read(_)));
    }

    #[test]
    fn test_battery_percent() {
        assert_eq!(battery_percent(3000), 90);
        assert_eq!(battery_percent(2954), 85);
        assert_eq!(battery_percent(2395), 30);
        assert_eq!(battery_percent(2394), 29);
        assert_eq!(battery_percent(3300), 100);
        assert_eq!(battery_percent(2100), 0);
        assert_eq!(battery_percent(1900), 0);
    }

    #[test]
    fn test_data_char_uuid() {
        assert_eq!(
            DATA_CHAR.to_string(),
            "ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6"
        );
    }
}

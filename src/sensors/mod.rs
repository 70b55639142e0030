//! Sensors module: the LYWSD03MMC device link and the poller that caches its readings

pub mod client;
#[cfg(feature = "ble")]
pub mod lywsd03mmc;
pub mod poller;
pub mod reading;

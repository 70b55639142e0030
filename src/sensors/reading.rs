//! Cached sensor reading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded sample as delivered by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: u8,
    /// Battery charge, percent
    pub battery: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    measurement: Measurement,
    last_update: DateTime<Utc>,
}

/// The latest reading, either complete or entirely absent.
///
/// There is no way to build a value with only some fields set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    snapshot: Option<Snapshot>,
}

impl SensorReading {
    /// The "no data" state
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn new(measurement: Measurement, last_update: DateTime<Utc>) -> Self {
        Self {
            snapshot: Some(Snapshot {
                measurement,
                last_update,
            }),
        }
    }

    pub fn is_present(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn measurement(&self) -> Option<Measurement> {
        self.snapshot.map(|s| s.measurement)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.snapshot.map(|s| s.measurement.temperature)
    }

    pub fn humidity(&self) -> Option<u8> {
        self.snapshot.map(|s| s.measurement.humidity)
    }

    pub fn battery(&self) -> Option<u8> {
        self.snapshot.map(|s| s.measurement.battery)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot.map(|s| s.last_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_has_no_fields() {
        let reading = SensorReading::absent();
        assert!(!reading.is_present());
        assert_eq!(reading.temperature(), None);
        assert_eq!(reading.humidity(), None);
        assert_eq!(reading.battery(), None);
        assert_eq!(reading.last_update(), None);
    }

    #[test]
    fn test_present_has_all_fields() {
        let now = Utc::now();
        let reading = SensorReading::new(
            Measurement {
                temperature: 21.5,
                humidity: 45,
                battery: 80,
            },
            now,
        );
        assert_eq!(reading.temperature(), Some(21.5));
        assert_eq!(reading.humidity(), Some(45));
        assert_eq!(reading.battery(), Some(80));
        assert_eq!(reading.last_update(), Some(now));
    }
}

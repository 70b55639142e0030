//! Failure taxonomy for the sensor poller

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("No sensor address configured. Set device_address in the config file")]
    ConfigurationMissing,

    #[error("Failed to connect to sensor {address}: {reason}")]
    Connection { address: String, reason: String },

    #[error("Failed to read sensor data: {0}")]
    Read(String),

    #[error("Bluetooth backend unavailable: {0}")]
    DependencyMissing(String),
}

/// How loudly a failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl SensorError {
    pub fn connection(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(reason: impl ToString) -> Self {
        Self::Read(reason.to_string())
    }

    /// Missing configuration or backend is the operator's to fix; connect
    /// and read failures point at the device or the radio link.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConfigurationMissing | Self::DependencyMissing(_) => Severity::Warning,
            Self::Connection { .. } | Self::Read(_) => Severity::Error,
        }
    }
}

pub type Result<T, E = SensorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(SensorError::ConfigurationMissing.severity(), Severity::Warning);
        assert_eq!(
            SensorError::DependencyMissing("no adapter".into()).severity(),
            Severity::Warning
        );
        assert_eq!(SensorError::read("timeout").severity(), Severity::Error);
        assert_eq!(
            SensorError::connection("AA:BB:CC:DD:EE:FF", "refused").severity(),
            Severity::Error
        );
    }

    #[test]
    fn test_messages() {
        let err = SensorError::connection("AA:BB:CC:DD:EE:FF", "device not found");
        assert_eq!(
            err.to_string(),
            "Failed to connect to sensor AA:BB:CC:DD:EE:FF: device not found"
        );
    }
}

//! Shared utilities for lywsd03mmc-graph

use crate::sensors::reading::SensorReading;
use chrono::{DateTime, Utc};
use rmcp::ErrorData as McpError;

/// Format a duration in seconds to human readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let mins = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", mins)
        } else {
            format!("{}m {}s", mins, secs)
        }
    } else {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}

/// Render a reading for humans, with its age relative to `now`
pub fn format_reading(reading: &SensorReading, now: DateTime<Utc>) -> String {
    let (Some(m), Some(updated)) = (reading.measurement(), reading.last_update()) else {
        return "Sensor Reading:\n\n  No data (sensor not configured or unreachable)\n".to_string();
    };

    let age = (now - updated).num_seconds().max(0) as u64;
    format!(
        "Sensor Reading:\n\n  Temperature: {:.1}°C\n  Humidity: {}%\n  Battery: {}%\n  Updated: {} ({} ago)\n",
        m.temperature,
        m.humidity,
        m.battery,
        updated.to_rfc3339(),
        format_duration(age)
    )
}

/// Create an internal error
pub fn internal_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

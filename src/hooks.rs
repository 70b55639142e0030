//! Host hooks: telemetry injection and update-check metadata

use crate::config::{Settings, SettingsSource};
use crate::sensors::client::DeviceClient;
use crate::sensors::poller::SensorMonitor;
use crate::sensors::reading::SensorReading;
use serde::Serialize;
use std::collections::BTreeMap;

/// One point of a graph series: measured value and optional target line
pub type SeriesPoint = (f64, Option<f64>);

/// Series label -> point, as exchanged with the host graph
pub type Series = BTreeMap<String, SeriesPoint>;

/// Which target value accompanies injected points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPolicy {
    /// No target line
    Unset,
    /// Target pinned to zero
    Zero,
}

impl TargetPolicy {
    fn target(self) -> Option<f64> {
        match self {
            Self::Unset => None,
            Self::Zero => Some(0.0),
        }
    }
}

/// Insert the cached values into `series` under the configured labels.
///
/// Nothing is added when the reading is absent. Humidity and battery are
/// added only when their display flag is on.
pub fn inject(reading: &SensorReading, settings: &Settings, series: &mut Series, policy: TargetPolicy) {
    let Some(temperature) = reading.temperature() else {
        return;
    };
    let target = policy.target();

    series.insert(settings.temp_label.clone(), (temperature, target));

    if settings.display_humidity {
        if let Some(humidity) = reading.humidity() {
            series.insert(settings.humidity_label.clone(), (f64::from(humidity), target));
        }
    }

    if settings.display_battery {
        if let Some(battery) = reading.battery() {
            series.insert(settings.battery_label.clone(), (f64::from(battery), target));
        }
    }
}

impl<C: DeviceClient, S: SettingsSource> SensorMonitor<C, S> {
    /// Inject the current reading using the live settings
    pub fn inject(&self, series: &mut Series, policy: TargetPolicy) {
        inject(&self.get_reading(), &self.settings(), series, policy);
    }

    /// Received-temperatures hook: points carry no target
    pub fn callback(&self, mut series: Series) -> Series {
        self.inject(&mut series, TargetPolicy::Unset);
        series
    }

    /// Temperature-data hook: points carry a zero target
    pub fn get_temperature_data(&self, mut series: Series) -> Series {
        self.inject(&mut series, TargetPolicy::Zero);
        series
    }
}

// === Update Metadata ===

/// Key the host's update checker files this plugin under
pub const PLUGIN_ID: &str = "plotlyGraphLywsd03mmc";

const REPO_USER: &str = "yutaka551";
const REPO_NAME: &str = "lywsd03mmc-plotly-graph";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInformation {
    pub display_name: String,
    pub display_version: String,
    #[serde(rename = "type")]
    pub check_type: String,
    pub user: String,
    pub repo: String,
    pub current: String,
    /// Archive URL with a `{target_version}` placeholder
    #[serde(rename = "pip")]
    pub archive_url: String,
}

/// Static update-check metadata keyed by [`PLUGIN_ID`]
pub fn update_information() -> BTreeMap<String, UpdateInformation> {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let info = UpdateInformation {
        display_name: "PlotlyGraph LYWSD03MMC Plugin".to_string(),
        display_version: version.clone(),
        check_type: "github_release".to_string(),
        user: REPO_USER.to_string(),
        repo: REPO_NAME.to_string(),
        current: version,
        archive_url: format!(
            "https://github.com/{}/{}/archive/{{target_version}}.zip",
            REPO_USER, REPO_NAME
        ),
    };

    BTreeMap::from([(PLUGIN_ID.to_string(), info)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use crate::sensors::client::MissingBackend;
    use crate::sensors::reading::Measurement;
    use chrono::Utc;
    use std::sync::Arc;

    fn reading() -> SensorReading {
        SensorReading::new(
            Measurement {
                temperature: 21.5,
                humidity: 45,
                battery: 80,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_default_flags_only_add_temp_and_humidity() {
        let mut series = Series::new();
        inject(&reading(), &Settings::default(), &mut series, TargetPolicy::Unset);

        assert_eq!(series.len(), 2);
        assert_eq!(series["LYWSD03MMC Temp"], (21.5, None));
        assert_eq!(series["LYWSD03MMC Humidity"], (45.0, None));
    }

    #[test]
    fn test_humidity_hidden_when_flag_off() {
        let settings = Settings {
            display_humidity: false,
            ..Settings::default()
        };
        let mut series = Series::new();
        inject(&reading(), &settings, &mut series, TargetPolicy::Unset);

        assert_eq!(series.len(), 1);
        assert_eq!(series["LYWSD03MMC Temp"], (21.5, None));
    }

    #[test]
    fn test_battery_shown_when_enabled() {
        let settings = Settings {
            display_battery: true,
            battery_label: "Bat".to_string(),
            ..Settings::default()
        };
        let mut series = Series::new();
        inject(&reading(), &settings, &mut series, TargetPolicy::Zero);

        assert_eq!(series["Bat"], (80.0, Some(0.0)));
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_policies_differ_only_in_target() {
        let settings = Settings {
            display_battery: true,
            ..Settings::default()
        };
        let mut unset = Series::new();
        let mut zero = Series::new();
        inject(&reading(), &settings, &mut unset, TargetPolicy::Unset);
        inject(&reading(), &settings, &mut zero, TargetPolicy::Zero);

        assert_eq!(unset.len(), zero.len());
        for (label, (value, target)) in &unset {
            assert_eq!(*target, None);
            assert_eq!(zero[label], (*value, Some(0.0)));
        }
    }

    #[test]
    fn test_absent_reading_leaves_series_alone() {
        let mut series = Series::from([("Tool".to_string(), (210.0, Some(215.0)))]);
        inject(&SensorReading::absent(), &Settings::default(), &mut series, TargetPolicy::Zero);

        assert_eq!(series, Series::from([("Tool".to_string(), (210.0, Some(215.0)))]));
    }

    #[test]
    fn test_existing_entries_are_kept_and_overwritten() {
        let mut series = Series::from([
            ("Tool".to_string(), (210.0, Some(215.0))),
            ("LYWSD03MMC Temp".to_string(), (0.0, None)),
        ]);
        inject(&reading(), &Settings::default(), &mut series, TargetPolicy::Unset);

        assert_eq!(series["Tool"], (210.0, Some(215.0)));
        assert_eq!(series["LYWSD03MMC Temp"], (21.5, None));
    }

    #[test]
    fn test_monitor_hooks_without_data() {
        let monitor = SensorMonitor::new(MissingBackend, Arc::new(MemorySettings::default()));

        assert!(monitor.callback(Series::new()).is_empty());
        assert!(monitor.get_temperature_data(Series::new()).is_empty());
    }

    #[test]
    fn test_update_information() {
        let info = update_information();
        let entry = &info[PLUGIN_ID];
        assert_eq!(entry.check_type, "github_release");
        assert_eq!(entry.current, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            entry.archive_url,
            "https://github.com/yutaka551/lywsd03mmc-plotly-graph/archive/{target_version}.zip"
        );

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json[PLUGIN_ID]["displayName"], "PlotlyGraph LYWSD03MMC Plugin");
        assert_eq!(json[PLUGIN_ID]["type"], "github_release");
        assert!(json[PLUGIN_ID]["pip"].is_string());
    }
}

//! Configuration module for the sensor settings
//!
//! Reads/writes sensor settings from ~/.config/lywsd03mmc-graph/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Sensor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bluetooth address of the sensor, e.g. "A4:C1:38:00:00:00" (empty = not configured)
    pub device_address: String,
    /// Seconds between two polls
    pub poll_interval_seconds: u64,
    pub display_humidity: bool,
    pub display_battery: bool,
    pub temp_label: String,
    pub humidity_label: String,
    pub battery_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: String::new(),
            poll_interval_seconds: 60,
            display_humidity: true,
            display_battery: false,
            temp_label: "LYWSD03MMC Temp".to_string(),
            humidity_label: "LYWSD03MMC Humidity".to_string(),
            battery_label: "LYWSD03MMC Battery".to_string(),
        }
    }
}

impl Settings {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lywsd03mmc-graph").join("config.toml"))
    }

    /// Load settings from file, or return defaults if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        Self::try_load_from(path).unwrap_or_else(|e| {
            tracing::error!("{:#}", e);
            Self::default()
        })
    }

    /// Load settings from file. A missing file yields the defaults; an
    /// unreadable or malformed one is an error.
    pub fn try_load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        let settings = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// True when a sensor address has been entered
    pub fn is_configured(&self) -> bool {
        !self.device_address.trim().is_empty()
    }

    /// The address with surrounding whitespace removed
    pub fn address(&self) -> &str {
        self.device_address.trim()
    }

    /// Poll interval, never shorter than one second
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

/// Where the poller gets its settings from. Implementations are queried on
/// every poll, so changes take effect on the next cycle.
pub trait SettingsSource: Send + Sync + 'static {
    fn settings(&self) -> Settings;
}

/// Settings backed by a TOML file that is re-read on each access.
///
/// A broken file is reported at error level once; repeats of the same
/// problem on later accesses drop to debug until the file loads again.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    last_error: Mutex<Option<String>>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_error: Mutex::new(None),
        }
    }

    /// File settings at the default location
    pub fn at_default_path() -> anyhow::Result<Self> {
        let path = Settings::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember a load failure. Returns true when it differs from the last
    /// one reported.
    fn note_error(&self, message: &str) -> bool {
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        if last.as_deref() == Some(message) {
            return false;
        }
        *last = Some(message.to_string());
        true
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl SettingsSource for FileSettings {
    fn settings(&self) -> Settings {
        match Settings::try_load_from(&self.path) {
            Ok(settings) => {
                self.clear_error();
                settings
            }
            Err(e) => {
                let message = format!("{:#}", e);
                if self.note_error(&message) {
                    tracing::error!("{}, using defaults", message);
                } else {
                    tracing::debug!("{}, using defaults", message);
                }
                Settings::default()
            }
        }
    }
}

/// Settings held in memory, for embedding hosts that own their own store
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: RwLock<Settings>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// Replace the stored settings
    pub fn set(&self, settings: Settings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Modify the stored settings in place
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl SettingsSource for MemorySettings {
    fn settings(&self) -> Settings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(!settings.is_configured());
        assert_eq!(settings.poll_interval_seconds, 60);
        assert!(settings.display_humidity);
        assert!(!settings.display_battery);
        assert_eq!(settings.temp_label, "LYWSD03MMC Temp");
        assert_eq!(settings.humidity_label, "LYWSD03MMC Humidity");
        assert_eq!(settings.battery_label, "LYWSD03MMC Battery");
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let settings: Settings = toml::from_str(include_str!("../config.toml.example")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            device_address = "A4:C1:38:12:34:56"
            display_battery = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.address(), "A4:C1:38:12:34:56");
        assert!(settings.display_battery);
        assert!(settings.display_humidity);
        assert_eq!(settings.poll_interval_seconds, 60);
    }

    #[test]
    fn test_interval_is_clamped() {
        let settings = Settings {
            poll_interval_seconds: 0,
            ..Settings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_blank_address_is_unconfigured() {
        let settings = Settings {
            device_address: "   ".to_string(),
            ..Settings::default()
        };
        assert!(!settings.is_configured());
    }

    #[test]
    fn test_file_settings_roundtrip_and_reload() {
        let dir = std::env::temp_dir().join(format!("lywsd03mmc-graph-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let source = FileSettings::new(&path);

        // Missing file falls back to defaults
        assert_eq!(source.settings(), Settings::default());

        let mut settings = Settings {
            device_address: "AA:BB:CC:DD:EE:FF".to_string(),
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(source.settings(), settings);

        // Edits are picked up on the next access
        settings.poll_interval_seconds = 5;
        settings.save_to(&path).unwrap();
        assert_eq!(source.settings().poll_interval_seconds, 5);

        fs::write(&path, "this is not toml = = =").unwrap();
        assert_eq!(source.settings(), Settings::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_broken_file_error_reported_once() {
        let dir = std::env::temp_dir().join(format!(
            "lywsd03mmc-graph-broken-{}",
            std::process::id()
        ));
        let path = dir.join("config.toml");
        fs::create_dir_all(&dir).unwrap();
        let source = FileSettings::new(&path);

        fs::write(&path, "poll_interval_seconds = \"soon\"").unwrap();
        assert_eq!(source.settings(), Settings::default());
        let first = source.last_error.lock().unwrap().clone();
        assert!(first.as_deref().unwrap().starts_with("Failed to parse config file"));

        // Same problem again is not a new report
        source.settings();
        assert!(!source.note_error(first.as_deref().unwrap()));

        // A good load forgets it, so the next breakage is reported again
        Settings::default().save_to(&path).unwrap();
        source.settings();
        assert!(source.last_error.lock().unwrap().is_none());

        fs::write(&path, "poll_interval_seconds = \"soon\"").unwrap();
        source.settings();
        assert_eq!(source.last_error.lock().unwrap().clone(), first);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_settings_update() {
        let source = MemorySettings::default();
        source.update(|s| s.device_address = "AA:BB:CC:DD:EE:FF".to_string());
        assert!(source.settings().is_configured());

        source.set(Settings::default());
        assert!(!source.settings().is_configured());
    }
}

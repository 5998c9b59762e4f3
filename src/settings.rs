//! # Flight Settings
//!
//! Operator-entered description of the aircraft under test and the output
//! directory. The descriptive keys are persisted to a `testpilot.toml`
//! sidecar in the output directory with `write` and restored with `read`.
//!
//! ```toml
//! aircraft = "Sky Hopper"
//! weight = "2.4 kg"
//! motor = "T-Motor AT2814"
//! prop = "APC 11x5.5"
//! comment = "calm morning, 12 C"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TestPilotError};

/// Sidecar file name inside the output directory.
pub const SETTINGS_FILE: &str = "testpilot.toml";

/// Keys accepted by [`FlightSettings::set`], in display order.
pub const SETTING_KEYS: [&str; 5] = ["aircraft", "weight", "motor", "prop", "comment"];

/// Aircraft description and output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightSettings {
    #[serde(skip)]
    directory: PathBuf,
    #[serde(default)]
    aircraft: String,
    #[serde(default)]
    weight: String,
    #[serde(default)]
    motor: String,
    #[serde(default)]
    prop: String,
    #[serde(default)]
    comment: String,
}

impl FlightSettings {
    /// Creates empty settings writing to `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Output directory for recordings, reports and the sidecar.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }

    fn slot(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "aircraft" => Some(&mut self.aircraft),
            "weight" => Some(&mut self.weight),
            "motor" => Some(&mut self.motor),
            "prop" => Some(&mut self.prop),
            "comment" => Some(&mut self.comment),
            _ => None,
        }
    }

    /// Sets one descriptive key.
    ///
    /// # Errors
    ///
    /// Returns `Usage` if `key` is not one of [`SETTING_KEYS`].
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let slot = self
            .slot(key)
            .ok_or_else(|| TestPilotError::Usage(format!("unknown setting '{}'", key)))?;
        *slot = value.into();
        Ok(())
    }

    /// Value of a descriptive key, `None` when unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "aircraft" => &self.aircraft,
            "weight" => &self.weight,
            "motor" => &self.motor,
            "prop" => &self.prop,
            "comment" => &self.comment,
            _ => return None,
        };
        Some(value.as_str()).filter(|v| !v.is_empty())
    }

    /// Aircraft name, `None` when unset.
    pub fn aircraft(&self) -> Option<&str> {
        self.get("aircraft")
    }

    /// Every setting, including the directory, for report title pages.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = SETTING_KEYS
            .iter()
            .map(|&key| (key.to_string(), self.get(key).unwrap_or_default().to_string()))
            .collect();
        map.insert("directory".to_string(), self.directory.display().to_string());
        map
    }

    /// Path of the sidecar file in the current directory.
    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        self.directory.join(SETTINGS_FILE)
    }

    /// Writes the descriptive keys to the sidecar.
    ///
    /// # Errors
    ///
    /// Returns `SettingsWrite` if serialization fails or `Io` if the file
    /// cannot be written.
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.sidecar_path();
        let contents = toml::to_string(self)?;
        fs::write(&path, contents)?;
        info!("Settings written to {}", path.display());
        Ok(path)
    }

    /// Replaces the descriptive keys with the sidecar's contents.
    ///
    /// The directory is kept; keys missing from the file become unset.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read or `Config` if it is not
    /// valid TOML.
    pub fn read(&mut self) -> Result<PathBuf> {
        let path = self.sidecar_path();
        let contents = fs::read_to_string(&path)?;
        let loaded: FlightSettings = toml::from_str(&contents)?;
        *self = Self {
            directory: std::mem::take(&mut self.directory),
            ..loaded
        };
        info!("Settings read from {}", path.display());
        Ok(path)
    }

    /// Operator status block.
    #[must_use]
    pub fn status(&self) -> String {
        let mut text = format!("Working directory: {}\n", self.directory.display());
        for key in SETTING_KEYS {
            text.push_str(&format!(
                "{:<18} {}\n",
                format!("{}:", key),
                self.get(key).unwrap_or_default()
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_and_get() {
        let mut settings = FlightSettings::new(".");
        assert_eq!(settings.aircraft(), None);

        settings.set("aircraft", "Sky Hopper").unwrap();
        settings.set("weight", "2.4 kg").unwrap();
        assert_eq!(settings.aircraft(), Some("Sky Hopper"));
        assert_eq!(settings.get("weight"), Some("2.4 kg"));
        assert_eq!(settings.get("motor"), None);
        assert_eq!(settings.get("directory"), None);
    }

    #[test]
    fn test_set_unknown_key() {
        let mut settings = FlightSettings::new(".");
        assert!(matches!(settings.set("wingspan", "2 m"), Err(TestPilotError::Usage(_))));
    }

    #[test]
    fn test_to_map() {
        let mut settings = FlightSettings::new("/data/flights");
        settings.set("prop", "APC 11x5.5").unwrap();

        let map = settings.to_map();
        assert_eq!(map.len(), 6);
        assert_eq!(map["prop"], "APC 11x5.5");
        assert_eq!(map["aircraft"], "");
        assert_eq!(map["directory"], "/data/flights");
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut settings = FlightSettings::new(dir.path());
        settings.set("aircraft", "Sky Hopper").unwrap();
        settings.set("comment", "gusty, \"bumpy\" climb").unwrap();

        let path = settings.write().unwrap();
        assert_eq!(path, dir.path().join(SETTINGS_FILE));

        let mut restored = FlightSettings::new(dir.path());
        restored.set("motor", "stale").unwrap();
        restored.read().unwrap();

        assert_eq!(restored, settings);
        assert_eq!(restored.get("motor"), None);
        assert_eq!(restored.directory(), dir.path());
    }

    #[test]
    fn test_sidecar_excludes_directory() {
        let dir = tempdir().unwrap();
        let settings = FlightSettings::new(dir.path());
        let path = settings.write().unwrap();

        let contents = fs::read_to_string(path).unwrap();
        assert!(!contents.contains("directory"));
    }

    #[test]
    fn test_read_missing_sidecar() {
        let dir = tempdir().unwrap();
        let mut settings = FlightSettings::new(dir.path());
        assert!(matches!(settings.read(), Err(TestPilotError::Io(_))));
    }

    #[test]
    fn test_read_malformed_sidecar() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "aircraft = [").unwrap();

        let mut settings = FlightSettings::new(dir.path());
        settings.set("aircraft", "kept").unwrap();
        assert!(matches!(settings.read(), Err(TestPilotError::Config(_))));
        assert_eq!(settings.aircraft(), Some("kept"));
    }

    #[test]
    fn test_status_lists_keys() {
        let mut settings = FlightSettings::new("/data");
        settings.set("aircraft", "Sky Hopper").unwrap();
        let status = settings.status();
        assert!(status.contains("Working directory: /data"));
        assert!(status.contains("aircraft:"));
        assert!(status.contains("Sky Hopper"));
    }
}

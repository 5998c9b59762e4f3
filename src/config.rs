//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional; missing values take the defaults below.
//!
//! ```toml
//! [logging]
//! level = "info"
//! log_dir = "./logs"        # optional daily rolling log files
//!
//! [recording]
//! directory = "."
//!
//! [analysis]
//! cells = 4
//! usable_amp_hours = 10.0
//! cell_voltages = [4.2, 3.7, 3.0]
//! lowess_fraction = 0.6667
//! lowess_iterations = 3
//! takeoff_epsilon_m = 2.0
//! predict_min_airspeed = 8
//! predict_max_airspeed = 34
//!
//! [report]
//! enabled = true
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::lowess::Lowess;
use crate::analysis::metrics::PerformanceParams;
use crate::error::{Result, TestPilotError};

/// Config file used when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// Initial output directory for recordings and reports
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

/// Post-flight analysis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Battery cells in series
    #[serde(default = "default_cells")]
    pub cells: u32,

    #[serde(default = "default_usable_amp_hours")]
    pub usable_amp_hours: f64,

    /// Per-cell voltage thresholds, one derived series each
    #[serde(default = "default_cell_voltages")]
    pub cell_voltages: Vec<f64>,

    #[serde(default = "default_lowess_fraction")]
    pub lowess_fraction: f64,

    /// Robustifying passes after the initial fit
    #[serde(default = "default_lowess_iterations")]
    pub lowess_iterations: usize,

    /// Ground distance that marks the start of a takeoff roll
    #[serde(default = "default_takeoff_epsilon_m")]
    pub takeoff_epsilon_m: f64,

    #[serde(default = "default_predict_min_airspeed")]
    pub predict_min_airspeed: u32,

    #[serde(default = "default_predict_max_airspeed")]
    pub predict_max_airspeed: u32,
}

/// Report configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Write charts and a report document after a power analysis
    #[serde(default = "default_report_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }

fn default_directory() -> PathBuf { PathBuf::from(".") }

fn default_cells() -> u32 { 4 }
fn default_usable_amp_hours() -> f64 { 10.0 }
fn default_cell_voltages() -> Vec<f64> { vec![4.2, 3.7, 3.0] }
fn default_lowess_fraction() -> f64 { crate::analysis::lowess::DEFAULT_FRACTION }
fn default_lowess_iterations() -> usize { crate::analysis::lowess::DEFAULT_ITERATIONS }
fn default_takeoff_epsilon_m() -> f64 { 2.0 }
fn default_predict_min_airspeed() -> u32 { 8 }
fn default_predict_max_airspeed() -> u32 { 34 }

fn default_report_enabled() -> bool { true }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cells: default_cells(),
            usable_amp_hours: default_usable_amp_hours(),
            cell_voltages: default_cell_voltages(),
            lowess_fraction: default_lowess_fraction(),
            lowess_iterations: default_lowess_iterations(),
            takeoff_epsilon_m: default_takeoff_epsilon_m(),
            predict_min_airspeed: default_predict_min_airspeed(),
            predict_max_airspeed: default_predict_max_airspeed(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: default_report_enabled(),
        }
    }
}

impl AnalysisConfig {
    /// Smoother configured from `lowess_fraction` and `lowess_iterations`.
    #[must_use]
    pub fn smoother(&self) -> Lowess {
        Lowess::new(self.lowess_fraction, self.lowess_iterations)
    }

    /// Battery parameters for metric derivation.
    #[must_use]
    pub fn performance_params(&self) -> PerformanceParams {
        PerformanceParams {
            cells: self.cells,
            usable_amp_hours: self.usable_amp_hours,
            cell_voltages: self.cell_voltages.clone(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> TestPilotError {
    TestPilotError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_testpilot::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else [`DEFAULT_CONFIG_PATH`] if present, else
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`] for whichever file is read.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("level must be one of: trace, debug, info, warn, error"));
        }

        if self.recording.directory.as_os_str().is_empty() {
            return Err(invalid("recording directory cannot be empty"));
        }

        // Validate battery parameters
        let analysis = &self.analysis;
        if analysis.cells == 0 || analysis.cells > 24 {
            return Err(invalid("cells must be between 1 and 24"));
        }

        if !(analysis.usable_amp_hours > 0.0 && analysis.usable_amp_hours.is_finite()) {
            return Err(invalid("usable_amp_hours must be greater than 0"));
        }

        if analysis.cell_voltages.is_empty() {
            return Err(invalid("cell_voltages cannot be empty"));
        }

        for &voltage in &analysis.cell_voltages {
            if !(voltage > 0.0 && voltage <= 5.0) {
                return Err(invalid(format!("cell voltage {} must be between 0.0 and 5.0", voltage)));
            }
        }

        // Validate smoother
        if !(analysis.lowess_fraction > 0.0 && analysis.lowess_fraction <= 1.0) {
            return Err(invalid("lowess_fraction must be greater than 0.0 and at most 1.0"));
        }

        if analysis.lowess_iterations > 10 {
            return Err(invalid("lowess_iterations must be between 0 and 10"));
        }

        if !(analysis.takeoff_epsilon_m > 0.0 && analysis.takeoff_epsilon_m.is_finite()) {
            return Err(invalid("takeoff_epsilon_m must be greater than 0"));
        }

        if analysis.predict_min_airspeed > analysis.predict_max_airspeed {
            return Err(invalid("predict_min_airspeed must not exceed predict_max_airspeed"));
        }

        Ok(())
    }
}

//! Power-required-vs-airspeed analysis of a recorded `power` activity.
//!
//! Battery current arrives in centiamps and voltage in millivolts, so each
//! sample's electrical power is `current_battery / 100 * voltage_battery / 1000`
//! watts. Power is smoothed against airspeed and the smoothed curve feeds
//! [`metrics::derive`](super::metrics::derive).

use tracing::{info, warn};

use super::lowess::Curve;
use super::metrics::{self, PerformanceMetrics};
use super::table::RecordedTable;
use crate::activity::POWER_FIELDS;
use crate::config::AnalysisConfig;
use crate::error::{Result, TestPilotError};
use crate::report::{self, ChartRequest};

/// Electrical power in watts from battery current (cA) and voltage (mV).
#[must_use]
pub fn power_watts(current_ca: f64, voltage_mv: f64) -> f64 {
    current_ca / 100.0 * voltage_mv / 1000.0
}

/// Parallel airspeed (m/s) and power (W) samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerSamples {
    pub airspeed: Vec<f64>,
    pub power: Vec<f64>,
}

impl PowerSamples {
    /// Pulls samples from every row where current, voltage and airspeed are
    /// all present and finite.
    ///
    /// # Errors
    ///
    /// Returns `MissingColumn` if the table was not recorded by a power
    /// activity.
    pub fn from_table(table: &RecordedTable) -> Result<Self> {
        let [current_col, voltage_col, airspeed_col] = POWER_FIELDS;
        let current = table.column(current_col)?;
        let voltage = table.column(voltage_col)?;
        let airspeed = table.column(airspeed_col)?;

        let mut samples = Self::default();
        for ((c, v), a) in current.iter().zip(voltage).zip(airspeed) {
            if let (Some(c), Some(v), Some(a)) = (c, v, a) {
                if c.is_finite() && v.is_finite() && a.is_finite() {
                    samples.airspeed.push(*a);
                    samples.power.push(power_watts(*c, *v));
                }
            }
        }

        let skipped = table.row_count() - samples.len();
        if skipped > 0 {
            info!("Skipped {} rows without finite current, voltage and airspeed", skipped);
        }
        Ok(samples)
    }

    /// Number of complete samples.
    pub fn len(&self) -> usize {
        self.airspeed.len()
    }

    /// Returns true if no row had all three values.
    pub fn is_empty(&self) -> bool {
        self.airspeed.is_empty()
    }
}

/// Result of a power analysis.
#[derive(Debug)]
pub struct PowerAnalysis {
    /// Complete samples used for the fit
    pub samples: usize,
    /// Smoothed power (W) vs airspeed (m/s)
    pub curve: Curve,
    pub metrics: PerformanceMetrics,
    /// Predicted power at each integer airspeed of the configured table
    pub predictions: Vec<(u32, Option<f64>)>,
}

impl PowerAnalysis {
    /// Smooths power against airspeed and derives the performance metrics.
    ///
    /// # Errors
    ///
    /// - `MissingColumn` if a power field is not in the table
    /// - `InsufficientData`, `DegenerateFit` or `NonFiniteSample` from the
    ///   smoother
    pub fn run(table: &RecordedTable, config: &AnalysisConfig) -> Result<Self> {
        let samples = PowerSamples::from_table(table)?;
        if samples.is_empty() {
            return Err(TestPilotError::InsufficientData(
                "no row has current, voltage and airspeed".to_string(),
            ));
        }

        let curve = config.smoother().fit(&samples.airspeed, &samples.power)?;
        let metrics = metrics::derive(&curve, &config.performance_params());
        if !metrics.issues.is_empty() {
            warn!("{} metric points omitted", metrics.issues.len());
        }

        let predictions = (config.predict_min_airspeed..=config.predict_max_airspeed)
            .map(|airspeed| (airspeed, curve.predict(f64::from(airspeed))))
            .collect::<Vec<_>>();
        for (airspeed, power) in &predictions {
            match power {
                Some(watts) => info!("Predicted power at {} m/s: {:.1} W", airspeed, watts),
                None => info!("Predicted power at {} m/s: outside recorded range", airspeed),
            }
        }

        Ok(Self {
            samples: samples.len(),
            curve,
            metrics,
            predictions,
        })
    }

    /// Lowest smoothed power and the airspeed it occurs at.
    #[must_use]
    pub fn minimum_power(&self) -> Option<(f64, f64)> {
        self.curve
            .points()
            .iter()
            .copied()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// The four report charts for this analysis.
    #[must_use]
    pub fn charts(&self, filebase: &str) -> Vec<ChartRequest> {
        report::assemble_charts(filebase, &self.curve, &self.metrics)
    }

    /// One-paragraph operator summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut text = format!("Power analysis: {} samples", self.samples);
        if let Some((low, high)) = self.curve.x_range() {
            text.push_str(&format!(", airspeed {:.1}-{:.1} m/s", low, high));
        }
        if let Some((airspeed, watts)) = self.minimum_power() {
            text.push_str(&format!(", minimum power {:.1} W at {:.1} m/s", watts, airspeed));
        }
        if !self.metrics.issues.is_empty() {
            text.push_str(&format!(", {} metric points omitted", self.metrics.issues.len()));
        }
        text
    }
}

//! # Performance Metrics
//!
//! Derives current, endurance and range curves from a smoothed
//! power-required-vs-airspeed curve.
//!
//! For each per-cell voltage threshold `v`, at every curve point:
//!
//! ```text
//! pack voltage = cells * v                       (V)
//! current      = power / pack voltage            (A)
//! endurance    = usable amp-hours / current      (h)
//! range        = endurance * 3.6 * airspeed      (km, airspeed in m/s)
//! ```
//!
//! Points where a divisor is zero are left out of the affected series and
//! listed in [`PerformanceMetrics::issues`].

use tracing::warn;

use super::lowess::Curve;
use crate::error::{Result, TestPilotError};

/// Converts hours times metres-per-second into kilometres.
pub const KM_PER_HOUR_MS: f64 = 3.6;

/// Default per-cell voltage thresholds: full, nominal, empty LiPo cell.
pub const DEFAULT_CELL_VOLTAGES: [f64; 3] = [4.2, 3.7, 3.0];

/// Battery parameters for metric derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceParams {
    /// Cells in series
    pub cells: u32,
    /// Usable capacity in amp-hours
    pub usable_amp_hours: f64,
    /// Per-cell voltages, one derived series each
    pub cell_voltages: Vec<f64>,
}

impl Default for PerformanceParams {
    fn default() -> Self {
        Self {
            cells: 4,
            usable_amp_hours: 10.0,
            cell_voltages: DEFAULT_CELL_VOLTAGES.to_vec(),
        }
    }
}

/// A named curve computed pointwise from another curve.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    /// Legend label, e.g. `4.2V`
    pub name: String,
    /// Per-cell voltage this series was computed at
    pub cell_voltage: f64,
    /// `(airspeed, value)` points, ascending airspeed
    pub points: Vec<(f64, f64)>,
}

impl DerivedSeries {
    fn new(cell_voltage: f64) -> Self {
        Self {
            name: format!("{:?}V", cell_voltage),
            cell_voltage,
            points: Vec::new(),
        }
    }
}

/// Current, endurance and range series, one per voltage threshold.
#[derive(Debug)]
pub struct PerformanceMetrics {
    pub current: Vec<DerivedSeries>,
    pub endurance: Vec<DerivedSeries>,
    pub range: Vec<DerivedSeries>,
    /// Points omitted because of a zero divisor
    pub issues: Vec<TestPilotError>,
}

/// Pack voltage for `cells` in series at `cell_voltage` each.
#[must_use]
pub fn pack_voltage(cells: u32, cell_voltage: f64) -> f64 {
    f64::from(cells) * cell_voltage
}

/// Current drawn for `power` watts at `pack_voltage` volts.
///
/// # Errors
///
/// Returns `DivisionByZero` if the pack voltage is zero.
pub fn current(power: f64, pack_voltage: f64) -> Result<f64> {
    if pack_voltage == 0.0 {
        return Err(TestPilotError::DivisionByZero(format!(
            "current for {} W at 0 V pack voltage",
            power
        )));
    }
    Ok(power / pack_voltage)
}

/// Hours of flight from `usable_amp_hours` at a steady `current`.
///
/// # Errors
///
/// Returns `DivisionByZero` if the current is zero.
pub fn endurance(usable_amp_hours: f64, current: f64) -> Result<f64> {
    if current == 0.0 {
        return Err(TestPilotError::DivisionByZero(
            "endurance at 0 A current".to_string(),
        ));
    }
    Ok(usable_amp_hours / current)
}

/// Still-air range in km for `endurance` hours at `airspeed` m/s.
#[must_use]
pub fn range_km(endurance: f64, airspeed: f64) -> f64 {
    endurance * KM_PER_HOUR_MS * airspeed
}

/// Derives all metric series from a power (W) vs airspeed (m/s) curve.
///
/// Every series shares the power curve's airspeeds except where a point was
/// omitted for a zero divisor.
///
/// # Examples
///
/// ```
/// use flight_testpilot::analysis::metrics::{derive, PerformanceParams};
/// use flight_testpilot::analysis::lowess::Lowess;
///
/// let curve = Lowess::default().fit(&[10.0, 20.0], &[100.0, 200.0]).unwrap();
/// let metrics = derive(&curve, &PerformanceParams::default());
///
/// let (airspeed, amps) = metrics.current[0].points[0];
/// assert_eq!(airspeed, 10.0);
/// assert!((amps - 100.0 / (4.0 * 4.2)).abs() < 1e-9);
/// ```
pub fn derive(curve: &Curve, params: &PerformanceParams) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics {
        current: Vec::with_capacity(params.cell_voltages.len()),
        endurance: Vec::with_capacity(params.cell_voltages.len()),
        range: Vec::with_capacity(params.cell_voltages.len()),
        issues: Vec::new(),
    };

    for &cell_voltage in &params.cell_voltages {
        let volts = pack_voltage(params.cells, cell_voltage);
        let mut current_series = DerivedSeries::new(cell_voltage);
        let mut endurance_series = DerivedSeries::new(cell_voltage);
        let mut range_series = DerivedSeries::new(cell_voltage);

        for &(airspeed, power) in curve.points() {
            let amps = match current(power, volts) {
                Ok(amps) => amps,
                Err(e) => {
                    warn!("Skipping {} m/s at {}V: {}", airspeed, cell_voltage, e);
                    metrics.issues.push(e);
                    continue;
                }
            };
            current_series.points.push((airspeed, amps));

            match endurance(params.usable_amp_hours, amps) {
                Ok(hours) => {
                    endurance_series.points.push((airspeed, hours));
                    range_series.points.push((airspeed, range_km(hours, airspeed)));
                }
                Err(e) => {
                    warn!("Skipping {} m/s at {}V: {}", airspeed, cell_voltage, e);
                    metrics.issues.push(e);
                }
            }
        }

        metrics.current.push(current_series);
        metrics.endurance.push(endurance_series);
        metrics.range.push(range_series);
    }

    metrics
}

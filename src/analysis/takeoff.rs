//! Takeoff roll detection for a recorded `takeoff` activity.
//!
//! The first row carrying a position is the origin. The takeoff roll starts
//! at the first later row whose ground distance from the origin exceeds the
//! movement threshold.

use tracing::info;

use super::table::RecordedTable;
use crate::activity::recorder::TIME_COLUMN;
use crate::activity::TAKEOFF_FIELDS;
use crate::error::{Result, TestPilotError};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Scale of `GLOBAL_POSITION_INT` latitude and longitude.
const DEG_E7: f64 = 1e7;

/// Equirectangular ground distance in metres between two points in degrees.
///
/// Ignores Earth's curvature beyond the longitude scaling, which is accurate
/// for the few hundred metres of a takeoff roll.
#[must_use]
pub fn ground_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let x = (lon2 - lon1) * (0.5 * (lat1 + lat2)).cos();
    let y = lat2 - lat1;
    EARTH_RADIUS_M * x.hypot(y)
}

/// Detected start of a takeoff roll.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeoffRoll {
    /// Zero-based data row where movement began
    pub start_row: usize,
    /// Elapsed activity time at that row, in seconds
    pub start_time: Option<f64>,
    /// Origin latitude and longitude in degrees
    pub origin: (f64, f64),
    /// Ground distance from the origin for every row, `None` without a position
    pub distances: Vec<Option<f64>>,
    /// Altitude change from the origin row to the last recorded altitude
    pub altitude_gain: Option<f64>,
}

impl TakeoffRoll {
    /// Finds the takeoff roll in a recorded table.
    ///
    /// # Arguments
    ///
    /// * `table` - Table recorded by a `takeoff` activity
    /// * `epsilon_m` - Distance from the origin that counts as moving
    ///
    /// # Errors
    ///
    /// - `MissingColumn` if a takeoff field is not in the table
    /// - `TakeoffNotDetected` if no row has a position or none moves past
    ///   `epsilon_m`
    pub fn detect(table: &RecordedTable, epsilon_m: f64) -> Result<Self> {
        let [alt_col, lat_col, lon_col] = TAKEOFF_FIELDS;
        let altitude = table.column(alt_col)?;
        let lat = table.column(lat_col)?;
        let lon = table.column(lon_col)?;
        let time = table.column(TIME_COLUMN).ok();

        let positions: Vec<Option<(f64, f64)>> = lat
            .iter()
            .zip(lon)
            .map(|(lat, lon)| Some((lat.as_ref()? / DEG_E7, lon.as_ref()? / DEG_E7)))
            .collect();

        let (origin_row, origin) = positions
            .iter()
            .enumerate()
            .find_map(|(i, p)| p.map(|p| (i, p)))
            .ok_or(TestPilotError::TakeoffNotDetected)?;

        let distances: Vec<Option<f64>> = positions
            .iter()
            .map(|p| p.map(|(lat, lon)| ground_distance(origin.0, origin.1, lat, lon)))
            .collect();

        let start_row = distances
            .iter()
            .enumerate()
            .skip(origin_row + 1)
            .find(|(_, d)| d.map_or(false, |d| d > epsilon_m))
            .map(|(i, _)| i)
            .ok_or(TestPilotError::TakeoffNotDetected)?;

        let altitude_gain = altitude[origin_row]
            .zip(altitude.iter().rev().find_map(|a| *a))
            .map(|(first, last)| last - first);

        let roll = Self {
            start_row,
            start_time: time.and_then(|t| t[start_row]),
            origin,
            distances,
            altitude_gain,
        };
        info!(
            "Takeoff roll detected at row {} (origin {:.7}, {:.7})",
            roll.start_row, roll.origin.0, roll.origin.1
        );
        Ok(roll)
    }

    /// Ground distance covered by the last row with a position.
    #[must_use]
    pub fn final_distance(&self) -> Option<f64> {
        self.distances.iter().rev().find_map(|d| *d)
    }

    /// One-line operator summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut text = format!("Takeoff roll started at row {}", self.start_row);
        if let Some(t) = self.start_time {
            text.push_str(&format!(" (t = {:.2} s)", t));
        }
        if let Some(d) = self.final_distance() {
            text.push_str(&format!(", ground distance {:.1} m", d));
        }
        if let Some(gain) = self.altitude_gain {
            text.push_str(&format!(", altitude gain {:.1} m", gain));
        }
        text
    }
}

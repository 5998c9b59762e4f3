//! # Report Module
//!
//! Turns smoothed and derived curves into chart requests and hands them to a
//! [`ReportRenderer`].
//!
//! This module handles:
//! - Ordering the four performance charts (power, current, endurance, range)
//! - Naming report files from the flight date, aircraft and recording
//! - The renderer seam, with a JSON renderer as the default
//!
//! ## Output Layout
//!
//! For a recording `run1.csv` of aircraft `Sky Hopper` on 2024-05-01:
//!
//! ```text
//! 2024-05-01_Sky-Hopper_run1_power.json
//! 2024-05-01_Sky-Hopper_run1_i_vs_as.json
//! 2024-05-01_Sky-Hopper_run1_endur_vs_as.json
//! 2024-05-01_Sky-Hopper_run1_range_vs_as.json
//! 2024-05-01_Sky-Hopper_run1.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::analysis::lowess::Curve;
use crate::analysis::metrics::{DerivedSeries, PerformanceMetrics};
use crate::error::{Result, TestPilotError};

/// Document title.
pub const REPORT_TITLE: &str = "Flight Test Report";

/// Aircraft name used in file names when none is configured.
pub const DEFAULT_AIRCRAFT: &str = "default-aircraft";

/// Shared x-axis label of every chart.
pub const AIRSPEED_LABEL: &str = "Airspeed (m/s)";

/// One named `(x, y)` line on a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

impl From<&DerivedSeries> for Series {
    fn from(series: &DerivedSeries) -> Self {
        Self {
            name: series.name.clone(),
            points: series.points.clone(),
        }
    }
}

/// A chart for the renderer to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRequest {
    /// Artifact name, `<filebase><suffix>`
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

/// A rendered chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
}

/// Title page content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub title: String,
    pub filebase: String,
    /// Long form date, e.g. `May 01, 2024`
    pub date: String,
    /// Operator settings, key to value
    pub settings: BTreeMap<String, String>,
}

impl ReportMetadata {
    /// Builds metadata for a report dated `date`.
    #[must_use]
    pub fn new(filebase: impl Into<String>, date: NaiveDate, settings: BTreeMap<String, String>) -> Self {
        Self {
            title: REPORT_TITLE.to_string(),
            filebase: filebase.into(),
            date: date.format("%B %d, %Y").to_string(),
            settings,
        }
    }
}

/// Chart drawing and document composition backend.
#[cfg_attr(test, mockall::automock)]
pub trait ReportRenderer {
    /// Draws one chart.
    ///
    /// # Errors
    ///
    /// Backend specific; typically `Render` or `Io`.
    fn render(&mut self, chart: &ChartRequest) -> Result<Artifact>;

    /// Combines rendered charts into one document and returns its path.
    ///
    /// # Errors
    ///
    /// Backend specific; typically `Render` or `Io`.
    fn compose(&mut self, artifacts: &[Artifact], metadata: &ReportMetadata) -> Result<PathBuf>;

    /// Moves subsequent output to `dir`. Backends without a location ignore it.
    fn set_output_dir(&mut self, _dir: &Path) {}
}

/// Writes each chart and the document as pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct JsonReportRenderer {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    metadata: &'a ReportMetadata,
    charts: &'a [Artifact],
}

impl JsonReportRenderer {
    /// Creates a renderer writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory reports are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.json", name));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl ReportRenderer for JsonReportRenderer {
    fn render(&mut self, chart: &ChartRequest) -> Result<Artifact> {
        if chart.series.is_empty() {
            return Err(TestPilotError::Render(format!("chart '{}' has no series", chart.name)));
        }
        let path = self.write_json(&chart.name, chart)?;
        Ok(Artifact {
            name: chart.name.clone(),
            path,
        })
    }

    fn compose(&mut self, artifacts: &[Artifact], metadata: &ReportMetadata) -> Result<PathBuf> {
        let document = ReportDocument {
            metadata,
            charts: artifacts,
        };
        let path = self.write_json(&metadata.filebase, &document)?;
        info!("Report written to {}", path.display());
        Ok(path)
    }

    fn set_output_dir(&mut self, dir: &Path) {
        self.output_dir = dir.to_path_buf();
    }
}

/// Report file base: `YYYY-MM-DD_<aircraft>_<recording stem>`.
///
/// Spaces in the aircraft name become `-`; an unset or blank name becomes
/// [`DEFAULT_AIRCRAFT`].
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use flight_testpilot::report::report_filebase;
/// use std::path::Path;
///
/// let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
/// let base = report_filebase(date, Some("Sky Hopper"), Path::new("/logs/run1.csv"));
/// assert_eq!(base, "2024-05-01_Sky-Hopper_run1");
/// ```
#[must_use]
pub fn report_filebase(date: NaiveDate, aircraft: Option<&str>, recording: &Path) -> String {
    let aircraft = aircraft
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map_or_else(|| DEFAULT_AIRCRAFT.to_string(), |a| a.replace(' ', "-"));
    let stem = recording
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}_{}", date.format("%Y-%m-%d"), aircraft, stem)
}

fn chart(filebase: &str, suffix: &str, title: &str, y_label: &str, series: Vec<Series>) -> ChartRequest {
    ChartRequest {
        name: format!("{}{}", filebase, suffix),
        title: title.to_string(),
        x_label: AIRSPEED_LABEL.to_string(),
        y_label: y_label.to_string(),
        series,
    }
}

/// Orders the performance charts: power, current, endurance, range.
#[must_use]
pub fn assemble_charts(filebase: &str, power: &Curve, metrics: &PerformanceMetrics) -> Vec<ChartRequest> {
    let derived = |series: &[DerivedSeries]| series.iter().map(Series::from).collect::<Vec<_>>();
    vec![
        chart(
            filebase,
            "_power",
            "Power Required vs Airspeed",
            "Watts Required (W)",
            vec![Series {
                name: "smoothed".to_string(),
                points: power.points().to_vec(),
            }],
        ),
        chart(
            filebase,
            "_i_vs_as",
            "Current Required vs Airspeed",
            "Current Required (A)",
            derived(&metrics.current),
        ),
        chart(
            filebase,
            "_endur_vs_as",
            "Endurance vs Airspeed",
            "Endurance (hr)",
            derived(&metrics.endurance),
        ),
        chart(
            filebase,
            "_range_vs_as",
            "Range vs Airspeed",
            "Range (km)",
            derived(&metrics.range),
        ),
    ]
}

/// Renders every chart in order, then composes the document.
///
/// # Errors
///
/// Returns the first renderer error; nothing is composed after a failed chart.
pub fn build_report(
    renderer: &mut dyn ReportRenderer,
    charts: &[ChartRequest],
    metadata: &ReportMetadata,
) -> Result<PathBuf> {
    let artifacts = charts
        .iter()
        .map(|chart| renderer.render(chart))
        .collect::<Result<Vec<_>>>()?;
    renderer.compose(&artifacts, metadata)
}

//! # Analysis Module
//!
//! Post-flight processing of recorded activities.
//!
//! This module handles:
//! - Reading recorded tables back ([`table`])
//! - LOWESS smoothing and curve lookup ([`lowess`])
//! - Current, endurance and range derivation ([`metrics`])
//! - The power and takeoff analyses ([`power`], [`takeoff`])
//! - Running the right analysis when an activity stops ([`Analyzer`])

pub mod lowess;
pub mod metrics;
pub mod power;
pub mod table;
pub mod takeoff;

use std::path::Path;

use chrono::{Local, NaiveDate};
use tracing::info;

use crate::activity::recorder::FinishedActivity;
use crate::activity::ActivityKind;
use crate::config::{AnalysisConfig, ReportConfig};
use crate::error::Result;
use crate::report::{self, ReportMetadata, ReportRenderer};
use crate::settings::FlightSettings;
use power::PowerAnalysis;
use table::RecordedTable;
use takeoff::TakeoffRoll;

/// Work run synchronously when an activity stops.
#[cfg_attr(test, mockall::automock)]
pub trait PostProcessor {
    /// Analyses a finished activity and returns operator text.
    ///
    /// # Errors
    ///
    /// Any analysis or report failure. The recorded file is never modified.
    fn process(&mut self, finished: &FinishedActivity) -> Result<String>;
}

/// Post-processor running the power and takeoff analyses.
pub struct Analyzer<'a> {
    analysis: &'a AnalysisConfig,
    report: &'a ReportConfig,
    settings: &'a FlightSettings,
    renderer: &'a mut dyn ReportRenderer,
    date: NaiveDate,
}

impl<'a> Analyzer<'a> {
    /// Creates an analyzer dating reports today.
    pub fn new(
        analysis: &'a AnalysisConfig,
        report: &'a ReportConfig,
        settings: &'a FlightSettings,
        renderer: &'a mut dyn ReportRenderer,
    ) -> Self {
        Self {
            analysis,
            report,
            settings,
            renderer,
            date: Local::now().date_naive(),
        }
    }

    /// Overrides the report date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Runs the power analysis on a table and, if enabled, writes the report.
    ///
    /// `recording` names the report files; it is usually the table's path.
    ///
    /// # Errors
    ///
    /// Any error from [`PowerAnalysis::run`] or the renderer.
    pub fn analyze_power(&mut self, table: &RecordedTable, recording: &Path) -> Result<String> {
        let analysis = PowerAnalysis::run(table, self.analysis)?;
        let mut text = analysis.summary();

        if self.report.enabled {
            let filebase = report::report_filebase(self.date, self.settings.aircraft(), recording);
            let metadata = ReportMetadata::new(&filebase, self.date, self.settings.to_map());
            let charts = analysis.charts(&filebase);
            let path = report::build_report(&mut *self.renderer, &charts, &metadata)?;
            text.push_str(&format!("\nReport: {}", path.display()));
        }

        Ok(text)
    }

    /// Runs the takeoff roll detection on a table.
    ///
    /// # Errors
    ///
    /// Any error from [`TakeoffRoll::detect`].
    pub fn analyze_takeoff(&self, table: &RecordedTable) -> Result<String> {
        TakeoffRoll::detect(table, self.analysis.takeoff_epsilon_m).map(|roll| roll.summary())
    }
}

impl PostProcessor for Analyzer<'_> {
    fn process(&mut self, finished: &FinishedActivity) -> Result<String> {
        info!("Analysing {} activity '{}'", finished.kind, finished.label);

        // Prefer the closed file; fall back to in-memory rows for non-file sinks
        let table = match &finished.path {
            Some(path) => RecordedTable::load(path)?,
            None => RecordedTable::from_finished(finished),
        };
        let recording = finished
            .path
            .clone()
            .unwrap_or_else(|| Path::new(&finished.label).with_extension("csv"));

        match finished.kind {
            ActivityKind::Power => self.analyze_power(&table, &recording),
            ActivityKind::Takeoff => self.analyze_takeoff(&table),
            ActivityKind::Csv => Ok(String::new()),
        }
    }
}

//! # Activity Module
//!
//! Operator-declared recording sessions.
//!
//! This module handles:
//! - Activity kinds and their field sets ([`ActivityKind`])
//! - Recording rows from telemetry ([`recorder`])
//! - Output sinks ([`sink`])
//! - Tracking concurrent activities by label and index ([`registry`])
//!
//! ## Activity Kinds
//!
//! | Kind | Fields | Post-processing |
//! |------|--------|-----------------|
//! | `csv` | operator supplied | none |
//! | `power` | `SYS_STATUS.current_battery`, `SYS_STATUS.voltage_battery`, `VFR_HUD.airspeed` | power/endurance/range report |
//! | `takeoff` | `VFR_HUD.alt`, `GLOBAL_POSITION_INT.lat`, `GLOBAL_POSITION_INT.lon` | takeoff roll detection |

pub mod recorder;
pub mod registry;
pub mod sink;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, TestPilotError};
use crate::telemetry::expression::FieldExpression;
use recorder::ActivityRecorder;
use sink::CsvFileSink;

/// Power activity fields: battery current (cA), battery voltage (mV), airspeed (m/s).
pub const POWER_FIELDS: [&str; 3] = [
    "SYS_STATUS.current_battery",
    "SYS_STATUS.voltage_battery",
    "VFR_HUD.airspeed",
];

/// Takeoff activity fields: altitude (m), latitude and longitude (degE7).
pub const TAKEOFF_FIELDS: [&str; 3] = [
    "VFR_HUD.alt",
    "GLOBAL_POSITION_INT.lat",
    "GLOBAL_POSITION_INT.lon",
];

/// Kind of recording started by `start <kind> <label>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    /// Plain recording of operator-supplied fields
    Csv,
    /// Power required vs airspeed test
    Power,
    /// Takeoff performance test
    Takeoff,
}

impl ActivityKind {
    /// All kinds, in the order shown to the operator.
    pub const ALL: [ActivityKind; 3] = [ActivityKind::Csv, ActivityKind::Power, ActivityKind::Takeoff];

    /// Name used on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Csv => "csv",
            ActivityKind::Power => "power",
            ActivityKind::Takeoff => "takeoff",
        }
    }

    /// Returns true if stopping this kind runs an analysis.
    #[must_use]
    pub fn has_post_processing(self) -> bool {
        !matches!(self, ActivityKind::Csv)
    }

    /// Creates a recorder of this kind writing to `<directory>/<label>.csv`.
    ///
    /// # Arguments
    ///
    /// * `label` - Operator label, also the file stem
    /// * `extra_fields` - Field expressions given after the label (used by `csv`)
    /// * `directory` - Output directory
    ///
    /// # Errors
    ///
    /// - `Usage` if the label is not a plain file name
    /// - `MissingFields` if `csv` is started without field expressions
    /// - `ExpressionParse` if a field expression is invalid
    /// - `SinkUnavailable` if the output file cannot be created
    pub fn build(self, label: &str, extra_fields: &[String], directory: &Path) -> Result<ActivityRecorder> {
        match self {
            ActivityKind::Csv => csv_activity(label, extra_fields, directory),
            ActivityKind::Power => power_activity(label, directory),
            ActivityKind::Takeoff => takeoff_activity(label, directory),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = TestPilotError;

    fn from_str(s: &str) -> Result<Self> {
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TestPilotError::UnknownActivityKind(s.to_string()))
    }
}

fn parse_fields<S: AsRef<str>>(fields: &[S]) -> Result<Vec<FieldExpression>> {
    fields.iter().map(|f| FieldExpression::parse(f.as_ref())).collect()
}

/// Labels name the output file, so they must stay a single path component.
fn check_label(label: &str) -> Result<()> {
    if label.is_empty() || label == "." || label == ".." || label.chars().any(std::path::is_separator) {
        return Err(TestPilotError::Usage(format!(
            "activity label '{}' must be a plain name without path separators",
            label
        )));
    }
    Ok(())
}

fn open_recorder(
    kind: ActivityKind,
    label: &str,
    fields: Vec<FieldExpression>,
    directory: &Path,
) -> Result<ActivityRecorder> {
    check_label(label)?;
    let path = directory.join(format!("{}.csv", label));
    info!("Recording activity '{}' to {}", label, path.display());
    let sink = CsvFileSink::create(&path)?;
    ActivityRecorder::create(kind, label, fields, Box::new(sink))
}

fn csv_activity(label: &str, extra_fields: &[String], directory: &Path) -> Result<ActivityRecorder> {
    if extra_fields.is_empty() {
        return Err(TestPilotError::MissingFields(ActivityKind::Csv.to_string()));
    }
    let fields = parse_fields(extra_fields)?;
    open_recorder(ActivityKind::Csv, label, fields, directory)
}

fn power_activity(label: &str, directory: &Path) -> Result<ActivityRecorder> {
    let recorder = open_recorder(ActivityKind::Power, label, parse_fields(&POWER_FIELDS)?, directory)?;
    info!("Beginning power response test; use 'tp stop {}' to indicate completion", label);
    Ok(recorder)
}

fn takeoff_activity(label: &str, directory: &Path) -> Result<ActivityRecorder> {
    let recorder = open_recorder(ActivityKind::Takeoff, label, parse_fields(&TAKEOFF_FIELDS)?, directory)?;
    info!("Beginning takeoff performance test; use 'tp stop {}' to indicate completion", label);
    Ok(recorder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_kind_lookup() {
        assert_eq!("csv".parse::<ActivityKind>().unwrap(), ActivityKind::Csv);
        assert_eq!("power".parse::<ActivityKind>().unwrap(), ActivityKind::Power);
        assert_eq!("takeoff".parse::<ActivityKind>().unwrap(), ActivityKind::Takeoff);
    }

    #[test]
    fn test_unknown_kind() {
        match "landing".parse::<ActivityKind>() {
            Err(TestPilotError::UnknownActivityKind(name)) => assert_eq!(name, "landing"),
            other => panic!("Expected UnknownActivityKind, got: {:?}", other),
        }
    }

    #[test]
    fn test_post_processing_kinds() {
        assert!(!ActivityKind::Csv.has_post_processing());
        assert!(ActivityKind::Power.has_post_processing());
        assert!(ActivityKind::Takeoff.has_post_processing());
    }

    #[test]
    fn test_power_build_uses_fixed_fields() {
        let dir = tempdir().unwrap();
        let recorder = ActivityKind::Power.build("run1", &[], dir.path()).unwrap();

        let fields: Vec<_> = recorder.fields().iter().map(|f| f.source()).collect();
        assert_eq!(fields, POWER_FIELDS);
        assert!(dir.path().join("run1.csv").exists());
    }

    #[test]
    fn test_csv_build_requires_fields() {
        let dir = tempdir().unwrap();
        let result = ActivityKind::Csv.build("bare", &[], dir.path());
        assert!(matches!(result, Err(TestPilotError::MissingFields(_))));
        assert!(!dir.path().join("bare.csv").exists());
    }

    #[test]
    fn test_csv_build_rejects_bad_expression_before_opening_file() {
        let dir = tempdir().unwrap();
        let result = ActivityKind::Csv.build("bad", &["VFR_HUD.airspeed +".to_string()], dir.path());
        assert!(matches!(result, Err(TestPilotError::ExpressionParse { .. })));
        assert!(!dir.path().join("bad.csv").exists());
    }

    #[test]
    fn test_label_must_be_plain_name() {
        let dir = tempdir().unwrap();
        for label in ["", ".", "..", "./a", "../escape", "runs/a"] {
            let result = ActivityKind::Power.build(label, &[], dir.path());
            assert!(matches!(result, Err(TestPilotError::Usage(_))), "'{}' accepted", label);
        }
        assert!(!dir.path().join("a.csv").exists());
        assert!(!dir.path().parent().unwrap().join("escape.csv").exists());
    }

    #[test]
    fn test_csv_build_with_fields() {
        let dir = tempdir().unwrap();
        let fields = vec!["ATTITUDE.roll".to_string(), "ATTITUDE.pitch * 57.3".to_string()];
        let recorder = ActivityKind::Csv.build("att", &fields, dir.path()).unwrap();
        assert_eq!(recorder.fields().len(), 2);
        assert!(recorder.triggers().contains("ATTITUDE"));
    }
}

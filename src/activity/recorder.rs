//! # Activity Recorder
//!
//! Records one activity's field expressions as a time series.
//!
//! The recorder keeps one "last known value" slot per field. A message whose
//! type is in the trigger set re-evaluates only the fields that depend on that
//! type, then appends the whole slot row, prefixed by the elapsed time, to the
//! in-memory table and to the sink. Fields whose types have not arrived yet
//! stay empty.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::sink::RowSink;
use super::ActivityKind;
use crate::error::{Result, TestPilotError};
use crate::telemetry::expression::FieldExpression;
use crate::telemetry::{Message, MessageSnapshot};

/// Header of the elapsed time column.
pub const TIME_COLUMN: &str = "time";

/// One recorded sample, aligned positionally to the activity's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Seconds since the activity started
    pub elapsed: f64,
    /// Last known value of each field, `None` until first observed
    pub values: Vec<Option<f64>>,
}

impl Row {
    fn empty(width: usize) -> Self {
        Self {
            elapsed: 0.0,
            values: vec![None; width],
        }
    }

    /// Renders the row as text cells: time first, empty cell for missing values.
    #[must_use]
    pub fn record(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.values.len() + 1);
        cells.push(format!("{:.6}", self.elapsed));
        cells.extend(
            self.values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        cells
    }
}

/// Everything left of an activity after its sink is closed.
#[derive(Debug, Clone)]
pub struct FinishedActivity {
    pub kind: ActivityKind,
    pub label: String,
    pub fields: Vec<String>,
    /// Recorded file, if the sink was file-backed
    pub path: Option<PathBuf>,
    pub rows: Vec<Row>,
}

/// A running recording session.
pub struct ActivityRecorder {
    kind: ActivityKind,
    label: String,
    fields: Vec<FieldExpression>,
    triggers: BTreeSet<String>,
    started_at: Instant,
    current: Row,
    rows: Vec<Row>,
    sink: Box<dyn RowSink>,
}

impl std::fmt::Debug for ActivityRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRecorder")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("triggers", &self.triggers)
            .field("rows", &self.rows.len())
            .finish_non_exhaustive()
    }
}

impl ActivityRecorder {
    /// Starts recording: computes the trigger set and writes the header row.
    ///
    /// # Arguments
    ///
    /// * `kind` - Activity kind, decides post-processing on stop
    /// * `label` - Operator label, unique within the registry
    /// * `fields` - Parsed field expressions, in column order
    /// * `sink` - Exclusive output destination
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` if the header cannot be written.
    pub fn create(
        kind: ActivityKind,
        label: impl Into<String>,
        fields: Vec<FieldExpression>,
        mut sink: Box<dyn RowSink>,
    ) -> Result<Self> {
        let label = label.into();
        let triggers = fields
            .iter()
            .flat_map(|f| f.dependencies().iter().cloned())
            .collect::<BTreeSet<_>>();

        let mut header = Vec::with_capacity(fields.len() + 1);
        header.push(TIME_COLUMN.to_string());
        header.extend(fields.iter().map(|f| f.source().to_string()));

        if let Err(source) = sink.write_record(&header) {
            let path = sink
                .path()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(&label));
            if let Err(e) = sink.close() {
                warn!("Failed to release sink of activity '{}': {}", label, e);
            }
            return Err(TestPilotError::SinkUnavailable { path, source });
        }

        debug!("Activity '{}' triggers on {:?}", label, triggers);

        let width = fields.len();
        Ok(Self {
            kind,
            label,
            fields,
            triggers,
            started_at: Instant::now(),
            current: Row::empty(width),
            rows: Vec::new(),
            sink,
        })
    }

    /// Operator label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Activity kind.
    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    /// Message types that append a row.
    pub fn triggers(&self) -> &BTreeSet<String> {
        &self.triggers
    }

    /// Field expressions in column order.
    pub fn fields(&self) -> &[FieldExpression] {
        &self.fields
    }

    /// Rows recorded so far.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Handles one inbound message.
    ///
    /// The snapshot must already contain `msg`. Returns true if a row was
    /// appended.
    pub fn on_message(&mut self, msg: &Message, snapshot: &MessageSnapshot) -> bool {
        let msg_type = msg.msg_type();
        if !self.triggers.contains(msg_type) {
            return false;
        }

        self.current.elapsed = self.started_at.elapsed().as_secs_f64();

        for (slot, field) in self.current.values.iter_mut().zip(&self.fields) {
            if !field.depends_on(msg_type) {
                continue;
            }
            match field.evaluate(snapshot) {
                Ok(value) => *slot = Some(value),
                Err(e) => debug!("Activity '{}': field '{}' not updated: {}", self.label, field, e),
            }
        }

        let row = self.current.clone();
        if let Err(e) = self.sink.write_record(&row.record()) {
            warn!("Activity '{}': failed to write row {}: {}", self.label, self.rows.len() + 1, e);
        }
        self.rows.push(row);
        true
    }

    /// Closes the sink and hands back the finished table.
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` if the final flush fails. The sink is closed
    /// exactly once either way.
    pub fn stop(mut self) -> Result<FinishedActivity> {
        let path = self.sink.path().map(|p| p.to_path_buf());
        if let Err(source) = self.sink.close() {
            return Err(TestPilotError::SinkUnavailable {
                path: path.unwrap_or_else(|| PathBuf::from(&self.label)),
                source,
            });
        }

        info!("Activity '{}' stopped after {} rows", self.label, self.rows.len());

        Ok(FinishedActivity {
            kind: self.kind,
            label: self.label,
            fields: self.fields.iter().map(|f| f.source().to_string()).collect(),
            path,
            rows: self.rows,
        })
    }
}

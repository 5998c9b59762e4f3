//! # Activity Registry
//!
//! Tracks the activities currently recording, owns the message snapshot and
//! fans inbound messages out to every activity.
//!
//! Activities are addressed by label or by zero-based index in start order:
//!
//! ```text
//! (0) run1 - power
//! (1) att - csv
//! ```
//!
//! `stop run1` and `stop 0` both stop the first activity. A label match always
//! wins over an index interpretation.

use std::path::Path;

use tracing::{info, warn};

use super::recorder::{ActivityRecorder, FinishedActivity};
use super::ActivityKind;
use crate::analysis::PostProcessor;
use crate::error::{Result, TestPilotError};
use crate::telemetry::{Message, MessageSnapshot};

/// Set of concurrently recording activities with unique labels.
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    activities: Vec<ActivityRecorder>,
    snapshot: MessageSnapshot,
}

impl ActivityRegistry {
    /// Creates an empty registry with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active recordings.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Returns true if nothing is recording.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Latest message of each type seen so far.
    pub fn snapshot(&self) -> &MessageSnapshot {
        &self.snapshot
    }

    /// Lists `(index, label, kind)` in start order.
    pub fn activities(&self) -> impl Iterator<Item = (usize, &str, ActivityKind)> {
        self.activities
            .iter()
            .enumerate()
            .map(|(i, a)| (i, a.label(), a.kind()))
    }

    /// Returns the recorder with this label, if any.
    pub fn get(&self, label: &str) -> Option<&ActivityRecorder> {
        self.activities.iter().find(|a| a.label() == label)
    }

    /// Starts a new activity.
    ///
    /// # Errors
    ///
    /// - `UnknownActivityKind` if `kind` names no activity kind
    /// - `DuplicateLabel` if `label` is already recording
    /// - any error from [`ActivityKind::build`]
    ///
    /// The registry is unchanged on error.
    pub fn start_activity(
        &mut self,
        kind: &str,
        label: &str,
        extra_fields: &[String],
        directory: &Path,
    ) -> Result<String> {
        let kind: ActivityKind = kind.parse()?;
        if self.get(label).is_some() {
            return Err(TestPilotError::DuplicateLabel(label.to_string()));
        }

        let recorder = kind.build(label, extra_fields, directory)?;
        self.insert(recorder)?;
        Ok(format!("Started {} activity '{}' ({})", kind, label, self.len() - 1))
    }

    /// Tracks an already created recorder.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLabel` if the label is taken; the recorder is then
    /// stopped so its sink is released.
    pub fn insert(&mut self, recorder: ActivityRecorder) -> Result<()> {
        if self.get(recorder.label()).is_some() {
            let label = recorder.label().to_string();
            if let Err(e) = recorder.stop() {
                warn!("Failed to release rejected activity '{}': {}", label, e);
            }
            return Err(TestPilotError::DuplicateLabel(label));
        }
        self.activities.push(recorder);
        Ok(())
    }

    /// Resolves a stop identifier: exact label first, then zero-based index.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange` if the identifier is an index past the end
    /// - `LabelNotFound` if it is neither a label nor an index
    pub fn resolve(&self, identifier: &str) -> Result<usize> {
        if let Some(index) = self.activities.iter().position(|a| a.label() == identifier) {
            return Ok(index);
        }

        let index: usize = identifier
            .parse()
            .map_err(|_| TestPilotError::LabelNotFound(identifier.to_string()))?;
        if index >= self.activities.len() {
            return Err(TestPilotError::IndexOutOfRange {
                index,
                len: self.activities.len(),
            });
        }
        Ok(index)
    }

    /// Stops one activity and runs its post-processing.
    ///
    /// Post-processing failures are reported in the returned text; the
    /// recorded file is left as written.
    ///
    /// # Errors
    ///
    /// Returns the lookup error without altering state, or `SinkUnavailable`
    /// if the final flush fails (the activity is still removed).
    pub fn stop_activity(&mut self, identifier: &str, post: &mut dyn PostProcessor) -> Result<String> {
        let index = self.resolve(identifier)?;
        let recorder = self.activities.remove(index);
        info!("Stopping activity '{}' ({})", recorder.label(), index);
        finish(recorder, post)
    }

    /// Stops every activity, best effort, and always leaves the registry empty.
    ///
    /// Returns one line of operator text per activity.
    pub fn stop_all(&mut self, post: &mut dyn PostProcessor) -> Vec<String> {
        self.activities
            .drain(..)
            .map(|recorder| {
                let label = recorder.label().to_string();
                finish(recorder, post).unwrap_or_else(|e| {
                    warn!("Failed to stop activity '{}': {}", label, e);
                    format!("Error stopping '{}': {}", label, e)
                })
            })
            .collect()
    }

    /// Records the message in the snapshot and forwards it to every activity.
    ///
    /// Returns the number of activities that appended a row.
    pub fn on_message(&mut self, msg: Message) -> usize {
        self.snapshot.update(msg.clone());
        let snapshot = &self.snapshot;
        self.activities
            .iter_mut()
            .map(|a| a.on_message(&msg, snapshot))
            .filter(|&appended| appended)
            .count()
    }
}

fn finish(recorder: ActivityRecorder, post: &mut dyn PostProcessor) -> Result<String> {
    let finished: FinishedActivity = recorder.stop()?;
    let mut text = format!(
        "Stopped {} activity '{}' ({} rows)",
        finished.kind,
        finished.label,
        finished.rows.len()
    );

    if finished.kind.has_post_processing() {
        match post.process(&finished) {
            Ok(summary) => {
                text.push('\n');
                text.push_str(&summary);
            }
            Err(e) => {
                warn!("Post-processing of '{}' failed: {}", finished.label, e);
                text.push_str(&format!("\nAnalysis of '{}' failed: {}", finished.label, e));
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MockPostProcessor;
    use tempfile::{tempdir, TempDir};

    fn registry_with(labels: &[&str]) -> (ActivityRegistry, TempDir) {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        for label in labels {
            registry
                .start_activity("csv", label, &["VFR_HUD.airspeed".to_string()], dir.path())
                .unwrap();
        }
        (registry, dir)
    }

    fn no_post_processing() -> MockPostProcessor {
        let mut post = MockPostProcessor::new();
        post.expect_process().never();
        post
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let (mut registry, dir) = registry_with(&["run1"]);

        let result = registry.start_activity("power", "run1", &[], dir.path());
        assert!(matches!(result, Err(TestPilotError::DuplicateLabel(_))));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("run1").unwrap().kind(), ActivityKind::Csv);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let (mut registry, dir) = registry_with(&[]);
        let result = registry.start_activity("landing", "l1", &[], dir.path());
        assert!(matches!(result, Err(TestPilotError::UnknownActivityKind(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sink_failure_does_not_add_activity() {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        let missing = dir.path().join("no").join("such").join("dir");

        let result = registry.start_activity("power", "run1", &[], &missing);
        assert!(matches!(result, Err(TestPilotError::SinkUnavailable { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stop_by_label_and_index() {
        let (mut registry, _dir) = registry_with(&["a", "b", "c"]);
        let mut post = no_post_processing();

        registry.stop_activity("b", &mut post).unwrap();
        let labels: Vec<_> = registry.activities().map(|(_, l, _)| l.to_string()).collect();
        assert_eq!(labels, vec!["a", "c"]);

        registry.stop_activity("1", &mut post).unwrap();
        let labels: Vec<_> = registry.activities().map(|(_, l, _)| l.to_string()).collect();
        assert_eq!(labels, vec!["a"]);
    }

    #[test]
    fn test_label_wins_over_index() {
        let (mut registry, _dir) = registry_with(&["first", "0"]);
        let mut post = no_post_processing();

        registry.stop_activity("0", &mut post).unwrap();
        assert!(registry.get("0").is_none());
        assert!(registry.get("first").is_some());
    }

    #[test]
    fn test_stop_index_out_of_range() {
        let (mut registry, _dir) = registry_with(&["a", "b"]);
        let mut post = no_post_processing();

        match registry.stop_activity("5", &mut post) {
            Err(TestPilotError::IndexOutOfRange { index, len }) => {
                assert_eq!(index, 5);
                assert_eq!(len, 2);
            }
            other => panic!("Expected IndexOutOfRange, got: {:?}", other),
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_stop_unparseable_identifier() {
        let (mut registry, _dir) = registry_with(&["a"]);
        let mut post = no_post_processing();

        assert!(matches!(
            registry.stop_activity("zzz", &mut post),
            Err(TestPilotError::LabelNotFound(_))
        ));
        assert!(matches!(
            registry.stop_activity("-1", &mut post),
            Err(TestPilotError::LabelNotFound(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_power_stop_runs_post_processing() {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        registry.start_activity("power", "run1", &[], dir.path()).unwrap();

        let mut post = MockPostProcessor::new();
        post.expect_process()
            .withf(|finished| finished.label == "run1")
            .times(1)
            .returning(|_| Ok("report written".to_string()));

        let text = registry.stop_activity("run1", &mut post).unwrap();
        assert!(text.contains("report written"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_post_processing_failure_is_reported() {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        registry.start_activity("power", "run1", &[], dir.path()).unwrap();

        let mut post = MockPostProcessor::new();
        post.expect_process()
            .times(1)
            .returning(|_| Err(TestPilotError::InsufficientData("0 samples".to_string())));

        let text = registry.stop_activity("0", &mut post).unwrap();
        assert!(text.contains("Analysis of 'run1' failed"));
        assert!(registry.is_empty());
        // Recorded file still holds its header
        let contents = std::fs::read_to_string(dir.path().join("run1.csv")).unwrap();
        assert!(contents.starts_with("time,SYS_STATUS.current_battery"));
    }

    #[test]
    fn test_stop_all_clears_even_on_failure() {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        registry.start_activity("power", "p", &[], dir.path()).unwrap();
        registry
            .start_activity("csv", "c", &["VFR_HUD.alt".to_string()], dir.path())
            .unwrap();
        registry.start_activity("takeoff", "t", &[], dir.path()).unwrap();

        let mut post = MockPostProcessor::new();
        post.expect_process()
            .times(2)
            .returning(|_| Err(TestPilotError::TakeoffNotDetected));

        let lines = registry.stop_all(&mut post);
        assert_eq!(lines.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_on_message_fans_out() {
        let dir = tempdir().unwrap();
        let mut registry = ActivityRegistry::new();
        registry.start_activity("power", "p", &[], dir.path()).unwrap();
        registry
            .start_activity("csv", "att", &["ATTITUDE.roll".to_string()], dir.path())
            .unwrap();

        assert_eq!(registry.on_message(Message::new("VFR_HUD").with_field("airspeed", 9.0)), 1);
        assert_eq!(registry.on_message(Message::new("ATTITUDE").with_field("roll", 0.1)), 1);
        assert_eq!(registry.on_message(Message::new("HEARTBEAT")), 0);
        assert_eq!(registry.snapshot().len(), 3);
        assert_eq!(registry.get("p").unwrap().rows().len(), 1);
    }
}

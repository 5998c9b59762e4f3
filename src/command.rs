//! # Operator Commands
//!
//! Parses console commands and applies them to the [`TestPilot`] context.
//!
//! Commands may be prefixed with `tp`, so `tp start power run1` and
//! `start power run1` are equivalent. An empty line shows the status.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `status` | settings and activities in progress |
//! | `help` | command summary |
//! | `start <kind> <label> [fields...]` | start recording |
//! | `stop <label\|index>` | stop recording and analyse |
//! | `directory <path>` | output directory |
//! | `aircraft\|weight\|motor\|prop\|comment <text>` | flight description |
//! | `write` / `read` | save or load the description sidecar |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::activity::registry::ActivityRegistry;
use crate::activity::ActivityKind;
use crate::analysis::table::RecordedTable;
use crate::analysis::Analyzer;
use crate::config::Config;
use crate::error::{Result, TestPilotError};
use crate::report::{JsonReportRenderer, ReportRenderer};
use crate::settings::{FlightSettings, SETTING_KEYS};
use crate::telemetry::Message;

/// Optional command prefix.
pub const COMMAND_PREFIX: &str = "tp";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Help,
    Start {
        kind: String,
        label: String,
        fields: Vec<String>,
    },
    Stop(String),
    Directory(String),
    /// One of the descriptive settings, e.g. `aircraft Sky Hopper`
    Set { key: String, value: String },
    Write,
    Read,
}

impl FromStr for Command {
    type Err = TestPilotError;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace().peekable();
        if words.peek() == Some(&COMMAND_PREFIX) {
            words.next();
        }

        let Some(name) = words.next() else {
            return Ok(Command::Status);
        };
        let args: Vec<&str> = words.collect();

        match name {
            "status" => Ok(Command::Status),
            "help" => Ok(Command::Help),
            "start" => match args.as_slice() {
                [kind, label, fields @ ..] => Ok(Command::Start {
                    kind: kind.to_string(),
                    label: label.to_string(),
                    fields: fields.iter().map(|f| f.to_string()).collect(),
                }),
                _ => Err(TestPilotError::Usage(format!(
                    "start <activity type> <label> [fields...]; available activities: {}",
                    ActivityKind::ALL.map(ActivityKind::as_str).join(", ")
                ))),
            },
            "stop" => match args.as_slice() {
                [identifier] => Ok(Command::Stop(identifier.to_string())),
                _ => Err(TestPilotError::Usage("stop <label|number>".to_string())),
            },
            "directory" if args.is_empty() => Err(TestPilotError::Usage("directory <directory name>".to_string())),
            "directory" => Ok(Command::Directory(args.join(" "))),
            "write" => Ok(Command::Write),
            "read" => Ok(Command::Read),
            key if SETTING_KEYS.contains(&key) => Ok(Command::Set {
                key: key.to_string(),
                value: args.join(" "),
            }),
            other => Err(TestPilotError::Usage(format!("unknown command '{}'; try 'help'", other))),
        }
    }
}

/// Operator help text.
#[must_use]
pub fn help_text() -> String {
    [
        "start <activity type> <label> [fields...]",
        "stop <label|number>",
        "status",
        "directory <directory name>",
        "aircraft <aircraft name>",
        "weight <aircraft weight>",
        "motor <motor name>",
        "prop <prop name>",
        "comment <comment>",
        "write    save aircraft settings to the directory",
        "read     load aircraft settings from the directory",
        "Fields are expressions like SYS_STATUS.voltage_battery/1000 (no spaces).",
    ]
    .join("\n")
}

/// Application context: settings, activities and the report backend.
pub struct TestPilot {
    config: Config,
    settings: FlightSettings,
    registry: ActivityRegistry,
    renderer: Box<dyn ReportRenderer>,
}

impl TestPilot {
    /// Creates a context writing JSON reports into the recording directory.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let renderer = JsonReportRenderer::new(&config.recording.directory);
        Self::with_renderer(config, Box::new(renderer))
    }

    /// Creates a context with a custom report backend.
    #[must_use]
    pub fn with_renderer(config: Config, mut renderer: Box<dyn ReportRenderer>) -> Self {
        let settings = FlightSettings::new(&config.recording.directory);
        renderer.set_output_dir(settings.directory());
        Self {
            config,
            settings,
            registry: ActivityRegistry::new(),
            renderer,
        }
    }

    pub fn settings(&self) -> &FlightSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }

    /// Parses and runs one command line, returning operator text.
    ///
    /// Failures are rendered as text; the context is unchanged by a failed
    /// command.
    pub fn handle_command(&mut self, line: &str) -> String {
        match line.parse::<Command>().and_then(|cmd| self.execute(cmd)) {
            Ok(text) => text,
            Err(TestPilotError::Usage(usage)) => format!("usage: {}", usage),
            Err(e) => {
                warn!("Command '{}' failed: {}", line.trim(), e);
                format!("Error: {}", e)
            }
        }
    }

    /// Runs a parsed command.
    ///
    /// # Errors
    ///
    /// Whatever the command's operation returns.
    pub fn execute(&mut self, command: Command) -> Result<String> {
        match command {
            Command::Status => Ok(self.status()),
            Command::Help => Ok(help_text()),
            Command::Start { kind, label, fields } => {
                self.registry
                    .start_activity(&kind, &label, &fields, self.settings.directory())
            }
            Command::Stop(identifier) => {
                let mut analyzer = Analyzer::new(
                    &self.config.analysis,
                    &self.config.report,
                    &self.settings,
                    self.renderer.as_mut(),
                );
                self.registry.stop_activity(&identifier, &mut analyzer)
            }
            Command::Directory(directory) => {
                self.set_directory(PathBuf::from(directory));
                let dir = self.settings.directory();
                if dir.is_dir() {
                    Ok(format!("Directory set: {}", dir.display()))
                } else {
                    Ok(format!("Directory set: {} (does not exist yet)", dir.display()))
                }
            }
            Command::Set { key, value } => {
                self.settings.set(&key, value)?;
                Ok(format!(
                    "{} set: {}",
                    capitalize(&key),
                    self.settings.get(&key).unwrap_or_default()
                ))
            }
            Command::Write => {
                let path = self.settings.write()?;
                Ok(format!("Settings written to {}", path.display()))
            }
            Command::Read => {
                let path = self.settings.read()?;
                Ok(format!("Settings read from {}", path.display()))
            }
        }
    }

    fn set_directory(&mut self, directory: PathBuf) {
        self.renderer.set_output_dir(&directory);
        self.settings.set_directory(directory);
    }

    /// Status block: settings then activities in progress.
    #[must_use]
    pub fn status(&self) -> String {
        let mut text = String::from("TestPilot configuration:\n");
        text.push_str(&self.settings.status());
        text.push_str("----------------------------------\n");
        text.push_str("Activities in progress:\n");
        for (index, label, kind) in self.registry.activities() {
            text.push_str(&format!("({}) {} - {}\n", index, label, kind));
        }
        text
    }

    /// Feeds one telemetry message to every activity.
    pub fn on_message(&mut self, msg: Message) -> usize {
        self.registry.on_message(msg)
    }

    /// Stops every activity, running their analyses.
    pub fn shutdown(&mut self) -> Vec<String> {
        let mut analyzer = Analyzer::new(
            &self.config.analysis,
            &self.config.report,
            &self.settings,
            self.renderer.as_mut(),
        );
        self.registry.stop_all(&mut analyzer)
    }

    /// Runs the power analysis on an existing recording.
    ///
    /// The report is written next to the recording.
    ///
    /// # Errors
    ///
    /// Any table, analysis or renderer error.
    pub fn analyze_file(&mut self, path: &Path) -> Result<String> {
        let table = RecordedTable::load(path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.renderer.set_output_dir(parent);
        }
        let mut analyzer = Analyzer::new(
            &self.config.analysis,
            &self.config.report,
            &self.settings,
            self.renderer.as_mut(),
        );
        analyzer.analyze_power(&table, path)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn pilot() -> (TestPilot, TempDir) {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.recording.directory = dir.path().to_path_buf();
        (TestPilot::new(config), dir)
    }

    #[test]
    fn test_parse_prefix_optional() {
        let expected = Command::Start {
            kind: "power".to_string(),
            label: "run1".to_string(),
            fields: vec![],
        };
        assert_eq!("tp start power run1".parse::<Command>().unwrap(), expected);
        assert_eq!("start power run1".parse::<Command>().unwrap(), expected);
    }

    #[test]
    fn test_parse_empty_is_status() {
        assert_eq!("".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("tp".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("  status ".parse::<Command>().unwrap(), Command::Status);
    }

    #[test]
    fn test_parse_csv_fields() {
        let cmd: Command = "start csv att ATTITUDE.roll ATTITUDE.pitch*57.3".parse().unwrap();
        match cmd {
            Command::Start { kind, label, fields } => {
                assert_eq!(kind, "csv");
                assert_eq!(label, "att");
                assert_eq!(fields, vec!["ATTITUDE.roll", "ATTITUDE.pitch*57.3"]);
            }
            other => panic!("Expected Start, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_settings_join_words() {
        assert_eq!(
            "aircraft Sky Hopper Mk 2".parse::<Command>().unwrap(),
            Command::Set {
                key: "aircraft".to_string(),
                value: "Sky Hopper Mk 2".to_string()
            }
        );
        assert_eq!(
            "directory /data/my flights".parse::<Command>().unwrap(),
            Command::Directory("/data/my flights".to_string())
        );
    }

    #[test]
    fn test_parse_usage_errors() {
        for line in ["start", "start power", "stop", "stop a b", "directory", "launch"] {
            assert!(
                matches!(line.parse::<Command>(), Err(TestPilotError::Usage(_))),
                "'{}' should be a usage error",
                line
            );
        }
    }

    #[test]
    fn test_start_usage_lists_kinds() {
        let (mut pilot, _dir) = pilot();
        let text = pilot.handle_command("tp start power");
        assert!(text.starts_with("usage:"));
        assert!(text.contains("csv, power, takeoff"));
    }

    #[test]
    fn test_start_status_stop() {
        let (mut pilot, dir) = pilot();

        let text = pilot.handle_command("start csv att ATTITUDE.roll");
        assert!(text.contains("Started csv activity 'att'"));
        assert!(dir.path().join("att.csv").exists());

        let status = pilot.handle_command("status");
        assert!(status.contains("(0) att - csv"));

        let text = pilot.handle_command("stop 0");
        assert!(text.contains("Stopped csv activity 'att'"));
        assert!(pilot.registry().is_empty());
    }

    #[test]
    fn test_duplicate_start_reports_error() {
        let (mut pilot, _dir) = pilot();
        pilot.handle_command("start csv att ATTITUDE.roll");

        let text = pilot.handle_command("start csv att ATTITUDE.pitch");
        assert!(text.contains("already in use"));
        assert_eq!(pilot.registry().len(), 1);
    }

    #[test]
    fn test_stop_errors_leave_state() {
        let (mut pilot, _dir) = pilot();
        pilot.handle_command("start csv a ATTITUDE.roll");
        pilot.handle_command("start csv b ATTITUDE.roll");

        assert!(pilot.handle_command("stop 5").contains("out of range"));
        assert!(pilot.handle_command("stop nope").contains("No activity labelled 'nope'"));
        assert_eq!(pilot.registry().len(), 2);
    }

    #[test]
    fn test_settings_commands() {
        let (mut pilot, dir) = pilot();

        assert_eq!(pilot.handle_command("aircraft Sky Hopper"), "Aircraft set: Sky Hopper");
        assert_eq!(pilot.handle_command("tp weight 2.4 kg"), "Weight set: 2.4 kg");

        let text = pilot.handle_command("write");
        assert!(text.contains("testpilot.toml"));
        assert!(dir.path().join("testpilot.toml").exists());

        pilot.handle_command("aircraft Other");
        pilot.handle_command("read");
        assert_eq!(pilot.settings().aircraft(), Some("Sky Hopper"));
    }

    #[test]
    fn test_read_without_sidecar() {
        let (mut pilot, _dir) = pilot();
        assert!(pilot.handle_command("read").starts_with("Error:"));
    }

    #[test]
    fn test_directory_moves_recordings() {
        let (mut pilot, dir) = pilot();
        let sub = dir.path().join("flight2");
        fs::create_dir(&sub).unwrap();

        let text = pilot.handle_command(&format!("directory {}", sub.display()));
        assert!(text.starts_with("Directory set:"));
        assert!(!text.contains("does not exist"));

        pilot.handle_command("start csv att ATTITUDE.roll");
        assert!(sub.join("att.csv").exists());
        pilot.shutdown();
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let (mut pilot, _dir) = pilot();
        pilot.handle_command("start csv a ATTITUDE.roll");
        pilot.handle_command("start power p");

        let lines = pilot.shutdown();
        assert_eq!(lines.len(), 2);
        // Power run with no samples reports its analysis failure
        assert!(lines[1].contains("Analysis of 'p' failed"));
        assert!(pilot.registry().is_empty());
    }

    #[test]
    fn test_help_and_unknown() {
        let (mut pilot, _dir) = pilot();
        assert!(pilot.handle_command("help").contains("stop <label|number>"));
        assert!(pilot.handle_command("launch").contains("unknown command 'launch'"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("prop"), "Prop");
        assert_eq!(capitalize(""), "");
    }
}

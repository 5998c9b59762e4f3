//! # Flight TestPilot Library
//!
//! Flight-test telemetry logging and post-flight performance analysis for
//! small aircraft.
//!
//! This library provides the core functionality for recording operator-selected
//! telemetry fields into per-activity tables, smoothing the recorded samples
//! and deriving power, current, endurance and range curves for a report.

pub mod activity;
pub mod analysis;
pub mod command;
pub mod config;
pub mod error;
pub mod report;
pub mod settings;
pub mod telemetry;

//! Row sink abstraction so recorders can be tested without touching disk

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TestPilotError};

/// Destination for recorded rows.
///
/// Every `write_record` must be durable on return; implementations flush
/// instead of buffering across rows.
pub trait RowSink: Send {
    /// Write one record (header or data row) and flush it.
    fn write_record(&mut self, record: &[String]) -> io::Result<()>;

    /// Flush and release the destination. Calls after the first are no-ops.
    fn close(&mut self) -> io::Result<()>;

    /// File backing this sink, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Comma-separated text file sink.
///
/// Cells containing a comma, quote or newline are quoted with `"`.
#[derive(Debug)]
pub struct CsvFileSink {
    writer: Option<csv::Writer<File>>,
    path: PathBuf,
}

impl CsvFileSink {
    /// Create (or truncate) the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| TestPilotError::SinkUnavailable {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            writer: Some(csv::Writer::from_writer(file)),
            path,
        })
    }

    /// Returns true until `close` has been called.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl RowSink for CsvFileSink {
    fn write_record(&mut self, record: &[String]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed"))?;

        writer.write_record(record)?;
        writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

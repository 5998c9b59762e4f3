//! Recorded activity tables, read back for analysis.
//!
//! Parses the files written by [`CsvFileSink`](crate::activity::sink::CsvFileSink):
//! a header row of column names (field expression text, possibly quoted)
//! followed by numeric rows where an empty cell means "not yet observed".

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::activity::recorder::FinishedActivity;
use crate::error::{Result, TestPilotError};

/// Column-oriented view of a recorded activity.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTable {
    path: Option<PathBuf>,
    headers: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl RecordedTable {
    /// Loads a recorded CSV file.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `MalformedTable` if the header is missing, a row has the wrong
    ///   number of cells, or a cell is not a number
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut table = Self::parse(&text)?;
        table.path = Some(path.to_path_buf());
        debug!("Loaded {} rows from {}", table.row_count(), path.display());
        Ok(table)
    }

    /// Parses recorded CSV text.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTable` on a missing header, ragged row or
    /// non-numeric cell.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(TestPilotError::MalformedTable {
                line: 1,
                reason: "missing header row".to_string(),
            });
        }

        let mut columns = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(malformed)?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            for (column, cell) in columns.iter_mut().zip(record.iter()) {
                column.push(parse_cell(cell, line)?);
            }
        }

        Ok(Self {
            path: None,
            headers,
            columns,
        })
    }

    /// Builds a table from rows still held in memory.
    #[must_use]
    pub fn from_finished(finished: &FinishedActivity) -> Self {
        let mut headers = Vec::with_capacity(finished.fields.len() + 1);
        headers.push(crate::activity::recorder::TIME_COLUMN.to_string());
        headers.extend(finished.fields.iter().cloned());

        let mut columns = vec![Vec::with_capacity(finished.rows.len()); headers.len()];
        for row in &finished.rows {
            columns[0].push(Some(row.elapsed));
            for (column, value) in columns[1..].iter_mut().zip(&row.values) {
                column.push(*value);
            }
        }

        Self {
            path: finished.path.clone(),
            headers,
            columns,
        }
    }

    /// File the table was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Values of the named column.
    ///
    /// # Errors
    ///
    /// Returns `MissingColumn` if no header matches `name`.
    pub fn column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| TestPilotError::MissingColumn(name.to_string()))
    }
}

fn parse_cell(cell: &str, line: usize) -> Result<Option<f64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| TestPilotError::MalformedTable {
            line,
            reason: format!("'{}' is not a number", cell),
        })
}

fn malformed(err: csv::Error) -> TestPilotError {
    TestPilotError::MalformedTable {
        line: err.position().map_or(1, |p| p.line() as usize),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::recorder::Row;
    use crate::activity::ActivityKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_columns() {
        let text = "time,VFR_HUD.airspeed,SYS_STATUS.current_battery\n\
                    0.1,,1000\n\
                    0.2,12.5,1000\n";
        let table = RecordedTable::parse(text).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.headers().len(), 3);
        assert_eq!(table.column("VFR_HUD.airspeed").unwrap(), &[None, Some(12.5)]);
        assert_eq!(
            table.column("SYS_STATUS.current_battery").unwrap(),
            &[Some(1000.0), Some(1000.0)]
        );
    }

    #[test]
    fn test_missing_column() {
        let table = RecordedTable::parse("time,A.x\n0.0,1\n").unwrap();
        match table.column("B.y") {
            Err(TestPilotError::MissingColumn(name)) => assert_eq!(name, "B.y"),
            other => panic!("Expected MissingColumn, got: {:?}", other),
        }
    }

    #[test]
    fn test_quoted_header() {
        let text = "time,\"VFR_HUD.airspeed * (1, 2)\",\"say \"\"hi\"\"\"\n1.0,2,3\n";
        let table = RecordedTable::parse(text).unwrap();
        assert_eq!(table.headers()[1], "VFR_HUD.airspeed * (1, 2)");
        assert_eq!(table.headers()[2], "say \"hi\"");
    }

    #[test]
    fn test_ragged_row() {
        let result = RecordedTable::parse("time,A.x\n0.0,1,2\n");
        match result {
            Err(TestPilotError::MalformedTable { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected MalformedTable, got: {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_cell() {
        let result = RecordedTable::parse("time,A.x\n0.0,1\n0.1,abc\n");
        match result {
            Err(TestPilotError::MalformedTable { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("abc"));
            }
            other => panic!("Expected MalformedTable, got: {:?}", other),
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(matches!(
            RecordedTable::parse(""),
            Err(TestPilotError::MalformedTable { line: 1, .. })
        ));
    }

    #[test]
    fn test_header_only() {
        let table = RecordedTable::parse("time,A.x\n").unwrap();
        assert_eq!(table.row_count(), 0);
        assert!(table.column("A.x").unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "time,A.x\r\n0.5,3\r\n").unwrap();

        let table = RecordedTable::load(file.path()).unwrap();
        assert_eq!(table.path(), Some(file.path()));
        assert_eq!(table.column("A.x").unwrap(), &[Some(3.0)]);
        assert_eq!(table.column("time").unwrap(), &[Some(0.5)]);
    }

    #[test]
    fn test_load_missing_file() {
        let result = RecordedTable::load("/nonexistent/run.csv");
        assert!(matches!(result, Err(TestPilotError::Io(_))));
    }

    #[test]
    fn test_from_finished() {
        let finished = FinishedActivity {
            kind: ActivityKind::Csv,
            label: "att".to_string(),
            fields: vec!["ATTITUDE.roll".to_string()],
            path: None,
            rows: vec![
                Row { elapsed: 0.1, values: vec![None] },
                Row { elapsed: 0.2, values: vec![Some(0.5)] },
            ],
        };

        let table = RecordedTable::from_finished(&finished);
        assert_eq!(table.headers(), &["time".to_string(), "ATTITUDE.roll".to_string()]);
        assert_eq!(table.column("time").unwrap(), &[Some(0.1), Some(0.2)]);
        assert_eq!(table.column("ATTITUDE.roll").unwrap(), &[None, Some(0.5)]);
    }
}

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::error::ProcessError;
use crate::model::ExtractionRecord;
use crate::util::ensure_directory;

use super::db_setup::{configure_connection, ensure_schema};
use super::matcher::ABSENT_ID;

/// Destination for extraction records. Sinks are handed to the recorder at
/// construction and owned by the caller for the duration of one run; they are
/// append-only and single-writer.
pub(crate) trait RecordSink {
    fn describe(&self) -> String;
    fn append(&mut self, record: &ExtractionRecord) -> Result<(), ProcessError>;
}

pub(crate) struct SqliteSink {
    connection: Connection,
    path: String,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            path: path.display().to_string(),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory db")?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            path: ":memory:".to_string(),
        })
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl RecordSink for SqliteSink {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }

    fn append(&mut self, record: &ExtractionRecord) -> Result<(), ProcessError> {
        self.connection
            .execute(
                "INSERT INTO extractions(
                   run_id, source_path, keyword, extracted_id,
                   page_index, matched_at, source_modified_at
                 )
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.run_id,
                    record.source_path,
                    record.keyword,
                    record.extracted_id.as_deref().unwrap_or(ABSENT_ID),
                    record.page_index as i64,
                    record.matched_at,
                    record.source_modified_at.as_deref().unwrap_or(ABSENT_ID),
                ],
            )
            .map_err(|error| {
                ProcessError::SinkWriteFailure(format!("{}: {}", self.describe(), error))
            })?;

        Ok(())
    }
}

pub(crate) const REPORT_HEADER: &str =
    "extracted_id,keyword,page,matched_at,source_modified_at,source_path";

pub(crate) struct CsvReportSink {
    file: File,
    path: String,
}

impl CsvReportSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("failed to create report: {}", path.display()))?;
        file.write_all(REPORT_HEADER.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .with_context(|| format!("failed to write report header: {}", path.display()))?;

        Ok(Self {
            file,
            path: path.display().to_string(),
        })
    }
}

impl RecordSink for CsvReportSink {
    fn describe(&self) -> String {
        format!("csv:{}", self.path)
    }

    fn append(&mut self, record: &ExtractionRecord) -> Result<(), ProcessError> {
        let row = render_report_row(record);
        self.file
            .write_all(row.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .and_then(|()| self.file.flush())
            .map_err(|error| {
                ProcessError::SinkWriteFailure(format!("{}: {}", self.describe(), error))
            })?;

        Ok(())
    }
}

pub(crate) fn render_report_row(record: &ExtractionRecord) -> String {
    let page = (record.page_index + 1).to_string();
    let cells = [
        record.extracted_id.as_deref().unwrap_or(ABSENT_ID),
        record.keyword.as_str(),
        page.as_str(),
        record.matched_at.as_str(),
        record.source_modified_at.as_deref().unwrap_or(ABSENT_ID),
        record.source_path.as_str(),
    ];

    cells
        .iter()
        .map(|cell| escape_csv_cell(cell))
        .collect::<Vec<String>>()
        .join(",")
}

pub(crate) fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

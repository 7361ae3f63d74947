//! Audit trail for rows that could not be merged

use crate::dialect::Dialect;
use crate::error::Result;
use crate::source::SourceDescriptor;
use crate::table::{Row, SOURCES_FOUND_IN};
use crate::writer::{write_line, write_records, WriteMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Header of the reason column in unmatched output
pub const REASON_HEADER: &str = "Reason it didn't match";

/// Why a row was kept out of the merged table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// A value failed a field rule
    FieldRule,
    /// Strict mode is on and the row matched nothing
    StrictNoMatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::FieldRule => write!(f, "Data didn't match regex/field_rule"),
            RejectReason::StrictNoMatch => write!(f, "Strict on and no match found"),
        }
    }
}

/// A rejected row, carrying the source's own (un-renamed) values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedRecord {
    pub source: String,
    pub reason: RejectReason,
    pub original: Row,
}

impl UnmatchedRecord {
    pub fn new(source: impl Into<String>, reason: RejectReason, original: Row) -> Self {
        Self {
            source: source.into(),
            reason,
            original,
        }
    }

    /// Source name, reason, then the original value of each column
    pub fn to_record(&self, columns: &[String]) -> Vec<String> {
        let mut record = Vec::with_capacity(columns.len() + 2);
        record.push(self.source.clone());
        record.push(self.reason.to_string());
        record.extend(columns.iter().map(|c| self.original.value_or_empty(c).to_string()));
        record
    }
}

/// Header for a source's block of unmatched output
pub fn unmatched_header(source: &SourceDescriptor) -> Vec<String> {
    let mut header = vec![SOURCES_FOUND_IN.to_string(), REASON_HEADER.to_string()];
    header.extend(source.original_columns());
    header
}

/// Placeholder written for a source that rejected nothing
pub fn no_unmatched_line(source: &str) -> String {
    format!("{} had no unmatched data :)", source)
}

/// Receives rejected rows during a source's absorb pass
pub trait UnmatchedSink {
    /// Record one rejected row for the source currently being absorbed
    fn reject(&mut self, record: UnmatchedRecord);

    /// Called once after `source` has been fully absorbed
    fn flush_source(&mut self, source: &SourceDescriptor) -> Result<()>;
}

/// Writes each source's rejects to one file as soon as the source finishes.
///
/// The first flush replaces whatever was in the file; later flushes append,
/// and the file is closed between sources.
#[derive(Debug)]
pub struct CsvUnmatchedSink {
    path: PathBuf,
    dialect: Dialect,
    pending: Vec<UnmatchedRecord>,
    started: bool,
    total: usize,
}

impl CsvUnmatchedSink {
    pub fn new(path: impl Into<PathBuf>, dialect: Dialect) -> Self {
        Self {
            path: path.into(),
            dialect,
            pending: Vec::new(),
            started: false,
            total: 0,
        }
    }

    /// Rejected rows written so far, across all sources
    pub fn total(&self) -> usize {
        self.total
    }
}

impl UnmatchedSink for CsvUnmatchedSink {
    fn reject(&mut self, record: UnmatchedRecord) {
        self.pending.push(record);
    }

    fn flush_source(&mut self, source: &SourceDescriptor) -> Result<()> {
        let mode = if self.started {
            WriteMode::Append
        } else {
            WriteMode::Overwrite
        };

        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            write_line(&self.path, &no_unmatched_line(&source.name), self.dialect, mode)?;
        } else {
            let columns = source.original_columns();
            let records = pending.iter().map(|r| r.to_record(&columns));
            let written = write_records(
                &self.path,
                &unmatched_header(source),
                records,
                self.dialect,
                mode,
            )?;
            self.total += written;
        }

        debug!(
            source = %source.name,
            path = %self.path.display(),
            rejected = pending.len(),
            "flushed unmatched data"
        );
        self.started = true;
        Ok(())
    }
}

/// Keeps rejects in memory, grouped by source in absorb order
#[derive(Debug, Default)]
pub struct CollectingSink {
    pending: Vec<UnmatchedRecord>,
    sources: Vec<(String, Vec<UnmatchedRecord>)>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects for one source (empty if it rejected nothing or was never flushed)
    pub fn for_source(&self, name: &str) -> &[UnmatchedRecord] {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    /// Every flushed source with its rejects
    pub fn sources(&self) -> &[(String, Vec<UnmatchedRecord>)] {
        &self.sources
    }

    pub fn total(&self) -> usize {
        self.sources.iter().map(|(_, r)| r.len()).sum()
    }
}

impl UnmatchedSink for CollectingSink {
    fn reject(&mut self, record: UnmatchedRecord) {
        self.pending.push(record);
    }

    fn flush_source(&mut self, source: &SourceDescriptor) -> Result<()> {
        let records = std::mem::take(&mut self.pending);
        self.sources.push((source.name.clone(), records));
        Ok(())
    }
}

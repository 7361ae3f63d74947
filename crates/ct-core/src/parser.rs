//! CSV reader for source files

use crate::error::{Error, Result};
use crate::table::Row;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Rows read from one source file, keyed by its header row
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Header names, in file order
    pub headers: Vec<String>,
    /// Data rows (header and ignored records removed)
    pub rows: Vec<Row>,
    /// Source file path
    pub source_path: PathBuf,
}

impl SourceTable {
    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// Parse a CSV file into rows.
///
/// Records are counted from 0 over the whole file. Record `header_row`
/// supplies the field names; it and every index in `ignored_rows` are left
/// out of the result.
pub fn read_rows<P: AsRef<Path>>(
    path: P,
    header_row: usize,
    ignored_rows: &[usize],
) -> Result<SourceTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Undecodable bytes are replaced rather than failing the whole source
    let content = String::from_utf8_lossy(&bytes);
    parse_content(&content, path.to_path_buf(), header_row, ignored_rows)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_rows_str(
    content: &str,
    source_name: &str,
    header_row: usize,
    ignored_rows: &[usize],
) -> Result<SourceTable> {
    parse_content(content, PathBuf::from(source_name), header_row, ignored_rows)
}

fn parse_content(
    content: &str,
    path: PathBuf,
    header_row: usize,
    ignored_rows: &[usize],
) -> Result<SourceTable> {
    let delimiter = sniff_delimiter(content);

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;
        records.push(record);
    }

    let headers: Vec<String> = records
        .get(header_row)
        .ok_or_else(|| Error::MissingHeaderRow {
            path: path.clone(),
            row: header_row,
        })?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() {
        return Err(Error::CsvParse {
            path,
            message: "no columns found in CSV".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row_idx, record) in records.iter().enumerate() {
        if row_idx == header_row || ignored_rows.contains(&row_idx) {
            continue;
        }

        if record.len() > headers.len() {
            warn!(
                "row {} in {} has more cells than columns, truncating",
                row_idx,
                path.display()
            );
        }

        // Short records leave their trailing fields absent
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.as_str(), v))
            .collect();

        trace!(row = row_idx, ?row, "parsed record");
        rows.push(row);
    }

    Ok(SourceTable {
        headers,
        rows,
        source_path: path,
    })
}

/// Detect the field delimiter from the first line.
///
/// Each candidate is tried on the first few lines; the one giving the most
/// consistent field count (with more than one field on line one) wins.
fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: &[u8] = &[b',', b'\t', b';', b'|'];

    let sample: Vec<&str> = content.lines().take(10).collect();
    let mut best = b',';
    let mut best_score = 0usize;

    for &delim in CANDIDATES {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map_or(1, |r| r.len())
            })
            .collect();

        let first = counts.first().copied().unwrap_or(0);
        if first <= 1 {
            continue;
        }

        let consistent = counts.iter().filter(|&&c| c == first).count();
        let score = consistent * first;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

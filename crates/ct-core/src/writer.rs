//! Writing merged tables and audit records to disk

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::table::MergedTable;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

/// How an output file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file; fail with [`Error::OutputExists`] if it is already there
    CreateNew,
    /// Create or truncate the file
    Overwrite,
    /// Create the file or add to its end
    Append,
}

fn open_output(path: &Path, mode: WriteMode) -> Result<File> {
    let mut options = OpenOptions::new();
    match mode {
        WriteMode::CreateNew => options.write(true).create_new(true),
        WriteMode::Overwrite => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };

    options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => Error::OutputExists(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a header record followed by `records`
pub fn write_records<P, I>(
    path: P,
    header: &[String],
    records: I,
    dialect: Dialect,
    mode: WriteMode,
) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Vec<String>>,
{
    let path = path.as_ref();
    let file = open_output(path, mode)?;
    let mut writer = dialect.writer_builder().from_writer(BufWriter::new(file));

    writer
        .write_record(header)
        .map_err(|e| csv_error(path, e))?;

    let mut written = 0;
    for record in records {
        writer
            .write_record(&record)
            .map_err(|e| csv_error(path, e))?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

/// Write the merged table in header order; absent fields become empty strings
pub fn write_table<P: AsRef<Path>>(
    path: P,
    table: &MergedTable,
    dialect: Dialect,
    mode: WriteMode,
) -> Result<usize> {
    let records = table.rows.iter().map(|row| table.record(row));
    write_records(path, &table.headers, records, dialect, mode)
}

/// Write a single free-text line using the dialect's line terminator
pub fn write_line<P: AsRef<Path>>(path: P, line: &str, dialect: Dialect, mode: WriteMode) -> Result<()> {
    let file = open_output(path.as_ref(), mode)?;
    let mut writer = BufWriter::new(file);
    write!(writer, "{}{}", line, dialect.line_terminator())?;
    writer.flush()?;
    Ok(())
}

/// Write the merged table as JSON (`{"headers": [...], "rows": [{...}]}`)
pub fn write_json<P: AsRef<Path>>(path: P, table: &MergedTable, mode: WriteMode) -> Result<()> {
    let file = open_output(path.as_ref(), mode)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, table)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

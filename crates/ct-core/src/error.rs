//! Error types for ct-core

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ct-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The requested header row is past the end of the file
    #[error("header row {row} not found in '{path}'")]
    MissingHeaderRow { path: PathBuf, row: usize },

    /// Config file is not valid TOML (or has the wrong shape)
    #[error("failed to parse config '{path}': {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Config could not be turned into TOML text
    #[error("failed to write config '{path}': {message}")]
    ConfigWrite { path: PathBuf, message: String },

    /// One or more configuration problems, all reported together
    #[error("{0}")]
    InvalidConfig(ConfigErrors),

    /// Output file exists and the write mode forbids replacing it
    #[error("output file '{0}' already exists")]
    OutputExists(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigErrors> for Error {
    fn from(errors: ConfigErrors) -> Self {
        Error::InvalidConfig(errors)
    }
}

/// A single configuration or source problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("[{section}] is missing required key '{key}'")]
    MissingKey { section: String, key: String },

    #[error("[{section}] key '{key}' must not be empty")]
    EmptyValue { section: String, key: String },

    #[error("no sources configured")]
    NoSources,

    #[error("source '{0}' is defined more than once")]
    DuplicateSource(String),

    #[error("source '{source_name}': '{names_key}' has {found} entries but '{columns_key}' has {expected}")]
    MappingLengthMismatch {
        source_name: String,
        columns_key: String,
        names_key: String,
        expected: usize,
        found: usize,
    },

    #[error("source '{source_name}': more than one column is mapped to '{field}'")]
    DuplicateOutputName { source_name: String, field: String },

    #[error("unknown output dialect '{0}' (expected excel, excel_tab or unix)")]
    UnknownDialect(String),

    #[error("{scope}: invalid regex for '{field}': {message}")]
    InvalidRegex {
        scope: String,
        field: String,
        message: String,
    },

    #[error("{scope}: '{field}' is not a header that will appear in the output")]
    UnknownRuleField { scope: String, field: String },

    #[error("source '{source_name}': '{path}' does not exist or is not a file")]
    SourceNotFound { source_name: String, path: PathBuf },

    #[error("source '{source_name}': column '{column}' not found in '{path}'")]
    MissingColumn {
        source_name: String,
        column: String,
        path: PathBuf,
    },

    #[error("source '{source_name}': header row {row} not found in '{path}'")]
    InvalidHeaderRow {
        source_name: String,
        row: usize,
        path: PathBuf,
    },
}

/// Every configuration problem found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ConfigError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ConfigError>) {
        self.0.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected, otherwise the whole list as an error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(self))
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration ({} problem(s))", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl IntoIterator for ConfigErrors {
    type Item = ConfigError;
    type IntoIter = std::vec::IntoIter<ConfigError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

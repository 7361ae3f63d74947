//! Per-source merge configuration

use crate::mapping::NameMapping;
use crate::rules::RuleSet;
use crate::table::Row;
use std::path::PathBuf;

/// Everything the engine needs to absorb one source.
///
/// Built once by the config loader; the engine never looks at the raw
/// config again.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    /// Source name, as recorded in `Sources found in`
    pub name: String,
    /// File the rows were read from
    pub path: PathBuf,
    /// Materialized rows, keyed by the file's own header names
    pub rows: Vec<Row>,
    /// Source column to output field mapping (match-by columns first)
    pub mapping: NameMapping,
    /// Rules checked against rows this source contributed to, after merging
    pub rules: RuleSet,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, mapping: NameMapping, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            rows,
            mapping,
            rules: RuleSet::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Output field names rows are matched by
    pub fn match_key(&self) -> Vec<String> {
        self.mapping.match_key()
    }

    /// Original column names, in mapping order
    pub fn original_columns(&self) -> Vec<String> {
        self.mapping.columns().map(str::to_string).collect()
    }
}

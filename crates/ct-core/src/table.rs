//! Core row and table types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output field listing every source that contributed to a row
pub const SOURCES_FOUND_IN: &str = "Sources found in";
/// Output field holding the source-rule audit result
pub const SOURCE_RULES_BROKEN: &str = "Source rules broken";
/// Value of [`SOURCE_RULES_BROKEN`] until the audit pass runs
pub const NOT_CHECKED: &str = "Not checked";
/// Value of [`SOURCE_RULES_BROKEN`] when a row passed every applicable rule
pub const NO_RULES_BROKEN: &str = "None";
/// Separator used when joining source names and rule violations
pub const LIST_SEPARATOR: &str = ", ";

/// A record: field name to string value.
///
/// An empty string is a real value; a field that was never set is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, String>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Set a field value, returning the previous one
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// True when the field is absent or holds the empty string
    pub fn is_blank(&self, field: &str) -> bool {
        self.get(field).map_or(true, str::is_empty)
    }

    /// Value of a field, reading absent fields as the empty string
    pub fn value_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (field, value) pairs in field-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Source names recorded in [`SOURCES_FOUND_IN`]
    pub fn sources(&self) -> Vec<&str> {
        match self.get(SOURCES_FOUND_IN) {
            Some(list) if !list.is_empty() => list.split(LIST_SEPARATOR).collect(),
            _ => Vec::new(),
        }
    }

    /// Record a contributing source, keeping the list free of repeats
    ///
    /// Returns false when the source was already listed.
    pub fn add_source(&mut self, source: &str) -> bool {
        if self.sources().contains(&source) {
            return false;
        }

        let joined = match self.get(SOURCES_FOUND_IN) {
            Some(list) if !list.is_empty() => format!("{}{}{}", list, LIST_SEPARATOR, source),
            _ => source.to_string(),
        };
        self.insert(SOURCES_FOUND_IN, joined);
        true
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The merged output: ordered headers plus rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedTable {
    /// Column order for the final write
    pub headers: Vec<String>,
    /// Merged rows, in the order they entered the table
    pub rows: Vec<Row>,
}

impl MergedTable {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column index by name
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Find the first row whose `field` equals `value`
    pub fn find_row(&self, field: &str, value: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.get(field) == Some(value))
    }

    /// Row values laid out in header order, absent fields as empty strings
    pub fn record(&self, row: &Row) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| row.value_or_empty(h).to_string())
            .collect()
    }
}

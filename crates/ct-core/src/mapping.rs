//! Source-to-output column name mapping and header unification

use crate::table::{Row, SOURCES_FOUND_IN, SOURCE_RULES_BROKEN};
use std::collections::HashSet;

/// Maps a source's column names onto output field names.
///
/// Match-by columns always come first, followed by the other transferred
/// columns, each in the order they were added. A column can only be mapped
/// once; later additions of the same source column are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapping {
    match_by: Vec<(String, String)>,
    targets: Vec<(String, String)>,
}

impl NameMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a match-by column; an empty `name` keeps the column's own name
    pub fn add_match_by(&mut self, column: impl Into<String>, name: impl Into<String>) -> &mut Self {
        if let Some(entry) = self.entry(column.into(), name.into()) {
            self.match_by.push(entry);
        }
        self
    }

    /// Add a transferred column; an empty `name` keeps the column's own name
    pub fn add_target(&mut self, column: impl Into<String>, name: impl Into<String>) -> &mut Self {
        if let Some(entry) = self.entry(column.into(), name.into()) {
            self.targets.push(entry);
        }
        self
    }

    fn entry(&self, column: String, name: String) -> Option<(String, String)> {
        if self.get(&column).is_some() {
            return None;
        }
        let name = if name.is_empty() { column.clone() } else { name };
        Some((column, name))
    }

    /// Output name for a mapped column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.iter()
            .find(|(c, _)| *c == column)
            .map(|(_, name)| name)
    }

    /// Output name for any column, falling back to the column's own name
    pub fn output_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.get(column).unwrap_or(column)
    }

    /// (source column, output field) pairs, match-by columns first
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.match_by
            .iter()
            .chain(self.targets.iter())
            .map(|(c, n)| (c.as_str(), n.as_str()))
    }

    /// Source column names in mapping order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(c, _)| c)
    }

    /// Output field names in mapping order
    pub fn output_fields(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(_, n)| n)
    }

    /// Output names that more than one column maps to, in first-seen order
    pub fn duplicate_outputs(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for name in self.output_fields() {
            if !seen.insert(name) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
        duplicates
    }

    /// Output field names rows from this source are matched by
    pub fn match_key(&self) -> Vec<String> {
        self.match_by.iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.match_by.len() + self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rename every mapped column present in `raw`; unmapped columns are dropped
    pub fn apply(&self, raw: &Row) -> Row {
        self.iter()
            .filter_map(|(column, name)| raw.get(column).map(|value| (name, value)))
            .collect()
    }
}

/// Output header order: the two reserved fields, then every mapped output
/// field in first-seen order across `mappings`.
pub fn unify_headers<'a>(mappings: impl IntoIterator<Item = &'a NameMapping>) -> Vec<String> {
    let mut headers = vec![SOURCES_FOUND_IN.to_string(), SOURCE_RULES_BROKEN.to_string()];
    let mut seen: HashSet<String> = headers.iter().cloned().collect();

    for mapping in mappings {
        for name in mapping.output_fields() {
            if seen.insert(name.to_string()) {
                headers.push(name.to_string());
            }
        }
    }

    headers
}

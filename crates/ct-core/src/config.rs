//! Merge configuration file
//!
//! The TOML file is read into loosely typed structs first so that every
//! problem can be collected and reported in one go, then turned into a
//! [`MergePlan`] whose sources are fully loaded.
//!
//! ```toml
//! strict = false
//!
//! [output]
//! file_name = "output.csv"
//! unmatched_file_name = "unmatched.csv"
//! dialect = "excel"
//!
//! [field_rules]
//! ssn = "^[0-9]+$"
//!
//! [[sources]]
//! name = "hr"
//! path = "hr.csv"
//! match_by = ["Social Security Number"]
//! match_by_names = ["ssn"]
//! target_columns = ["Name"]
//!
//! [sources.rules]
//! Name = "\\w"
//! ```

use crate::dialect::Dialect;
use crate::error::{ConfigError, ConfigErrors, Error, Result};
use crate::mapping::{unify_headers, NameMapping};
use crate::parser::read_rows;
use crate::pipeline::MergePlan;
use crate::rules::{RuleScope, RuleSet};
use crate::source::SourceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The config file as written on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Only the first source may add unmatched rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
    /// Output field to regex, checked before matching
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_rules: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: Vec<SourceSection>,
}

/// Fallbacks for per-source settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row_num: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_rows: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Empty means no unmatched output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub match_by: Vec<String>,
    /// Output names for `match_by`, position for position; "" keeps the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_by_names: Option<Vec<String>>,
    #[serde(default)]
    pub target_columns: Vec<String>,
    /// Output names for `target_columns`, position for position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row_num: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_rows: Option<Vec<usize>>,
    /// Output field to regex, audited after merging
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, String>,
}

/// Where and how the merged table is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub file: PathBuf,
    pub unmatched_file: Option<PathBuf>,
    pub dialect: Dialect,
}

/// A source whose settings are valid but whose rows are not yet read
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub mapping: NameMapping,
    pub rules: RuleSet,
    pub header_row: usize,
    pub ignored_rows: Vec<usize>,
}

/// Validated settings, before any source file is read
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub sources: Vec<SourceSpec>,
    pub field_rules: RuleSet,
    pub strict: bool,
    pub output: OutputSettings,
}

/// A config ready to run: every source loaded
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The config file this was loaded from
    pub path: PathBuf,
    pub plan: MergePlan,
    pub output: OutputSettings,
}

impl ConfigFile {
    /// Parse config text; `path` is only used for error messages
    pub fn from_toml(input: &str, path: &Path) -> Result<Self> {
        toml::from_str(input).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load a config file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    /// Write the config to a new file; an existing file is never replaced
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| Error::ConfigWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::OutputExists(path.to_path_buf()),
                _ => Error::Io(e),
            })?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    /// A starting config with one section per (name, path) pair
    pub fn template(sources: &[(String, String)]) -> Self {
        let sources = if sources.is_empty() {
            vec![
                ("first".to_string(), "first.csv".to_string()),
                ("second".to_string(), "second.csv".to_string()),
            ]
        } else {
            sources.to_vec()
        };

        Self {
            strict: Some(false),
            defaults: DefaultsSection {
                header_row_num: Some(0),
                ignored_rows: Some(Vec::new()),
            },
            output: Some(OutputSection {
                file_name: Some("output.csv".to_string()),
                unmatched_file_name: Some("unmatched.csv".to_string()),
                dialect: Some(Dialect::default().to_string()),
            }),
            field_rules: BTreeMap::new(),
            sources: sources
                .into_iter()
                .map(|(name, path)| SourceSection {
                    name: Some(name),
                    path: Some(path),
                    match_by: vec!["id".to_string()],
                    target_columns: vec!["value".to_string()],
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// Check every setting, resolving relative paths against `base_dir`.
    ///
    /// All problems are collected rather than stopping at the first.
    pub fn validate(&self, base_dir: &Path) -> std::result::Result<ValidatedConfig, ConfigErrors> {
        let mut errors = ConfigErrors::new();

        let output = self.validate_output(base_dir, &mut errors);

        let field_rules = match RuleSet::compile(&RuleScope::Field, &self.field_rules) {
            Ok(rules) => rules,
            Err(e) => {
                errors.extend(e);
                RuleSet::new()
            }
        };

        if self.sources.is_empty() {
            errors.push(ConfigError::NoSources);
        }

        let mut names = HashSet::new();
        let mut sources = Vec::new();
        for (index, section) in self.sources.iter().enumerate() {
            let spec = self.validate_source(index, section, base_dir, &mut errors);
            if !spec.name.is_empty() && !names.insert(spec.name.clone()) {
                errors.push(ConfigError::DuplicateSource(spec.name.clone()));
            }
            sources.push(spec);
        }

        // Rules may only name fields that some source writes. Sources with
        // their own problems still contribute their mapping here.
        let headers = unify_headers(sources.iter().map(|s| &s.mapping));
        errors.extend(field_rules.check_fields(&RuleScope::Field, &headers));
        for spec in &sources {
            let scope = RuleScope::Source(spec.name.clone());
            errors.extend(spec.rules.check_fields(&scope, &headers));
        }

        match output {
            Some(output) if errors.is_empty() => Ok(ValidatedConfig {
                sources,
                field_rules,
                strict: self.strict.unwrap_or(false),
                output,
            }),
            _ => Err(errors),
        }
    }

    fn validate_output(&self, base_dir: &Path, errors: &mut ConfigErrors) -> Option<OutputSettings> {
        let Some(output) = &self.output else {
            errors.push(ConfigError::MissingKey {
                section: "output".to_string(),
                key: "file_name".to_string(),
            });
            return None;
        };

        let dialect = match output.dialect.as_deref() {
            None => Some(Dialect::default()),
            Some(token) => match token.parse::<Dialect>() {
                Ok(dialect) => Some(dialect),
                Err(token) => {
                    errors.push(ConfigError::UnknownDialect(token));
                    None
                }
            },
        };

        let file = match output.file_name.as_deref() {
            None => {
                errors.push(ConfigError::MissingKey {
                    section: "output".to_string(),
                    key: "file_name".to_string(),
                });
                None
            }
            Some(name) if name.trim().is_empty() => {
                errors.push(ConfigError::EmptyValue {
                    section: "output".to_string(),
                    key: "file_name".to_string(),
                });
                None
            }
            Some(name) => Some(base_dir.join(name)),
        };

        let unmatched_file = output
            .unmatched_file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| base_dir.join(name));

        Some(OutputSettings {
            file: file?,
            unmatched_file,
            dialect: dialect?,
        })
    }

    fn validate_source(
        &self,
        index: usize,
        section: &SourceSection,
        base_dir: &Path,
        errors: &mut ConfigErrors,
    ) -> SourceSpec {
        let label = match section.name.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("sources.{}", name),
            _ => format!("sources[{}]", index),
        };

        let name = match section.name.as_deref() {
            None => {
                errors.push(ConfigError::MissingKey {
                    section: label.clone(),
                    key: "name".to_string(),
                });
                String::new()
            }
            Some(name) if name.trim().is_empty() => {
                errors.push(ConfigError::EmptyValue {
                    section: label.clone(),
                    key: "name".to_string(),
                });
                String::new()
            }
            Some(name) => name.to_string(),
        };

        let path = match section.path.as_deref() {
            None => {
                errors.push(ConfigError::MissingKey {
                    section: label.clone(),
                    key: "path".to_string(),
                });
                PathBuf::new()
            }
            Some(path) => {
                let resolved = base_dir.join(path);
                if !resolved.is_file() {
                    errors.push(ConfigError::SourceNotFound {
                        source_name: name.clone(),
                        path: resolved.clone(),
                    });
                }
                resolved
            }
        };

        let match_by_names = renames(
            &name,
            ("match_by", &section.match_by),
            ("match_by_names", section.match_by_names.as_deref()),
            errors,
        );
        let column_names = renames(
            &name,
            ("target_columns", &section.target_columns),
            ("column_names", section.column_names.as_deref()),
            errors,
        );

        if section.match_by.is_empty() && section.target_columns.is_empty() {
            errors.push(ConfigError::EmptyValue {
                section: label.clone(),
                key: "target_columns".to_string(),
            });
        }

        let rules = match RuleSet::compile(&RuleScope::Source(name.clone()), &section.rules) {
            Ok(rules) => rules,
            Err(e) => {
                errors.extend(e);
                RuleSet::new()
            }
        };

        let mut mapping = NameMapping::new();
        for (column, new_name) in section.match_by.iter().zip(match_by_names) {
            mapping.add_match_by(column.as_str(), new_name);
        }
        for (column, new_name) in section.target_columns.iter().zip(column_names) {
            mapping.add_target(column.as_str(), new_name);
        }
        for field in mapping.duplicate_outputs() {
            errors.push(ConfigError::DuplicateOutputName {
                source_name: name.clone(),
                field: field.to_string(),
            });
        }

        let header_row = section
            .header_row_num
            .or(self.defaults.header_row_num)
            .unwrap_or(0);
        let ignored_rows = section
            .ignored_rows
            .clone()
            .or_else(|| self.defaults.ignored_rows.clone())
            .unwrap_or_default();

        SourceSpec {
            name,
            path,
            mapping,
            rules,
            header_row,
            ignored_rows,
        }
    }
}

/// New names for `columns`, one per column; missing lists mean "keep the name".
///
/// A list of the wrong length is reported and padded or cut to fit, so the
/// rest of validation still sees every column.
fn renames(
    source_name: &str,
    (columns_key, columns): (&str, &[String]),
    (names_key, names): (&str, Option<&[String]>),
    errors: &mut ConfigErrors,
) -> Vec<String> {
    match names {
        None => vec![String::new(); columns.len()],
        Some(names) if names.len() == columns.len() => names.to_vec(),
        Some(names) => {
            errors.push(ConfigError::MappingLengthMismatch {
                source_name: source_name.to_string(),
                columns_key: columns_key.to_string(),
                names_key: names_key.to_string(),
                expected: columns.len(),
                found: names.len(),
            });
            let mut names = names.to_vec();
            names.resize(columns.len(), String::new());
            names
        }
    }
}

impl SourceSpec {
    /// Read the source file and check that every mapped column exists
    fn materialize(self, errors: &mut ConfigErrors) -> Result<Option<SourceDescriptor>> {
        let table = match read_rows(&self.path, self.header_row, &self.ignored_rows) {
            Ok(table) => table,
            Err(Error::MissingHeaderRow { path, row }) => {
                errors.push(ConfigError::InvalidHeaderRow {
                    source_name: self.name,
                    row,
                    path,
                });
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let before = errors.len();
        for column in self.mapping.columns() {
            if !table.has_column(column) {
                errors.push(ConfigError::MissingColumn {
                    source_name: self.name.clone(),
                    column: column.to_string(),
                    path: self.path.clone(),
                });
            }
        }
        if errors.len() > before {
            return Ok(None);
        }

        debug!(
            source = %self.name,
            path = %self.path.display(),
            rows = table.row_count(),
            "loaded source"
        );

        Ok(Some(
            SourceDescriptor::new(self.name, self.mapping, table.rows)
                .with_path(self.path)
                .with_rules(self.rules),
        ))
    }
}

/// Load, validate and materialize a config file.
///
/// Relative paths in the file are resolved against the file's directory.
/// Configuration and source problems are all reported together as
/// [`Error::InvalidConfig`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadedConfig> {
    let path = path.as_ref();
    let file = ConfigFile::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let validated = file.validate(base_dir)?;

    let mut errors = ConfigErrors::new();
    let mut sources = Vec::with_capacity(validated.sources.len());
    for spec in validated.sources {
        if let Some(source) = spec.materialize(&mut errors)? {
            sources.push(source);
        }
    }
    errors.into_result()?;

    let plan = MergePlan::new(sources)
        .with_field_rules(validated.field_rules)
        .with_strict(validated.strict);

    Ok(LoadedConfig {
        path: path.to_path_buf(),
        plan,
        output: validated.output,
    })
}

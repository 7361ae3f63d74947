//! ct-core: Core library for merging CSV sources into one table
//!
//! This library provides functionality to:
//! - Load a TOML merge configuration describing every source
//! - Parse CSV files into rows keyed by column name
//! - Rename each source's columns onto a shared set of output fields
//! - Merge sources in order, matching rows by key fields and filling blanks
//! - Audit merged rows against per-source rules
//! - Write the merged table and every rejected row

pub mod config;
pub mod dialect;
pub mod enforcer;
pub mod error;
pub mod mapping;
pub mod merger;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod source;
pub mod table;
pub mod unmatched;
pub mod writer;

pub use config::{load_config, ConfigFile, LoadedConfig, OutputSettings};
pub use dialect::Dialect;
pub use enforcer::enforce;
pub use error::{ConfigError, ConfigErrors, Error, Result};
pub use mapping::{unify_headers, NameMapping};
pub use merger::{AbsorbStats, MergeEngine};
pub use parser::{parse_rows_str, read_rows, SourceTable};
pub use pipeline::{merge_sources, MergeOutcome, MergePlan};
pub use report::RunReport;
pub use rules::{Rule, RuleScope, RuleSet};
pub use source::SourceDescriptor;
pub use table::{MergedTable, Row};
pub use unmatched::{CollectingSink, CsvUnmatchedSink, RejectReason, UnmatchedRecord, UnmatchedSink};
pub use writer::{write_json, write_table, WriteMode};

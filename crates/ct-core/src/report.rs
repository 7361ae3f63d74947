//! Summary of a finished merge run, saved as JSON

use crate::config::LoadedConfig;
use crate::error::{Error, Result};
use crate::merger::AbsorbStats;
use crate::pipeline::MergeOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// When the output was written
    pub completed_at: DateTime<Utc>,
    pub config: PathBuf,
    pub output_file: PathBuf,
    pub unmatched_file: Option<PathBuf>,
    pub strict: bool,
    /// Rows in the merged output
    pub rows: usize,
    /// Rows with at least one source rule broken
    pub flagged_rows: usize,
    /// One entry per source, in absorb order
    pub sources: Vec<AbsorbStats>,
}

impl RunReport {
    /// Build a report for `outcome`, stamped with the current time
    pub fn new(config: &LoadedConfig, outcome: &MergeOutcome) -> Self {
        Self {
            completed_at: Utc::now(),
            config: config.path.clone(),
            output_file: config.output.file.clone(),
            unmatched_file: config.output.unmatched_file.clone(),
            strict: config.plan.strict,
            rows: outcome.table.row_count(),
            flagged_rows: outcome.flagged_rows,
            sources: outcome.stats.clone(),
        }
    }

    pub fn rejected(&self) -> usize {
        self.sources.iter().map(AbsorbStats::rejected).sum()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the report, replacing any previous one
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

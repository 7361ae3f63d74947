//! The merge run: pre-flight checks, absorb every source, audit, done

use crate::enforcer::enforce;
use crate::error::{ConfigError, ConfigErrors, Result};
use crate::mapping::unify_headers;
use crate::merger::{AbsorbStats, MergeEngine};
use crate::rules::{RuleScope, RuleSet};
use crate::source::SourceDescriptor;
use crate::table::MergedTable;
use crate::unmatched::UnmatchedSink;
use std::collections::HashSet;
use tracing::{info, info_span};

/// Sources in absorb order plus the settings that apply to all of them
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub sources: Vec<SourceDescriptor>,
    pub field_rules: RuleSet,
    pub strict: bool,
}

impl MergePlan {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }

    pub fn with_field_rules(mut self, field_rules: RuleSet) -> Self {
        self.field_rules = field_rules;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Header order of the merged output
    pub fn output_headers(&self) -> Vec<String> {
        unify_headers(self.sources.iter().map(|s| &s.mapping))
    }

    /// Problems that must be fixed before any source is absorbed
    pub fn preflight(&self) -> ConfigErrors {
        let mut errors = ConfigErrors::new();

        if self.sources.is_empty() {
            errors.push(ConfigError::NoSources);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                errors.push(ConfigError::DuplicateSource(source.name.clone()));
            }
        }

        let headers = self.output_headers();
        errors.extend(self.field_rules.check_fields(&RuleScope::Field, &headers));
        for source in &self.sources {
            let scope = RuleScope::Source(source.name.clone());
            errors.extend(source.rules.check_fields(&scope, &headers));
        }

        errors
    }
}

/// A finished merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Merged rows with the unified headers
    pub table: MergedTable,
    /// Per-source counts, in absorb order
    pub stats: Vec<AbsorbStats>,
    /// Rows with at least one source rule broken
    pub flagged_rows: usize,
}

impl MergeOutcome {
    pub fn rejected(&self) -> usize {
        self.stats.iter().map(AbsorbStats::rejected).sum()
    }
}

/// Merge every source of `plan`, in order.
///
/// Each source's rejects are flushed to `sink` as soon as that source is
/// done. The source-rule audit runs once at the end. Nothing is absorbed if
/// the plan fails its pre-flight checks.
pub fn merge_sources(plan: &MergePlan, sink: &mut dyn UnmatchedSink) -> Result<MergeOutcome> {
    plan.preflight().into_result()?;

    let headers = plan.output_headers();
    let mut engine = MergeEngine::new(&plan.field_rules, plan.strict);
    let mut stats = Vec::with_capacity(plan.sources.len());

    for source in &plan.sources {
        let _span = info_span!("absorb", source = %source.name).entered();
        stats.push(engine.absorb(source, sink));
        sink.flush_source(source)?;
    }

    let mut rows = engine.into_rows();
    let flagged_rows = enforce(&mut rows, &plan.sources);

    info!(
        sources = plan.sources.len(),
        rows = rows.len(),
        flagged = flagged_rows,
        "merge complete"
    );

    Ok(MergeOutcome {
        table: MergedTable::new(headers, rows),
        stats,
        flagged_rows,
    })
}

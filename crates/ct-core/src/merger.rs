//! Merge engine: absorbs sources one at a time into a growing table

use crate::rules::RuleSet;
use crate::source::SourceDescriptor;
use crate::table::{Row, NOT_CHECKED, SOURCES_FOUND_IN, SOURCE_RULES_BROKEN};
use crate::unmatched::{RejectReason, UnmatchedRecord, UnmatchedSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// What happened to one source's rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsorbStats {
    /// Source name
    pub source: String,
    /// Rows the source supplied
    pub rows_read: usize,
    /// Rows added to the table as new rows
    pub appended: usize,
    /// Rows that matched at least one existing row
    pub matched: usize,
    /// Existing rows that gained a value or a source name
    pub rows_filled: usize,
    /// Rows rejected by a field rule
    pub rejected_by_field_rule: usize,
    /// Rows rejected because strict mode found no match
    pub rejected_by_strict: usize,
}

impl AbsorbStats {
    fn new(source: &str, rows_read: usize) -> Self {
        Self {
            source: source.to_string(),
            rows_read,
            ..Default::default()
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejected_by_field_rule + self.rejected_by_strict
    }
}

/// Owns the merged rows while sources are absorbed in order
#[derive(Debug)]
pub struct MergeEngine<'a> {
    rows: Vec<Row>,
    field_rules: &'a RuleSet,
    strict: bool,
    absorbed: usize,
}

impl<'a> MergeEngine<'a> {
    pub fn new(field_rules: &'a RuleSet, strict: bool) -> Self {
        Self {
            rows: Vec::new(),
            field_rules,
            strict,
            absorbed: 0,
        }
    }

    /// Rows merged so far
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of sources absorbed so far
    pub fn sources_absorbed(&self) -> usize {
        self.absorbed
    }

    /// Absorb every row of `source` into the table.
    ///
    /// Rows are only compared against the table as it stood before this
    /// source started; rows that become new table rows are appended once the
    /// whole source has been processed. Rejected rows go to `sink`.
    pub fn absorb(&mut self, source: &SourceDescriptor, sink: &mut dyn UnmatchedSink) -> AbsorbStats {
        let first_source = self.absorbed == 0;
        let match_key = source.match_key();
        let mut stats = AbsorbStats::new(&source.name, source.rows.len());
        let mut new_rows: Vec<Row> = Vec::new();

        for (row_idx, raw) in source.rows.iter().enumerate() {
            let candidate = extract(source, raw);
            trace!(source = %source.name, row = row_idx, ?candidate, "extracted candidate");

            if let Some(rule) = self.field_rules.gate(&candidate) {
                debug!(
                    source = %source.name,
                    row = row_idx,
                    field = %rule.field,
                    "row failed field rule"
                );
                sink.reject(UnmatchedRecord::new(
                    &source.name,
                    RejectReason::FieldRule,
                    raw.clone(),
                ));
                stats.rejected_by_field_rule += 1;
                continue;
            }

            // One row may fill several existing rows; keep scanning after a hit
            let mut matched = false;
            for existing in self.rows.iter_mut() {
                if !is_match(&match_key, &candidate, existing) {
                    continue;
                }
                matched = true;
                if fill(existing, &candidate, &source.name) {
                    stats.rows_filled += 1;
                }
            }

            if matched {
                stats.matched += 1;
            } else if self.strict && !first_source {
                debug!(source = %source.name, row = row_idx, "no match in strict mode");
                sink.reject(UnmatchedRecord::new(
                    &source.name,
                    RejectReason::StrictNoMatch,
                    raw.clone(),
                ));
                stats.rejected_by_strict += 1;
            } else {
                new_rows.push(candidate);
            }
        }

        stats.appended = new_rows.len();
        self.rows.extend(new_rows);
        self.absorbed += 1;

        info!(
            source = %source.name,
            rows = stats.rows_read,
            appended = stats.appended,
            matched = stats.matched,
            filled = stats.rows_filled,
            rejected = stats.rejected(),
            "absorbed source"
        );

        stats
    }
}

/// Rename the mapped fields of `raw` and stamp the reserved fields
fn extract(source: &SourceDescriptor, raw: &Row) -> Row {
    let mut candidate = source.mapping.apply(raw);
    candidate.insert(SOURCES_FOUND_IN, source.name.as_str());
    candidate.insert(SOURCE_RULES_BROKEN, NOT_CHECKED);
    candidate
}

/// True when any key field is non-empty in `candidate` and equal in `existing`
fn is_match(match_key: &[String], candidate: &Row, existing: &Row) -> bool {
    match_key.iter().any(|field| match candidate.get(field) {
        Some(value) if !value.is_empty() => existing.get(field) == Some(value),
        _ => false,
    })
}

/// Copy candidate values into blank fields of `existing` and record the
/// source. Populated fields are never overwritten.
///
/// Returns true if `existing` changed.
fn fill(existing: &mut Row, candidate: &Row, source: &str) -> bool {
    let mut changed = false;

    for (field, value) in candidate.iter() {
        if field == SOURCES_FOUND_IN {
            changed |= existing.add_source(source);
        } else if !value.is_empty() && existing.is_blank(field) {
            existing.insert(field, value);
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::NameMapping;
    use crate::rules::RuleScope;
    use crate::unmatched::CollectingSink;

    fn rows(data: &[&[(&str, &str)]]) -> Vec<Row> {
        data.iter().map(|r| r.iter().copied().collect()).collect()
    }

    fn source(
        name: &str,
        match_by: &[(&str, &str)],
        targets: &[(&str, &str)],
        data: &[&[(&str, &str)]],
    ) -> SourceDescriptor {
        let mut mapping = NameMapping::new();
        for (c, n) in match_by {
            mapping.add_match_by(*c, *n);
        }
        for (c, n) in targets {
            mapping.add_target(*c, *n);
        }
        SourceDescriptor::new(name, mapping, rows(data))
    }

    fn powers() -> SourceDescriptor {
        source(
            "powers",
            &[],
            &[("x", ""), ("x^2", ""), ("x^3", "")],
            &[
                &[("x", "1"), ("x^2", "1"), ("x^3", "1")],
                &[("x", "2"), ("x^2", "4"), ("x^3", "8")],
                &[("x", "3"), ("x^2", "9"), ("x^3", "27")],
                &[("x", "4"), ("x^2", "16"), ("x^3", "64")],
                &[("x", "5"), ("x^2", "25"), ("x^3", "125")],
            ],
        )
    }

    fn funcs() -> SourceDescriptor {
        source(
            "funcs",
            &[("t", "x")],
            &[("func1", ""), ("func2", "x^2")],
            &[
                &[("t", "1"), ("func1", "2"), ("func2", "4")],
                &[("t", "2"), ("func1", "4"), ("func2", "")],
                &[("t", "3"), ("func1", "6"), ("func2", "88")],
                &[("t", "4"), ("func1", "8"), ("func2", "")],
                &[("t", "5"), ("func1", "10"), ("func2", "3")],
                &[("t", "6"), ("func1", "13"), ("func2", "")],
                &[("t", "7"), ("func1", "19"), ("func2", "2")],
            ],
        )
    }

    #[test]
    fn test_transfer_between_sources() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let first = engine.absorb(&powers(), &mut sink);
        assert_eq!(first.appended, 5);

        let second = engine.absorb(&funcs(), &mut sink);
        assert_eq!(second.matched, 5);
        assert_eq!(second.appended, 2);
        assert_eq!(second.rows_filled, 5);

        let rows = engine.rows();
        assert_eq!(rows.len(), 7);

        // Keys 1..5 merged: existing x^2 values win, func1 is filled in
        assert_eq!(rows[0].get(SOURCES_FOUND_IN), Some("powers, funcs"));
        assert_eq!(rows[0].get("x^2"), Some("1"));
        assert_eq!(rows[0].get("func1"), Some("2"));
        assert_eq!(rows[4].get("x^3"), Some("125"));
        assert_eq!(rows[4].get("func1"), Some("10"));

        // Keys 6 and 7 only exist in the second source
        assert_eq!(rows[5].get(SOURCES_FOUND_IN), Some("funcs"));
        assert_eq!(rows[5].get("x"), Some("6"));
        assert_eq!(rows[5].get("x^2"), Some(""));
        assert_eq!(rows[6].get("x^2"), Some("2"));
        assert!(rows[6].get("x^3").is_none());

        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_fill_only_blank_fields() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let songs = source(
            "mine",
            &[("song", "")],
            &[("rating", ""), ("comment", "")],
            &[
                &[("song", "HEAVY DAY"), ("rating", "9/10"), ("comment", "")],
                &[("song", "Requiem"), ("rating", ""), ("comment", "ok")],
            ],
        );
        let theirs = source(
            "theirs",
            &[("Song", "song")],
            &[("Rating", "rating"), ("Comment", "comment")],
            &[
                &[("Song", "HEAVY DAY"), ("Rating", "11/10"), ("Comment", "loud")],
                &[("Song", "Requiem"), ("Rating", "10/10"), ("Comment", "meh")],
            ],
        );

        engine.absorb(&songs, &mut sink);
        engine.absorb(&theirs, &mut sink);

        let rows = engine.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("rating"), Some("9/10"));
        assert_eq!(rows[0].get("comment"), Some("loud"));
        assert_eq!(rows[1].get("rating"), Some("10/10"));
        assert_eq!(rows[1].get("comment"), Some("ok"));
    }

    #[test]
    fn test_empty_values_do_not_count_as_fills() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        engine.absorb(&source("hr", &[("id", "")], &[("x", "")], &[&[("id", "1"), ("x", "1")]]), &mut sink);

        let blank = engine.absorb(&source("hr", &[("id", "")], &[("c", "")], &[&[("id", "1"), ("c", "")]]), &mut sink);
        assert_eq!(blank.matched, 1);
        assert_eq!(blank.rows_filled, 0);
        assert!(!engine.rows()[0].contains("c"));

        let filled = engine.absorb(&source("hr", &[("id", "")], &[("c", "")], &[&[("id", "1"), ("c", "z")]]), &mut sink);
        assert_eq!(filled.rows_filled, 1);
        assert_eq!(engine.rows()[0].get("c"), Some("z"));
    }

    #[test]
    fn test_match_is_or_over_key_fields() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let a = source(
            "a",
            &[("ssn", ""), ("name", "")],
            &[],
            &[&[("ssn", "123"), ("name", "John Smith")]],
        );
        let b = source(
            "b",
            &[("ssn", ""), ("name", "")],
            &[("color", "")],
            &[&[("ssn", "999"), ("name", "John Smith"), ("color", "Red")]],
        );

        engine.absorb(&a, &mut sink);
        let stats = engine.absorb(&b, &mut sink);

        assert_eq!(stats.matched, 1);
        assert_eq!(engine.rows().len(), 1);
        assert_eq!(engine.rows()[0].get("ssn"), Some("123"));
        assert_eq!(engine.rows()[0].get("color"), Some("Red"));
    }

    #[test]
    fn test_empty_key_values_never_match() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let a = source("a", &[("ssn", "")], &[], &[&[("ssn", "")]]);
        let b = source("b", &[("ssn", "")], &[("name", "")], &[&[("ssn", ""), ("name", "Joe")]]);

        engine.absorb(&a, &mut sink);
        let stats = engine.absorb(&b, &mut sink);

        assert_eq!(stats.matched, 0);
        assert_eq!(engine.rows().len(), 2);
    }

    #[test]
    fn test_rows_from_same_source_never_match() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let dupes = source(
            "dupes",
            &[("id", "")],
            &[("v", "")],
            &[&[("id", "1"), ("v", "")], &[("id", "1"), ("v", "later")]],
        );

        let stats = engine.absorb(&dupes, &mut sink);
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.matched, 0);
        assert_eq!(engine.rows()[0].get("v"), Some(""));
    }

    #[test]
    fn test_one_row_fills_every_match() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let base = source(
            "base",
            &[],
            &[("id", ""), ("city", "")],
            &[&[("id", "1")], &[("id", "1")], &[("id", "2")]],
        );
        let extra = source("extra", &[("id", "")], &[("city", "")], &[&[("id", "1"), ("city", "Oslo")]]);

        engine.absorb(&base, &mut sink);
        let stats = engine.absorb(&extra, &mut sink);

        assert_eq!(stats.matched, 1);
        assert_eq!(stats.rows_filled, 2);
        let rows = engine.rows();
        assert_eq!(rows[0].get("city"), Some("Oslo"));
        assert_eq!(rows[1].get("city"), Some("Oslo"));
        assert_eq!(rows[2].get("city"), None);
    }

    #[test]
    fn test_strict_rejects_unmatched_rows_after_first_source() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, true);
        let mut sink = CollectingSink::new();

        let first = engine.absorb(&powers(), &mut sink);
        assert_eq!(first.appended, 5);
        assert_eq!(first.rejected(), 0);

        let second = engine.absorb(&funcs(), &mut sink);
        assert_eq!(second.appended, 0);
        assert_eq!(second.rejected_by_strict, 2);
        assert_eq!(engine.rows().len(), 5);

        let rejects = sink.for_source("funcs");
        assert_eq!(rejects.len(), 2);
        assert_eq!(rejects[0].reason, RejectReason::StrictNoMatch);
        assert_eq!(rejects[0].original.get("t"), Some("6"));
    }

    #[test]
    fn test_strict_first_source_is_exempt() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, true);
        let mut sink = CollectingSink::new();

        let stats = engine.absorb(&funcs(), &mut sink);
        assert_eq!(stats.appended, 7);
        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_field_rule_rejects_before_matching() {
        let rules = RuleSet::compile(&RuleScope::Field, [("x^2", "^[0-9]?$")]).unwrap();
        let mut engine = MergeEngine::new(&rules, false);
        let mut sink = CollectingSink::new();

        engine.absorb(&powers(), &mut sink);
        sink.flush_source(&powers()).unwrap();
        // Only x^2 values 1, 4 and 9 pass
        assert_eq!(engine.rows().len(), 3);
        assert_eq!(sink.for_source("powers").len(), 2);

        let stats = engine.absorb(&funcs(), &mut sink);
        sink.flush_source(&funcs()).unwrap();

        // Blank and single-digit func2 values pass; "88" does not
        assert_eq!(stats.rejected_by_field_rule, 1);

        let rejects = sink.for_source("funcs");
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].reason, RejectReason::FieldRule);
        assert_eq!(rejects[0].original.get("t"), Some("3"));
        assert_eq!(rejects[0].original.get("func2"), Some("88"));
        assert!(rejects[0].original.get("x").is_none());

        // The rejected t=3 row never touched the matching existing row
        let row3 = engine.rows().iter().find(|r| r.get("x") == Some("3")).unwrap();
        assert!(row3.get("func1").is_none());
        assert_eq!(row3.get(SOURCES_FOUND_IN), Some("powers"));
    }

    #[test]
    fn test_field_rule_ignores_fields_source_does_not_emit() {
        let rules = RuleSet::compile(&RuleScope::Field, [("func1", "^never$")]).unwrap();
        let mut engine = MergeEngine::new(&rules, false);
        let mut sink = CollectingSink::new();

        let stats = engine.absorb(&powers(), &mut sink);
        assert_eq!(stats.appended, 5);
        assert_eq!(stats.rejected(), 0);
    }

    #[test]
    fn test_absorbing_twice_keeps_values_and_sources() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        let keyed = source(
            "keyed",
            &[("x", "")],
            &[("x^2", "")],
            &[&[("x", "1"), ("x^2", "1")], &[("x", "2"), ("x^2", "4")]],
        );
        let mut changed = keyed.clone();
        changed.rows = rows(&[&[("x", "1"), ("x^2", "100")], &[("x", "2"), ("x^2", "")]]);

        engine.absorb(&keyed, &mut sink);
        let before = engine.rows().to_vec();

        let stats = engine.absorb(&changed, &mut sink);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.rows_filled, 0);
        assert_eq!(engine.rows(), before.as_slice());
        assert_eq!(engine.rows()[0].get(SOURCES_FOUND_IN), Some("keyed"));
    }

    #[test]
    fn test_new_rows_are_stamped() {
        let no_rules = RuleSet::new();
        let mut engine = MergeEngine::new(&no_rules, false);
        let mut sink = CollectingSink::new();

        engine.absorb(&powers(), &mut sink);
        assert_eq!(engine.sources_absorbed(), 1);

        let row = &engine.rows()[0];
        assert_eq!(row.get(SOURCES_FOUND_IN), Some("powers"));
        assert_eq!(row.get(SOURCE_RULES_BROKEN), Some(NOT_CHECKED));
    }
}

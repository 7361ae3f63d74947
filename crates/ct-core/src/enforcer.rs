//! Post-merge audit of source rules
//!
//! A row is checked against the rules of every source named in its
//! `Sources found in` list, so this must only run once every source has been
//! absorbed.

use crate::source::SourceDescriptor;
use crate::table::{Row, LIST_SEPARATOR, NO_RULES_BROKEN, SOURCES_FOUND_IN, SOURCE_RULES_BROKEN};
use tracing::debug;

/// Set `Source rules broken` on every row.
///
/// Violations are listed as `source:field`. Rows with none get `"None"`.
/// Returns the number of rows with at least one violation.
pub fn enforce(rows: &mut [Row], sources: &[SourceDescriptor]) -> usize {
    let mut flagged = 0;

    for row in rows.iter_mut() {
        let violations = row_violations(row, sources);

        if violations.is_empty() {
            row.insert(SOURCE_RULES_BROKEN, NO_RULES_BROKEN);
        } else {
            flagged += 1;
            row.insert(SOURCE_RULES_BROKEN, violations.join(LIST_SEPARATOR));
        }
    }

    debug!(rows = rows.len(), flagged, "enforced source rules");
    flagged
}

fn row_violations(row: &Row, sources: &[SourceDescriptor]) -> Vec<String> {
    let found_in = row.value_or_empty(SOURCES_FOUND_IN);

    sources
        .iter()
        // Source names are looked up by substring of the joined list
        .filter(|source| found_in.contains(source.name.as_str()))
        .flat_map(|source| {
            source
                .rules
                .violations(row)
                .map(move |rule| format!("{}:{}", source.name, rule.field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::NameMapping;
    use crate::rules::{RuleScope, RuleSet};

    fn source(name: &str, rules: &[(&str, &str)]) -> SourceDescriptor {
        let compiled = RuleSet::compile(&RuleScope::Source(name.to_string()), rules.iter().copied()).unwrap();
        SourceDescriptor::new(name, NameMapping::new(), Vec::new()).with_rules(compiled)
    }

    fn row(fields: &[(&str, &str)]) -> Row {
        fields.iter().copied().collect()
    }

    #[test]
    fn test_clean_rows_get_none() {
        let sources = vec![source("hr", &[("ssn", "^[0-9]+$")])];
        let mut rows = vec![row(&[(SOURCES_FOUND_IN, "hr"), ("ssn", "123")])];

        assert_eq!(enforce(&mut rows, &sources), 0);
        assert_eq!(rows[0].get(SOURCE_RULES_BROKEN), Some("None"));
    }

    #[test]
    fn test_violations_are_listed_per_source() {
        let sources = vec![
            source("hr", &[("ssn", "^[0-9]+$"), ("name", "\\w")]),
            source("payroll", &[("ssn", "^[0-9]{6}$")]),
        ];
        let mut rows = vec![row(&[(SOURCES_FOUND_IN, "hr, payroll"), ("ssn", "12a")])];

        assert_eq!(enforce(&mut rows, &sources), 1);
        assert_eq!(
            rows[0].get(SOURCE_RULES_BROKEN),
            Some("hr:ssn, hr:name, payroll:ssn")
        );
    }

    #[test]
    fn test_only_contributing_sources_apply() {
        let sources = vec![
            source("hr", &[("ssn", "^[0-9]+$")]),
            source("payroll", &[("ssn", "^never$")]),
        ];
        let mut rows = vec![
            row(&[(SOURCES_FOUND_IN, "hr"), ("ssn", "123")]),
            row(&[(SOURCES_FOUND_IN, "payroll"), ("ssn", "123")]),
        ];

        assert_eq!(enforce(&mut rows, &sources), 1);
        assert_eq!(rows[0].get(SOURCE_RULES_BROKEN), Some("None"));
        assert_eq!(rows[1].get(SOURCE_RULES_BROKEN), Some("payroll:ssn"));
    }

    #[test]
    fn test_source_name_lookup_is_by_substring() {
        let sources = vec![source("hr", &[("ssn", "^never$")])];
        let mut rows = vec![row(&[(SOURCES_FOUND_IN, "hr2"), ("ssn", "1")])];

        enforce(&mut rows, &sources);
        assert_eq!(rows[0].get(SOURCE_RULES_BROKEN), Some("hr:ssn"));
    }

    #[test]
    fn test_sources_without_rules_mark_rows_clean() {
        let sources = vec![source("hr", &[])];
        let mut rows = vec![row(&[(SOURCES_FOUND_IN, "hr")])];

        enforce(&mut rows, &sources);
        assert_eq!(rows[0].get(SOURCE_RULES_BROKEN), Some("None"));
    }
}

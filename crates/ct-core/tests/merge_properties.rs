//! Property tests for the merge engine

use ct_core::{CollectingSink, MergeEngine, NameMapping, Row, RuleSet, SourceDescriptor};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn source(name: &str, records: &BTreeMap<String, (String, String)>) -> SourceDescriptor {
    let mut mapping = NameMapping::new();
    mapping.add_match_by("id", "");
    mapping.add_target("a", "");
    mapping.add_target("b", "");

    let rows = records
        .iter()
        .map(|(id, (a, b))| {
            [("id", id.as_str()), ("a", a.as_str()), ("b", b.as_str())]
                .into_iter()
                .collect::<Row>()
        })
        .collect();
    SourceDescriptor::new(name, mapping, rows)
}

proptest! {
    #[test]
    fn absorbing_a_source_twice_changes_nothing(
        records in prop::collection::btree_map("[0-9]{1,4}", ("[a-z]{0,3}", "[a-z]{0,3}"), 0..20)
    ) {
        let rules = RuleSet::new();
        let mut engine = MergeEngine::new(&rules, false);
        let mut sink = CollectingSink::new();
        let src = source("hr", &records);

        engine.absorb(&src, &mut sink);
        let once = engine.rows().to_vec();

        let stats = engine.absorb(&src, &mut sink);
        prop_assert_eq!(engine.rows(), once.as_slice());
        prop_assert_eq!(stats.appended, 0);
        prop_assert_eq!(stats.rows_filled, 0);
        prop_assert_eq!(stats.matched, records.len());
    }

    #[test]
    fn sources_found_in_never_repeats(names in prop::collection::vec("[a-z]{1,3}", 0..12)) {
        let mut row = Row::new();
        let mut expected: Vec<&str> = Vec::new();

        for name in &names {
            let added = row.add_source(name);
            prop_assert_eq!(added, !expected.contains(&name.as_str()));
            if added {
                expected.push(name);
            }
        }

        prop_assert_eq!(row.sources(), expected);
    }
}

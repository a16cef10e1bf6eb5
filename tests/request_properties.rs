//! Property tests over generated aggregation requests

use std::collections::BTreeSet;
use std::sync::Arc;

use dio_aggregator::lookup::build_table;
use dio_aggregator::{parse_request, AggregatorRegistry};
use dio_driver_mock::{MockChipConfig, MockLineProvider};
use proptest::prelude::*;

const CHIPS: [&str; 3] = ["gpio0", "gpio1", "gpio2"];

/// One chip group: a label and a set of distinct offsets, rendered as a
/// mix of single values and ranges.
fn group() -> impl Strategy<Value = (usize, BTreeSet<u32>)> {
    (0..CHIPS.len(), prop::collection::btree_set(0u32..32, 1..8))
}

fn render(groups: &[(usize, BTreeSet<u32>)]) -> (String, usize) {
    let mut text = Vec::new();
    let mut count = 0;
    for (chip, offsets) in groups {
        let mut items = Vec::new();
        let mut iter = offsets.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if start == end {
                items.push(start.to_string());
            } else {
                items.push(format!("{}-{}", start, end));
            }
        }
        text.push(format!("{} {}", CHIPS[*chip], items.join(",")));
        count += offsets.len();
    }
    (text.join(" "), count)
}

proptest! {
    #[test]
    fn positions_are_dense(groups in prop::collection::vec(group(), 1..6)) {
        let (request, count) = render(&groups);
        let selectors = parse_request(&request).unwrap();
        prop_assert_eq!(selectors.len(), count);

        // Groups may repeat a chip; only tables without duplicates are built.
        if let Ok(table) = build_table("x.0", &selectors) {
            let positions: Vec<u32> = table.entries().iter().map(|e| e.position).collect();
            prop_assert_eq!(positions, (0..count as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn create_then_destroy_is_neutral(groups in prop::collection::vec(group(), 1..4)) {
        let provider = Arc::new(
            MockLineProvider::from_configs(CHIPS.map(|c| MockChipConfig::new(c, 32))).unwrap(),
        );
        let registry = AggregatorRegistry::new(provider.clone());
        registry.create("gpio0 31").ok();
        let before = registry.ids();
        let claimed = provider.claimed();

        let (request, _) = render(&groups);
        if let Ok(id) = registry.create(&request) {
            registry.destroy(id).unwrap();
        }
        prop_assert_eq!(registry.ids(), before);
        prop_assert_eq!(provider.claimed(), claimed);
    }

    #[test]
    fn parser_never_panics(input in "\\PC{0,64}") {
        if let Ok(selectors) = parse_request(&input) {
            prop_assert!(!selectors.is_empty());
            prop_assert!(selectors.len() <= dio_aggregator::MAX_LINES);
        }
    }
}

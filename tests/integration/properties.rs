//! Property tests for attribute ordering and cycle detection.

use catalog_calc::models::{Attribute, AttributeType};
use catalog_calc::resolver::{AttributeGraph, extract_dependencies, topological_sort};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn name(index: usize) -> String {
    format!("attr{index}")
}

fn with_formula(index: usize, deps: &[usize]) -> Attribute {
    let mut attribute = Attribute::new(index as i64, name(index), AttributeType::Integer);
    if !deps.is_empty() {
        let formula: Vec<String> = deps.iter().map(|&d| name(d)).collect();
        attribute.calculated_value = Some(formula.join(" + "));
    }
    attribute
}

/// Attributes whose formulas only reference attributes with a lower index,
/// in random order.
fn acyclic_attributes() -> impl Strategy<Value = Vec<Attribute>> {
    (1usize..12)
        .prop_flat_map(|len| {
            (0..len)
                .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
                .collect::<Vec<_>>()
        })
        .prop_map(|deps| deps.iter().enumerate().map(|(i, d)| with_formula(i, d)).collect::<Vec<_>>())
        .prop_shuffle()
}

proptest! {
    #[test]
    fn sorted_order_respects_dependencies(attributes in acyclic_attributes()) {
        let sorted = topological_sort(&attributes).unwrap();
        prop_assert_eq!(sorted.len(), attributes.len());

        let mut seen = BTreeSet::new();
        for attribute in &sorted {
            for dependency in attribute.formula().map(extract_dependencies).unwrap_or_default() {
                prop_assert!(seen.contains(&dependency), "{} before {}", dependency, attribute.name);
            }
            seen.insert(attribute.name.clone());
        }
    }

    #[test]
    fn sorting_is_idempotent(attributes in acyclic_attributes()) {
        let once = topological_sort(&attributes).unwrap();
        let twice = topological_sort(&once).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn every_ring_member_is_reported(ring in 2usize..8, tail in 0usize..5) {
        // attr0 -> attr1 -> ... -> attr{ring-1} -> attr0, plus a chain hanging off the ring.
        let mut attributes: Vec<Attribute> = (0..ring).map(|i| with_formula(i, &[(i + 1) % ring])).collect();
        for offset in 0..tail {
            let index = ring + offset;
            attributes.push(with_formula(index, &[index - 1]));
        }

        let err = topological_sort(&attributes).unwrap_err();
        let expected: BTreeSet<String> = (0..ring).map(name).collect();
        prop_assert_eq!(&err.fields, &expected);

        let graph = AttributeGraph::build(&attributes);
        prop_assert_eq!(graph.cycle_members(), expected);
    }
}

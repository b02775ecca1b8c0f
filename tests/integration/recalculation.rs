//! Recalculation of items with child components and reference catalogs.

use catalog_calc::engine::{CatalogEngine, ChangeEvent, ProgressBar, RecalcFilter};
use catalog_calc::models::{Attribute, AttributeType, Category, Item, Variant};
use catalog_calc::providers::CatalogRepository;
use catalog_calc::snapshot::CatalogSnapshot;
use catalog_calc::test_utils::fixtures::{AttributeFixture, attribute, calculated, detail_type};
use catalog_calc::test_utils::init_test_logging;
use serde_json::{Value, json};
use std::collections::BTreeSet;

use crate::common::{HANGER_MARKING, snapshot};

#[test]
fn test_bulk_recalculation_of_nested_items() {
    init_test_logging(None);
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();

    let summary = engine.recalculate_all(&mut snapshot, &RecalcFilter::default(), &ProgressBar::hidden()).unwrap();
    assert_eq!(summary.recalculated, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.parameter_errors, 0);

    let hanger = snapshot.item(1000).unwrap();
    assert_eq!(
        Value::Object(hanger.parameters.clone()),
        json!({"a": 2, "d": 4, "E": 9, "L": 300, "lg": 3})
    );
    assert_eq!(hanger.marking.as_deref(), Some(HANGER_MARKING));
    assert_eq!(hanger.name.as_deref(), Some(HANGER_MARKING));
    assert_eq!(hanger.weight, Some(9.0));
    assert_eq!(hanger.inner_id, Some(100_000));
    assert_eq!(hanger.comment.as_deref(), Some("Spring hanger"));

    assert_eq!(snapshot.item(2000).unwrap().marking.as_deref(), Some("HDH-12 2"));
    assert_eq!(snapshot.item(3000).unwrap().marking.as_deref(), Some("ZZF 150"));
}

#[test]
fn test_recalculation_is_repeatable() {
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();
    engine.recalculate_all(&mut snapshot, &RecalcFilter::default(), &ProgressBar::hidden()).unwrap();
    let first = snapshot.item(1000).cloned().unwrap();

    let mut again = first.clone();
    engine.recalculate_item(&snapshot, &mut again).unwrap();
    assert_eq!(again, first);
}

#[test]
fn test_child_change_marks_parent_stale() {
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();
    engine.recalculate_all(&mut snapshot, &RecalcFilter::default(), &ProgressBar::hidden()).unwrap();

    let rod = snapshot.item_mut(3000).unwrap();
    rod.parameters.insert("len".into(), json!(200));
    let mut rod = rod.clone();
    engine.recalculate_item(&snapshot, &mut rod).unwrap();
    snapshot.add_item(rod);

    let stale = engine.apply_change(&snapshot, &ChangeEvent::ItemSaved(3000));
    assert_eq!(stale, BTreeSet::from([1000]));

    let mut hanger = snapshot.item(1000).cloned().unwrap();
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert_eq!(hanger.parameters["L"], json!(400));
    assert_eq!(hanger.marking.as_deref(), Some("FHD 4-4/400 LG13"));
}

#[test]
fn test_new_attribute_is_seen_after_change_event() {
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();
    let mut hanger = snapshot.item(1000).cloned().unwrap();
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();

    let mut extra = calculated(50, "F", "E + 1").variant(10);
    extra.position = 9;
    snapshot.add_attribute(extra);

    // The cached attribute list still hides F.
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert!(!hanger.parameters.contains_key("F"));

    let stale = engine.apply_change(&snapshot, &ChangeEvent::AttributeSaved {
        detail_type_id: None,
        variant_id: Some(10),
    });
    assert!(stale.contains(&1000));
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert_eq!(hanger.parameters["F"], json!(10));
}

#[test]
fn test_catalog_entry_change() {
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();
    let mut hanger = snapshot.item(1000).cloned().unwrap();
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert_eq!(hanger.marking.as_deref(), Some(HANGER_MARKING));

    let load_group = "LoadGroup".parse().unwrap();
    let record = json!({"lgv": 16}).as_object().cloned().unwrap();
    snapshot.add_catalog_entry(load_group, 3, record);

    let load_group = "LoadGroup".parse().unwrap();
    let stale = engine.apply_change(&snapshot, &ChangeEvent::CatalogEntrySaved {
        catalog: load_group,
        id: 3,
    });
    assert_eq!(stale, BTreeSet::from([1000]));

    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert_eq!(hanger.marking.as_deref(), Some("FHD 4-4/300 LG16"));
}

#[test]
fn test_missing_catalog_entry_is_recorded() {
    let snapshot = snapshot();
    let engine = CatalogEngine::default();
    let mut hanger = snapshot.item(1000).cloned().unwrap();
    hanger.parameters.insert("lg".into(), json!(99));

    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    let errors = hanger.parameters_errors.unwrap();
    assert!(errors.contains_key("lg"));
    assert_eq!(hanger.parameters["lg"], Value::Null);
    assert_eq!(hanger.parameters["E"], json!(9));
    assert_eq!(hanger.marking.as_deref(), Some("ERROR"));
    assert!(hanger.marking_errors.is_some());
}

#[test]
fn test_child_with_missing_catalog_entry_only_fails_its_readers() {
    let mut snapshot = snapshot();
    let mut material = attribute(20, "mat", AttributeType::Catalog).variant(30);
    material.catalog = Some("LoadGroup".parse().unwrap());
    snapshot.add_attribute(material);
    snapshot.add_attribute(calculated(21, "M", "<detail_ZZF>.mat.lgv").detail_type(1));
    snapshot.item_mut(3000).unwrap().parameters.insert("mat".into(), json!(77));

    let engine = CatalogEngine::default();
    let mut hanger = snapshot.item(1000).cloned().unwrap();
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();

    assert_eq!(hanger.parameters["L"], json!(300));
    assert_eq!(hanger.parameters["E"], json!(9));
    assert_eq!(hanger.weight, Some(9.0));
    assert_eq!(hanger.marking.as_deref(), Some(HANGER_MARKING));

    let errors = hanger.parameters_errors.unwrap();
    assert_eq!(errors.keys().collect::<Vec<_>>(), ["M"]);
    assert!(errors["M"].contains("missing entry 77"));
    assert_eq!(hanger.parameters["M"], Value::Null);
}

/// Cyclic formulas leave the rest of the item intact.
#[test]
fn test_cycle_members_fail_alone() {
    let mut snapshot = CatalogSnapshot::default();
    snapshot.add_detail_type(detail_type(1, Category::Detail, "HDH"));
    let mut variant = Variant::new(1, 1, "HDH-1");
    variant.marking_template = "HDH {{ x }}".into();
    snapshot.add_variant(variant);
    snapshot.add_attribute(calculated(1, "a", "b + 1").variant(1).at(1));
    snapshot.add_attribute(calculated(2, "b", "c + 1").variant(1).at(2));
    snapshot.add_attribute(calculated(3, "c", "a + 1").variant(1).at(3));
    snapshot.add_attribute(attribute(4, "x", AttributeType::Integer).variant(1).at(4));

    let mut item = Item::new(1, 1, Some(1));
    item.parameters = json!({"x": 999}).as_object().cloned().unwrap();
    let engine = CatalogEngine::default();
    assert!(engine.sorted_attributes(&snapshot, 1).is_err());
    engine.recalculate_item(&snapshot, &mut item).unwrap();

    assert_eq!(Value::Object(item.parameters.clone()), json!({"a": null, "b": null, "c": null, "x": 999}));
    let failed: Vec<&String> = item.parameters_errors.as_ref().unwrap().keys().collect();
    assert_eq!(failed, ["a", "b", "c"]);
    assert_eq!(item.marking.as_deref(), Some("HDH 999"));
}

/// Selection supplies Fcold; until then the attribute waits.
#[test]
fn test_deferred_attribute_resolves_at_selection() {
    let mut snapshot = CatalogSnapshot::default();
    snapshot.add_detail_type(detail_type(1, Category::AssemblyUnit, "SSB"));
    let mut variant = Variant::new(1, 1, "SSB-1");
    variant.marking_template = "SSB {{ F }}".into();
    snapshot.add_variant(variant);
    let mut rate = Attribute::new(1, "r", AttributeType::Integer);
    rate.variant_id = Some(1);
    snapshot.add_attribute(rate);
    snapshot.add_attribute(calculated(2, "F", "Fcold * r").variant(1).at(1));

    let mut item = Item::new(1, 1, Some(1));
    item.parameters = json!({"r": 3}).as_object().cloned().unwrap();
    let engine = CatalogEngine::default();

    engine.recalculate_item(&snapshot, &mut item).unwrap();
    assert_eq!(item.parameters["F"], Value::Null);
    assert!(item.parameters_errors.as_ref().unwrap()["F"].contains("Fcold"));

    let selection = json!({"Fcold": 5}).as_object().cloned().unwrap();
    engine.recalculate_item_with(&snapshot, &mut item, selection).unwrap();
    assert_eq!(item.parameters["F"], json!(15));
    assert_eq!(item.parameters_errors, None);
    assert_eq!(item.marking.as_deref(), Some("SSB 15"));
}

//! Composition rules on a loaded snapshot.

use catalog_calc::composition::{children_first_order, validate_base_composition, validate_item_child};
use catalog_calc::core::CatalogError;
use catalog_calc::engine::{CatalogEngine, ChangeEvent};
use catalog_calc::models::{BaseComposition, ItemChild};
use catalog_calc::providers::CatalogRepository;
use serde_json::json;

use crate::common::snapshot;

#[test]
fn test_moving_a_slot_rewrites_parent_formulas() {
    let mut snapshot = snapshot();
    let engine = CatalogEngine::default();

    let rewritten = snapshot.move_composition_slot(2, 3).unwrap();
    assert_eq!(rewritten, vec![4]);
    let formula = snapshot.attributes().iter().find(|a| a.id == 4).and_then(|a| a.formula());
    assert_eq!(formula, Some("<detail_ZZF>.3.len * 2"));

    // The rod still sits in slot 2 of the item, so L cannot be computed.
    let mut hanger = snapshot.item(1000).cloned().unwrap();
    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert!(hanger.parameters_errors.as_ref().unwrap().contains_key("L"));

    snapshot.add_item_child(ItemChild {
        id: 2,
        parent_id: 1000,
        child_id: 3000,
        position: 3,
        count: 1,
    });
    engine.apply_change(&snapshot, &ChangeEvent::ItemChildSaved {
        parent_id: 1000,
    });
    engine.apply_change(&snapshot, &ChangeEvent::AttributeSaved {
        detail_type_id: Some(1),
        variant_id: None,
    });

    engine.recalculate_item(&snapshot, &mut hanger).unwrap();
    assert_eq!(hanger.parameters_errors, None);
    assert_eq!(hanger.parameters["L"], json!(300));
}

#[test]
fn test_composition_rules_stay_acyclic() {
    let snapshot = snapshot();
    let reverse = BaseComposition {
        id: 3,
        base_parent: 3,
        base_parent_variant: None,
        base_child: 1,
        base_child_variant: None,
        position: 1,
        count: 1,
    };
    assert!(matches!(
        validate_base_composition(&snapshot, &reverse),
        Err(CatalogError::InvalidComposition { .. })
    ));

    let loop_back = ItemChild {
        id: 3,
        parent_id: 3000,
        child_id: 1000,
        position: 1,
        count: 1,
    };
    assert!(validate_item_child(&snapshot, &loop_back).is_err());

    let order = children_first_order(&snapshot).unwrap();
    let position = |id| order.iter().position(|&x| x == id).unwrap();
    assert!(position(2000) < position(1000));
    assert!(position(3000) < position(1000));
}

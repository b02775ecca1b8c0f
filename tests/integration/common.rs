//! Shared snapshot used across the integration suite.

use catalog_calc::snapshot::{CatalogSnapshot, SnapshotFormat};
use std::path::{Path, PathBuf};

/// Hanger FHD (item 1000) containing two HDH-12 hooks in slot 1 (item 2000)
/// and a ZZF rod in slot 2 (item 3000).
pub const SNAPSHOT_YAML: &str = r#"
detail_types:
  - { id: 1, name: Hanger, designation: FHD, category: product, default_comment: "Spring hanger" }
  - { id: 2, name: Hook, designation: HDH-12, category: detail }
  - { id: 3, name: Rod, designation: ZZF, category: detail }
variants:
  - id: 10
    detail_type_id: 1
    name: FHD-1
    marking_template: "FHD {{ d }}-{{ <detail_HDH-12>.e }}/{{ L }} LG{{ lg.lgv }}"
    formula_weight: "<detail_HDH-12>.m + <detail_ZZF>.m"
  - { id: 20, detail_type_id: 2, name: HDH-12-1, marking_template: "HDH-12 {{ e }}" }
  - { id: 30, detail_type_id: 3, name: ZZF-1, marking_template: "ZZF {{ len }}" }
attributes:
  - { id: 1, detail_type_id: 1, name: a, type: integer, position: 1 }
  - { id: 2, detail_type_id: 1, name: d, type: integer, position: 2, calculated_value: "a * 2" }
  - { id: 3, detail_type_id: 1, name: E, type: integer, position: 3, calculated_value: "d + 5" }
  - { id: 4, detail_type_id: 1, name: L, type: integer, position: 4, calculated_value: "<detail_ZZF>.2.len * 2" }
  - { id: 5, detail_type_id: 1, name: lg, type: catalog, position: 5, catalog: LoadGroup }
  - { id: 6, variant_id: 20, name: e, type: integer, position: 1 }
  - { id: 7, variant_id: 20, name: m, type: integer, position: 2 }
  - { id: 8, variant_id: 30, name: len, type: integer, position: 1 }
  - { id: 9, variant_id: 30, name: m, type: integer, position: 2 }
base_compositions:
  - { id: 1, base_parent: 1, base_child: 2, position: 1, count: 2 }
  - { id: 2, base_parent: 1, base_child: 3, position: 2, count: 1 }
items:
  - { id: 1000, detail_type_id: 1, variant_id: 10, parameters: { a: 2, lg: 3 } }
  - { id: 2000, detail_type_id: 2, variant_id: 20, parameters: { e: 2, m: 4 } }
  - { id: 3000, detail_type_id: 3, variant_id: 30, parameters: { len: 150, m: 1 } }
item_children:
  - { id: 1, parent_id: 1000, child_id: 2000, position: 1, count: 2 }
  - { id: 2, parent_id: 1000, child_id: 3000, position: 2, count: 1 }
catalogs:
  LoadGroup:
    - { id: 3, lgv: 13, kn: 14 }
"#;

/// Marking of item 1000 after recalculation.
pub const HANGER_MARKING: &str = "FHD 4-4/300 LG13";

pub fn snapshot() -> CatalogSnapshot {
    CatalogSnapshot::parse(SNAPSHOT_YAML, SnapshotFormat::Yaml, "catalog.yaml").unwrap()
}

/// Write the shared snapshot to `dir/name`.
pub fn write_snapshot(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, SNAPSHOT_YAML).unwrap();
    path
}

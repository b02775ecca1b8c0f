//! Read-only ports the engine uses to reach stored catalog data.
//!
//! The engine never talks to a database directly. Everything it needs is
//! expressed through two synchronous traits:
//!
//! - [`CatalogProvider`]: reference catalogs (built-in tables and dynamic
//!   directories) that `catalog` attributes point into
//! - [`CatalogRepository`]: detail types, variants, attributes, items and item
//!   composition
//!
//! [`crate::snapshot::CatalogSnapshot`] implements both for file-backed data.

use serde_json::{Map, Value};

use crate::models::{
    Attribute, BaseComposition, CatalogRef, DetailType, Item, ItemChild, Variant, merge_attributes,
};

/// A catalog entry as exposed to templates: its fields by name.
pub type CatalogRecord = Map<String, Value>;

/// Access to reference catalogs.
pub trait CatalogProvider {
    /// Whether the catalog is known.
    fn catalog_exists(&self, catalog: &CatalogRef) -> bool;

    /// Fetch one entry by id.
    fn lookup(&self, catalog: &CatalogRef, id: i64) -> Option<CatalogRecord>;
}

/// Access to the catalog structure and its items.
pub trait CatalogRepository: CatalogProvider {
    fn detail_type(&self, id: i64) -> Option<&DetailType>;

    fn variant(&self, id: i64) -> Option<&Variant>;

    fn item(&self, id: i64) -> Option<&Item>;

    /// Ids of every stored item.
    fn item_ids(&self) -> Vec<i64>;

    /// Attributes owned by the detail type itself.
    fn detail_type_attributes(&self, detail_type_id: i64) -> Vec<Attribute>;

    /// Attributes owned by the variant itself.
    fn variant_attributes(&self, variant_id: i64) -> Vec<Attribute>;

    /// Variants of a detail type.
    fn variants_of(&self, detail_type_id: i64) -> Vec<i64>;

    /// Child edges of an item, ordered by position.
    fn children_of(&self, item_id: i64) -> Vec<ItemChild>;

    /// Items that contain `item_id` directly.
    fn parents_of(&self, item_id: i64) -> Vec<i64>;

    fn items_using_variant(&self, variant_id: i64) -> Vec<i64>;

    fn items_using_detail_type(&self, detail_type_id: i64) -> Vec<i64>;

    fn base_compositions(&self) -> Vec<BaseComposition>;

    /// Attributes visible to a variant after the override rule.
    fn merged_attributes(&self, variant_id: i64) -> Vec<Attribute> {
        let Some(variant) = self.variant(variant_id) else {
            return Vec::new();
        };
        merge_attributes(
            &self.detail_type_attributes(variant.detail_type_id),
            &self.variant_attributes(variant_id),
        )
    }
}

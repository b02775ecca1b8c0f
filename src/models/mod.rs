//! Domain model of the parametric catalog.
//!
//! - [`Attribute`] / [`AttributeType`]: typed, optionally calculated parameters
//! - [`DetailType`], [`Variant`]: what can be built
//! - [`Item`], [`ItemChild`]: what was built, and how items nest
//! - [`BaseComposition`]: type-level composition rules
//!
//! All types are plain serde structs so they can be loaded from snapshots.

pub mod attribute;
pub mod catalog;

pub use attribute::{Attribute, AttributeChoice, AttributeType, BuiltinCatalog, CatalogRef, round_half_up};
pub use catalog::{
    BaseComposition, Category, DerivedQuantity, DetailType, Item, ItemChild, Variant, merge_attributes,
};

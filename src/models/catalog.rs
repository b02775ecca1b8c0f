//! Detail types, variants, items and the composition edges between them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::attribute::Attribute;

/// Top-level classification of a detail type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Detail,
    AssemblyUnit,
    Product,
    Billet,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::AssemblyUnit => "assembly_unit",
            Self::Product => "product",
            Self::Billet => "billet",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Detail, Self::AssemblyUnit, Self::Product, Self::Billet]
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}', expected detail, assembly_unit, product or billet"))
    }
}

/// Kind of component (detail, assembly unit, product or billet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailType {
    pub id: i64,
    pub name: String,
    /// Short code used in bracket references, e.g. `HDH` or `FSS 1-11`
    pub designation: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_comment: Option<String>,
}

impl DetailType {
    /// Raw reference key `{category}_{designation}` as written inside `<...>`.
    #[must_use]
    pub fn reference_key(&self) -> String {
        format!("{}_{}", self.category, self.designation)
    }
}

/// Quantities derived from variant formulas after the parameters are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedQuantity {
    Weight,
    Height,
    ChainWeight,
    SpringBlockLength,
}

impl DerivedQuantity {
    pub const ALL: [Self; 4] = [Self::Weight, Self::Height, Self::ChainWeight, Self::SpringBlockLength];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Height => "height",
            Self::ChainWeight => "chain_weight",
            Self::SpringBlockLength => "spring_block_length",
        }
    }

    /// Whether an absent formula leaves the stored value untouched.
    ///
    /// Weight and height may be entered by hand; chain weight and spring block
    /// length only exist when the variant defines a formula.
    #[must_use]
    pub const fn keeps_value_without_formula(self) -> bool {
        matches!(self, Self::Weight | Self::Height)
    }
}

/// Concrete execution of a detail type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: i64,
    pub detail_type_id: i64,
    pub name: String,
    #[serde(default)]
    pub marking_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_chain_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_spring_block: Option<String>,
}

impl Variant {
    #[must_use]
    pub fn new(id: i64, detail_type_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            detail_type_id,
            name: name.into(),
            marking_template: String::new(),
            series: None,
            formula_weight: None,
            formula_height: None,
            formula_chain_weight: None,
            formula_spring_block: None,
        }
    }

    /// Formula for a derived quantity, ignoring blank text.
    #[must_use]
    pub fn formula(&self, quantity: DerivedQuantity) -> Option<&str> {
        let formula = match quantity {
            DerivedQuantity::Weight => &self.formula_weight,
            DerivedQuantity::Height => &self.formula_height,
            DerivedQuantity::ChainWeight => &self.formula_chain_weight,
            DerivedQuantity::SpringBlockLength => &self.formula_spring_block,
        };
        formula.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

fn default_count() -> u32 {
    1
}

fn default_position() -> u32 {
    1
}

/// Type-level composition rule: `base_parent` contains `base_child`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseComposition {
    pub id: i64,
    pub base_parent: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_parent_variant: Option<i64>,
    pub base_child: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_child_variant: Option<i64>,
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// Instance-level composition edge between two items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChild {
    pub id: i64,
    pub parent_id: i64,
    pub child_id: i64,
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// Concrete catalog item with its computed outputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub detail_type_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_id: Option<i64>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_errors: Option<BTreeMap<String, String>>,
    /// Parameter names whose values are frozen
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub locked_parameters: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marking_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub name_manual_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_weight_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring_block_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring_block_length_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Item {
    #[must_use]
    pub fn new(id: i64, detail_type_id: i64, variant_id: Option<i64>) -> Self {
        Self {
            id,
            detail_type_id,
            variant_id,
            ..Self::default()
        }
    }

    /// Current value of a derived quantity.
    #[must_use]
    pub const fn derived(&self, quantity: DerivedQuantity) -> Option<f64> {
        match quantity {
            DerivedQuantity::Weight => self.weight,
            DerivedQuantity::Height => self.height,
            DerivedQuantity::ChainWeight => self.chain_weight,
            DerivedQuantity::SpringBlockLength => self.spring_block_length,
        }
    }

    /// Store a derived quantity together with its errors.
    pub fn set_derived(
        &mut self,
        quantity: DerivedQuantity,
        value: Option<f64>,
        errors: Option<Vec<String>>,
    ) {
        let (slot, error_slot) = match quantity {
            DerivedQuantity::Weight => (&mut self.weight, &mut self.weight_errors),
            DerivedQuantity::Height => (&mut self.height, &mut self.height_errors),
            DerivedQuantity::ChainWeight => (&mut self.chain_weight, &mut self.chain_weight_errors),
            DerivedQuantity::SpringBlockLength => {
                (&mut self.spring_block_length, &mut self.spring_block_length_errors)
            }
        };
        *slot = value;
        *error_slot = errors;
    }
}

/// Attributes visible to a variant.
///
/// Type-level attributes come first; a variant attribute with the same name
/// replaces the inherited one entirely. The result is ordered by `position`,
/// keeping the merge order for equal positions.
#[must_use]
pub fn merge_attributes(type_attributes: &[Attribute], variant_attributes: &[Attribute]) -> Vec<Attribute> {
    let mut merged: Vec<Attribute> = Vec::with_capacity(type_attributes.len() + variant_attributes.len());

    for attribute in type_attributes.iter().chain(variant_attributes) {
        if let Some(existing) = merged.iter_mut().find(|a| a.name == attribute.name) {
            *existing = attribute.clone();
        } else {
            merged.push(attribute.clone());
        }
    }

    merged.sort_by_key(|a| a.position);
    merged
}

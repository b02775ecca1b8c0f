//! Builders for catalog structures used across tests.

use crate::models::{Attribute, AttributeType, Category, DetailType};

/// Detail type named after its designation.
#[must_use]
pub fn detail_type(id: i64, category: Category, designation: &str) -> DetailType {
    DetailType {
        id,
        name: designation.to_string(),
        designation: designation.to_string(),
        category,
        default_comment: None,
    }
}

/// Plain attribute without an owner.
#[must_use]
pub fn attribute(id: i64, name: &str, attr_type: AttributeType) -> Attribute {
    Attribute::new(id, name, attr_type)
}

/// Integer attribute calculated from `formula`.
#[must_use]
pub fn calculated(id: i64, name: &str, formula: &str) -> Attribute {
    let mut attribute = Attribute::new(id, name, AttributeType::Integer);
    attribute.calculated_value = Some(formula.to_string());
    attribute
}

/// Owner and position setters for attributes.
pub trait AttributeFixture {
    /// Owned by a variant.
    #[must_use]
    fn variant(self, variant_id: i64) -> Self;

    /// Owned by a detail type.
    #[must_use]
    fn detail_type(self, detail_type_id: i64) -> Self;

    #[must_use]
    fn at(self, position: i32) -> Self;
}

impl AttributeFixture for Attribute {
    fn variant(mut self, variant_id: i64) -> Self {
        self.variant_id = Some(variant_id);
        self.detail_type_id = None;
        self
    }

    fn detail_type(mut self, detail_type_id: i64) -> Self {
        self.detail_type_id = Some(detail_type_id);
        self.variant_id = None;
        self
    }

    fn at(mut self, position: i32) -> Self {
        self.position = position;
        self
    }
}

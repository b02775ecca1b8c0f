//! Template context assembly.
//!
//! A marking or formula is rendered against one flat JSON object:
//!
//! | Key | Value |
//! |---|---|
//! | `inner_id`, `weight` | the item's own identity and weight |
//! | attribute name | parameter value, catalog ids replaced by the catalog record |
//! | child alias | attribute bag of the child component (see below) |
//! | extra keys | caller supplied values, applied last |
//!
//! Each child is bound under `normalize_designation("{category}_{designation}")`.
//! Its bag holds `inner_id` and the child's attribute-backed parameters, with
//! numeric values multiplied by the composition `count`. When several children
//! share an alias the bare alias addresses the lowest position, and every
//! child is also reachable as `alias.{position}`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::TemplateError;
use super::normalize::normalize_designation;
use crate::models::{Attribute, AttributeType, Category};
use crate::providers::CatalogProvider;

/// A child item as seen from its parent's templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildComponent {
    pub category: Category,
    pub designation: String,
    /// Slot of the child in the parent's composition
    pub position: u32,
    /// Quantity of the child in the parent
    pub count: u32,
    pub inner_id: Option<i64>,
    pub parameters: Map<String, Value>,
    /// Attributes visible to the child's variant
    pub attributes: Vec<Attribute>,
}

impl ChildComponent {
    /// Context key under which this child is bound.
    #[must_use]
    pub fn alias(&self) -> String {
        normalize_designation(&format!("{}_{}", self.category, self.designation))
    }
}

/// Catalog values that could not be bound, by dotted context path.
///
/// The value is left out of the context, so only templates that read it fail.
pub type UnresolvedEntries = BTreeMap<String, TemplateError>;

/// The unresolved entry a missing `variable` stands for, if any.
#[must_use]
pub fn unresolved_for<'e>(unresolved: &'e UnresolvedEntries, variable: &str) -> Option<&'e TemplateError> {
    unresolved
        .iter()
        .find(|(path, _)| {
            variable.strip_prefix(path.as_str()).is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
        .map(|(_, error)| error)
}

/// Builds template contexts, resolving catalog ids through a provider.
pub struct ContextBuilder<'a> {
    catalogs: &'a dyn CatalogProvider,
}

impl<'a> ContextBuilder<'a> {
    #[must_use]
    pub fn new(catalogs: &'a dyn CatalogProvider) -> Self {
        Self {
            catalogs,
        }
    }

    /// Attribute-backed parameters with catalog ids replaced by records.
    ///
    /// Parameters without a matching attribute are left out. So is a catalog
    /// id without a record; it is reported in `unresolved` under its name.
    pub fn resolve_parameters(
        &self,
        parameters: &Map<String, Value>,
        attributes: &[Attribute],
        unresolved: &mut UnresolvedEntries,
    ) -> Map<String, Value> {
        let by_name: BTreeMap<&str, &Attribute> =
            attributes.iter().map(|a| (a.name.as_str(), a)).collect();

        let mut resolved = Map::new();
        for (key, value) in parameters {
            let Some(attribute) = by_name.get(key.as_str()) else {
                continue;
            };
            match (&attribute.catalog, attribute.attr_type) {
                (Some(catalog), AttributeType::Catalog) if !value.is_null() => {
                    match catalog_id(value).and_then(|id| self.catalogs.lookup(catalog, id)) {
                        Some(record) => {
                            resolved.insert(key.clone(), Value::Object(record));
                        }
                        None => {
                            unresolved.insert(key.clone(), TemplateError::CatalogEntryMissing {
                                attribute: key.clone(),
                                catalog: catalog.to_string(),
                                id: crate::models::attribute::plain_text(value),
                            });
                        }
                    }
                }
                _ => {
                    resolved.insert(key.clone(), value.clone());
                }
            }
        }
        resolved
    }

    /// Attribute bag of one child, numeric values multiplied by its count.
    ///
    /// Unbound catalog values are reported under their field name.
    pub fn child_bag(&self, child: &ChildComponent, unresolved: &mut UnresolvedEntries) -> Map<String, Value> {
        let mut bag = Map::new();
        bag.insert("inner_id".to_string(), child.inner_id.map_or(Value::Null, Value::from));

        for (key, value) in self.resolve_parameters(&child.parameters, &child.attributes, unresolved) {
            bag.insert(key, multiply(value, child.count));
        }
        bag
    }

    /// Bind every child under its alias.
    ///
    /// Unbound catalog values are reported as `alias.field` for the child
    /// the bare alias addresses and as `alias.{position}.field` for every child.
    pub fn bind_children(
        &self,
        context: &mut Map<String, Value>,
        children: &[ChildComponent],
        unresolved: &mut UnresolvedEntries,
    ) {
        let mut ordered: Vec<&ChildComponent> = children.iter().collect();
        ordered.sort_by_key(|c| c.position);

        let mut groups: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for child in ordered {
            let mut missing = UnresolvedEntries::new();
            let bag = self.child_bag(child, &mut missing);
            let alias = child.alias();
            let first = !groups.contains_key(&alias);
            for (field, error) in missing {
                if first {
                    unresolved.insert(format!("{alias}.{field}"), error.clone());
                }
                unresolved.insert(format!("{alias}.{}.{field}", child.position), error);
            }
            let entry = groups.entry(alias).or_insert_with(|| bag.clone());
            entry.insert(child.position.to_string(), Value::Object(bag));
        }

        for (alias, bag) in groups {
            context.insert(alias, Value::Object(bag));
        }
    }
}

fn catalog_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn multiply(value: Value, count: u32) -> Value {
    if count == 1 {
        return value;
    }
    match &value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i.saturating_mul(i64::from(count)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f * f64::from(count)).map_or(value, Value::Number)
            } else {
                value
            }
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuiltinCatalog, CatalogRef};
    use crate::test_utils::StaticCatalogs;
    use serde_json::json;

    fn child(designation: &str, position: u32, count: u32, parameters: Value) -> ChildComponent {
        let attributes = parameters
            .as_object()
            .map(|m| {
                m.keys()
                    .enumerate()
                    .map(|(i, k)| Attribute::new(i as i64, k.clone(), AttributeType::Number))
                    .collect()
            })
            .unwrap_or_default();
        ChildComponent {
            category: Category::Detail,
            designation: designation.to_string(),
            position,
            count,
            inner_id: Some(100_000 + i64::from(position)),
            parameters: parameters.as_object().cloned().unwrap_or_default(),
            attributes,
        }
    }

    #[test]
    fn test_child_values_are_multiplied_by_count() {
        let catalogs = StaticCatalogs::default();
        let builder = ContextBuilder::new(&catalogs);
        let bag = builder.child_bag(&child("HDH", 1, 3, json!({"m": 1.5, "n": 2, "s": "x"})), &mut UnresolvedEntries::new());
        assert_eq!(bag["m"].as_f64(), Some(4.5));
        assert_eq!(bag["n"], json!(6));
        assert_eq!(bag["inner_id"], json!(100_001));
    }

    #[test]
    fn test_unbacked_parameters_are_hidden() {
        let catalogs = StaticCatalogs::default();
        let builder = ContextBuilder::new(&catalogs);
        let attributes = vec![Attribute::new(1, "a", AttributeType::Integer)];
        let params = json!({"a": 1, "legacy": 2}).as_object().cloned().unwrap();
        let resolved = builder.resolve_parameters(&params, &attributes, &mut UnresolvedEntries::new());
        assert!(resolved.contains_key("a"));
        assert!(!resolved.contains_key("legacy"));
    }

    #[test]
    fn test_catalog_ids_become_records() {
        let load_groups = CatalogRef::Builtin(BuiltinCatalog::LoadGroup);
        let catalogs = StaticCatalogs::default().with_entry(load_groups.clone(), 3, json!({"lgv": 13, "kn": 14}));
        let builder = ContextBuilder::new(&catalogs);

        let mut attribute = Attribute::new(1, "load_group", AttributeType::Catalog);
        attribute.catalog = Some(load_groups);
        let params = json!({"load_group": 3}).as_object().cloned().unwrap();
        let mut unresolved = UnresolvedEntries::new();
        let resolved = builder.resolve_parameters(&params, std::slice::from_ref(&attribute), &mut unresolved);
        assert_eq!(resolved["load_group"]["lgv"], json!(13));
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_missing_catalog_entry_is_left_out() {
        let load_groups = CatalogRef::Builtin(BuiltinCatalog::LoadGroup);
        let catalogs = StaticCatalogs::default();
        let builder = ContextBuilder::new(&catalogs);

        let mut attribute = Attribute::new(1, "lg", AttributeType::Catalog);
        attribute.catalog = Some(load_groups);
        let attributes = [attribute, Attribute::new(2, "d", AttributeType::Integer)];
        let params = json!({"lg": 999, "d": 4}).as_object().cloned().unwrap();

        let mut unresolved = UnresolvedEntries::new();
        let resolved = builder.resolve_parameters(&params, &attributes, &mut unresolved);
        assert_eq!(resolved.get("d"), Some(&json!(4)));
        assert!(!resolved.contains_key("lg"));
        assert!(matches!(unresolved["lg"], TemplateError::CatalogEntryMissing { .. }));

        assert!(unresolved_for(&unresolved, "lg.lgv").is_some());
        assert!(unresolved_for(&unresolved, "lg").is_some());
        assert!(unresolved_for(&unresolved, "lgx").is_none());
    }

    #[test]
    fn test_child_with_missing_catalog_entry() {
        let catalogs = StaticCatalogs::default();
        let builder = ContextBuilder::new(&catalogs);
        let mut rod = child("ZZF", 2, 1, json!({"len": 150}));
        let mut material = Attribute::new(7, "mat", AttributeType::Catalog);
        material.catalog = Some(CatalogRef::Builtin(BuiltinCatalog::LoadGroup));
        rod.attributes.push(material);
        rod.parameters.insert("mat".into(), json!(42));

        let mut context = Map::new();
        let mut unresolved = UnresolvedEntries::new();
        builder.bind_children(&mut context, &[rod], &mut unresolved);

        assert_eq!(context["normalized_detail_zzf"]["len"], json!(150));
        assert!(unresolved.contains_key("normalized_detail_zzf.mat"));
        assert!(unresolved.contains_key("normalized_detail_zzf.2.mat"));
    }

    #[test]
    fn test_children_bound_by_alias_and_position() {
        let catalogs = StaticCatalogs::default();
        let builder = ContextBuilder::new(&catalogs);
        let mut context = Map::new();
        builder.bind_children(
            &mut context,
            &[child("HDH-12", 2, 1, json!({"e": 5})), child("HDH-12", 1, 1, json!({"e": 2}))],
            &mut UnresolvedEntries::new(),
        );

        let bag = &context["normalized_detail_hdh_12"];
        assert_eq!(bag["e"], json!(2));
        assert_eq!(bag["1"]["e"], json!(2));
        assert_eq!(bag["2"]["e"], json!(5));
    }
}

//! File-backed in-memory catalog.
//!
//! [`CatalogSnapshot`] holds a complete catalog (structure, items and
//! reference catalogs) loaded from a JSON, YAML or TOML file. It implements
//! [`CatalogRepository`] and [`CatalogProvider`], so the engine can
//! recalculate items without a database, and it offers the few mutations the
//! CLI needs: writing recalculated items back, assigning identities to new
//! items and moving composition slots.

pub mod format;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

pub use format::{DirectoryFile, EntryFile, SnapshotFile, SnapshotFormat};

use crate::constants::FIRST_INNER_ID;
use crate::core::CatalogError;
use crate::models::{Attribute, BaseComposition, CatalogRef, DetailType, Item, ItemChild, Variant};
use crate::providers::{CatalogProvider, CatalogRecord, CatalogRepository};
use crate::templating::rewrite_positional_references;

/// Complete catalog held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotFile", into = "SnapshotFile")]
pub struct CatalogSnapshot {
    detail_types: BTreeMap<i64, DetailType>,
    variants: BTreeMap<i64, Variant>,
    attributes: Vec<Attribute>,
    base_compositions: Vec<BaseComposition>,
    items: BTreeMap<i64, Item>,
    item_children: Vec<ItemChild>,
    catalogs: BTreeMap<CatalogRef, BTreeMap<i64, CatalogRecord>>,
    /// Names of dynamic directories
    directories: BTreeMap<i64, String>,
}

impl TryFrom<SnapshotFile> for CatalogSnapshot {
    type Error = CatalogError;

    fn try_from(file: SnapshotFile) -> Result<Self, Self::Error> {
        let mut snapshot = Self::default();

        for detail_type in file.detail_types {
            let id = detail_type.id;
            if snapshot.detail_types.insert(id, detail_type).is_some() {
                return Err(duplicate("detail type", id));
            }
        }
        for variant in file.variants {
            let id = variant.id;
            if snapshot.variants.insert(id, variant).is_some() {
                return Err(duplicate("variant", id));
            }
        }
        for item in file.items {
            let id = item.id;
            if snapshot.items.insert(id, item).is_some() {
                return Err(duplicate("item", id));
            }
        }
        snapshot.attributes = file.attributes;
        snapshot.base_compositions = file.base_compositions;
        snapshot.item_children = file.item_children;

        for (name, entries) in file.catalogs {
            let catalog = name.parse::<CatalogRef>()?;
            let records = snapshot.catalogs.entry(catalog).or_default();
            for entry in entries {
                records.insert(entry.id, entry.fields);
            }
        }
        for directory in file.directories {
            snapshot.directories.insert(directory.id, directory.name);
            let records = snapshot.catalogs.entry(CatalogRef::Directory(directory.id)).or_default();
            for entry in directory.entries {
                records.insert(entry.id, entry.fields);
            }
        }

        Ok(snapshot)
    }
}

impl From<CatalogSnapshot> for SnapshotFile {
    fn from(snapshot: CatalogSnapshot) -> Self {
        let entries = |records: BTreeMap<i64, CatalogRecord>| {
            records
                .into_iter()
                .map(|(id, fields)| EntryFile {
                    id,
                    fields,
                })
                .collect::<Vec<_>>()
        };

        let mut catalogs = BTreeMap::new();
        let mut directories: BTreeMap<i64, DirectoryFile> = snapshot
            .directories
            .into_iter()
            .map(|(id, name)| {
                (
                    id,
                    DirectoryFile {
                        id,
                        name,
                        entries: Vec::new(),
                    },
                )
            })
            .collect();

        for (catalog, records) in snapshot.catalogs {
            match catalog {
                CatalogRef::Builtin(builtin) => {
                    catalogs.insert(builtin.as_str().to_string(), entries(records));
                }
                CatalogRef::Directory(id) => {
                    directories
                        .entry(id)
                        .or_insert_with(|| DirectoryFile {
                            id,
                            name: format!("Directory {id}"),
                            entries: Vec::new(),
                        })
                        .entries = entries(records);
                }
            }
        }

        Self {
            detail_types: snapshot.detail_types.into_values().collect(),
            variants: snapshot.variants.into_values().collect(),
            attributes: snapshot.attributes,
            base_compositions: snapshot.base_compositions,
            items: snapshot.items.into_values().collect(),
            item_children: snapshot.item_children,
            catalogs,
            directories: directories.into_values().collect(),
        }
    }
}

fn duplicate(kind: &str, id: i64) -> CatalogError {
    CatalogError::Other {
        message: format!("Duplicate {kind} id {id}"),
    }
}

impl CatalogSnapshot {
    /// Parse snapshot text.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SnapshotParseError`] with `file` as the source
    /// name.
    pub fn parse(text: &str, format: SnapshotFormat, file: &str) -> Result<Self, CatalogError> {
        let parse_error = |reason: String| CatalogError::SnapshotParseError {
            file: file.to_string(),
            reason,
        };
        let raw = SnapshotFile::parse(text, format).map_err(parse_error)?;
        Self::try_from(raw).map_err(|e| parse_error(e.to_string()))
    }

    /// Render the snapshot in `format`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Other`] when serialization fails.
    pub fn render(&self, format: SnapshotFormat) -> Result<String, CatalogError> {
        SnapshotFile::from(self.clone()).render(format).map_err(|message| CatalogError::Other {
            message,
        })
    }

    /// Load a snapshot, picking the format from the extension.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let format = SnapshotFormat::from_path(path)?;
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot = Self::parse(&text, format, &path.display().to_string())?;
        tracing::debug!(
            "Loaded snapshot {}: {} items, {} variants",
            path.display(),
            snapshot.items.len(),
            snapshot.variants.len()
        );
        Ok(snapshot)
    }

    /// Write the snapshot, picking the format from the extension.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be rendered or written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let format = SnapshotFormat::from_path(path)?;
        let text = self.render(format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, text).await.with_context(|| format!("Failed to write snapshot {}", path.display()))
    }

    pub fn add_detail_type(&mut self, detail_type: DetailType) {
        self.detail_types.insert(detail_type.id, detail_type);
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.insert(variant.id, variant);
    }

    /// Add an attribute, replacing one with the same id.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.id == attribute.id) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Add a composition rule, replacing one with the same id.
    pub fn add_base_composition(&mut self, composition: BaseComposition) {
        match self.base_compositions.iter_mut().find(|c| c.id == composition.id) {
            Some(existing) => *existing = composition,
            None => self.base_compositions.push(composition),
        }
    }

    /// Add or replace an item.
    pub fn add_item(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    /// Add a composition edge, replacing one with the same id.
    pub fn add_item_child(&mut self, edge: ItemChild) {
        match self.item_children.iter_mut().find(|c| c.id == edge.id) {
            Some(existing) => *existing = edge,
            None => self.item_children.push(edge),
        }
    }

    /// Store one catalog record.
    pub fn add_catalog_entry(&mut self, catalog: CatalogRef, id: i64, record: CatalogRecord) {
        self.catalogs.entry(catalog).or_default().insert(id, record);
    }

    /// Register a dynamic directory.
    pub fn add_directory(&mut self, id: i64, name: impl Into<String>) {
        self.directories.insert(id, name.into());
        self.catalogs.entry(CatalogRef::Directory(id)).or_default();
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn item_children(&self) -> &[ItemChild] {
        &self.item_children
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }

    pub fn item_mut(&mut self, id: i64) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Give every item without an `inner_id` the next free one, and fill
    /// missing comments from the detail type.
    ///
    /// Returns the number of items that received an `inner_id`.
    pub fn assign_inner_ids(&mut self) -> usize {
        let mut next = self.items.values().filter_map(|i| i.inner_id).max().map_or(FIRST_INNER_ID, |max| max + 1);
        let mut assigned = 0;

        for item in self.items.values_mut().filter(|i| i.inner_id.is_none()) {
            item.inner_id = Some(next);
            next += 1;
            assigned += 1;
            if item.comment.as_deref().is_none_or(str::is_empty) {
                item.comment = self
                    .detail_types
                    .get(&item.detail_type_id)
                    .and_then(|t| t.default_comment.clone());
            }
        }
        assigned
    }

    /// Move a composition rule to another slot.
    ///
    /// Formulas of the parent (its type attributes and, when the rule pins a
    /// parent variant, that variant's attributes) that address the child by
    /// its old slot are rewritten to the new one.
    ///
    /// Returns the ids of the rewritten attributes.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for an unknown rule or child type.
    pub fn move_composition_slot(&mut self, composition_id: i64, new_position: u32) -> Result<Vec<i64>, CatalogError> {
        let not_found = |kind, id| CatalogError::NotFound {
            kind,
            id,
        };
        let composition = self
            .base_compositions
            .iter()
            .find(|c| c.id == composition_id)
            .cloned()
            .ok_or_else(|| not_found("base composition", composition_id))?;
        if composition.position == new_position {
            return Ok(Vec::new());
        }

        let child_type_id = match composition.base_child_variant {
            Some(variant_id) => {
                self.variants.get(&variant_id).ok_or_else(|| not_found("variant", variant_id))?.detail_type_id
            }
            None => composition.base_child,
        };
        let child_type =
            self.detail_types.get(&child_type_id).ok_or_else(|| not_found("detail type", child_type_id))?;
        let (category, designation) = (child_type.category, child_type.designation.clone());
        let key = format!("<{}>", child_type.reference_key());

        let mut rewritten = Vec::new();
        for attribute in &mut self.attributes {
            let owned_by_parent = attribute.detail_type_id == Some(composition.base_parent)
                || (composition.base_parent_variant.is_some()
                    && attribute.variant_id == composition.base_parent_variant);
            let Some(formula) = attribute.calculated_value.as_deref() else {
                continue;
            };
            if !owned_by_parent || !formula.contains(&key) {
                continue;
            }
            let updated =
                rewrite_positional_references(formula, category, &designation, composition.position, new_position);
            if updated != formula {
                attribute.calculated_value = Some(updated);
                rewritten.push(attribute.id);
            }
        }

        if let Some(stored) = self.base_compositions.iter_mut().find(|c| c.id == composition_id) {
            stored.position = new_position;
        }
        tracing::info!(
            "Moved composition {composition_id} to slot {new_position}, rewrote {} formula(s)",
            rewritten.len()
        );
        Ok(rewritten)
    }
}

impl CatalogProvider for CatalogSnapshot {
    fn catalog_exists(&self, catalog: &CatalogRef) -> bool {
        match catalog {
            CatalogRef::Builtin(_) => true,
            CatalogRef::Directory(id) => self.directories.contains_key(id) || self.catalogs.contains_key(catalog),
        }
    }

    fn lookup(&self, catalog: &CatalogRef, id: i64) -> Option<CatalogRecord> {
        let mut record = self.catalogs.get(catalog)?.get(&id)?.clone();
        record.entry("id").or_insert_with(|| id.into());
        Some(record)
    }
}

impl CatalogRepository for CatalogSnapshot {
    fn detail_type(&self, id: i64) -> Option<&DetailType> {
        self.detail_types.get(&id)
    }

    fn variant(&self, id: i64) -> Option<&Variant> {
        self.variants.get(&id)
    }

    fn item(&self, id: i64) -> Option<&Item> {
        self.items.get(&id)
    }

    fn item_ids(&self) -> Vec<i64> {
        self.items.keys().copied().collect()
    }

    fn detail_type_attributes(&self, detail_type_id: i64) -> Vec<Attribute> {
        self.attributes.iter().filter(|a| a.detail_type_id == Some(detail_type_id)).cloned().collect()
    }

    fn variant_attributes(&self, variant_id: i64) -> Vec<Attribute> {
        self.attributes.iter().filter(|a| a.variant_id == Some(variant_id)).cloned().collect()
    }

    fn variants_of(&self, detail_type_id: i64) -> Vec<i64> {
        self.variants.values().filter(|v| v.detail_type_id == detail_type_id).map(|v| v.id).collect()
    }

    fn children_of(&self, item_id: i64) -> Vec<ItemChild> {
        let mut children: Vec<ItemChild> =
            self.item_children.iter().filter(|c| c.parent_id == item_id).cloned().collect();
        children.sort_by_key(|c| (c.position, c.id));
        children
    }

    fn parents_of(&self, item_id: i64) -> Vec<i64> {
        let mut parents: Vec<i64> =
            self.item_children.iter().filter(|c| c.child_id == item_id).map(|c| c.parent_id).collect();
        parents.sort_unstable();
        parents.dedup();
        parents
    }

    fn items_using_variant(&self, variant_id: i64) -> Vec<i64> {
        self.items.values().filter(|i| i.variant_id == Some(variant_id)).map(|i| i.id).collect()
    }

    fn items_using_detail_type(&self, detail_type_id: i64) -> Vec<i64> {
        self.items.values().filter(|i| i.detail_type_id == detail_type_id).map(|i| i.id).collect()
    }

    fn base_compositions(&self) -> Vec<BaseComposition> {
        self.base_compositions.clone()
    }
}

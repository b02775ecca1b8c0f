//! Snapshot file formats and the on-disk layout.
//!
//! ```yaml
//! detail_types:
//!   - { id: 1, name: Hanger, designation: FHD, category: product }
//! variants:
//!   - { id: 10, detail_type_id: 1, name: FHD-1, marking_template: "FHD {{ d }}" }
//! attributes:
//!   - { id: 100, variant_id: 10, name: d, type: integer }
//! items:
//!   - { id: 1000, detail_type_id: 1, variant_id: 10, parameters: { d: 12 } }
//! item_children: []
//! base_compositions: []
//! catalogs:
//!   LoadGroup:
//!     - { id: 3, lgv: 13 }
//! directories:
//!   - { id: 7, name: Coatings, entries: [ { id: 1, code: ZN } ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::CatalogError;
use crate::models::{Attribute, BaseComposition, DetailType, Item, ItemChild, Variant};

/// Serialization format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Yaml,
    Toml,
}

impl SnapshotFormat {
    /// Format for `path`: `.json`, `.yaml` / `.yml` or `.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SnapshotParseError`] for other extensions.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(CatalogError::SnapshotParseError {
                file: path.display().to_string(),
                reason: "unknown extension, expected .json, .yaml, .yml or .toml".to_string(),
            }),
        }
    }
}

/// One record of a catalog or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFile {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryFile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<EntryFile>,
}

/// Snapshot exactly as stored in a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotFile {
    pub detail_types: Vec<DetailType>,
    pub variants: Vec<Variant>,
    pub attributes: Vec<Attribute>,
    pub base_compositions: Vec<BaseComposition>,
    pub items: Vec<Item>,
    pub item_children: Vec<ItemChild>,
    /// Built-in catalog name to its records
    pub catalogs: BTreeMap<String, Vec<EntryFile>>,
    pub directories: Vec<DirectoryFile>,
}

impl SnapshotFile {
    /// Parse snapshot text.
    ///
    /// # Errors
    ///
    /// Returns the parser message.
    pub fn parse(text: &str, format: SnapshotFormat) -> Result<Self, String> {
        match format {
            SnapshotFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            SnapshotFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            SnapshotFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Render snapshot text.
    ///
    /// TOML has no null, so `null` parameter and record values are left out
    /// of TOML output. Missing values read back as empty.
    ///
    /// # Errors
    ///
    /// Returns the serializer message.
    pub fn render(&self, format: SnapshotFormat) -> Result<String, String> {
        match format {
            SnapshotFormat::Json => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
            SnapshotFormat::Yaml => serde_yaml::to_string(self).map_err(|e| e.to_string()),
            SnapshotFormat::Toml => {
                let mut file = self.clone();
                for item in &mut file.items {
                    item.parameters.retain(|_, v| !v.is_null());
                }
                let entries = file
                    .catalogs
                    .values_mut()
                    .flatten()
                    .chain(file.directories.iter_mut().flat_map(|d| d.entries.iter_mut()));
                for entry in entries {
                    entry.fields.retain(|_, v| !v.is_null());
                }
                toml::to_string_pretty(&file).map_err(|e| e.to_string())
            }
        }
    }
}

//! Test utilities for catalog-calc
//!
//! Helpers shared by unit tests and the integration suite:
//!
//! - [`init_test_logging`]: route `tracing` output to the test harness
//! - [`StaticCatalogs`]: in-memory reference catalogs
//! - [`fixtures`]: small builders for detail types and attributes
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_calc::models::{BuiltinCatalog, CatalogRef};
//! use catalog_calc::test_utils::{StaticCatalogs, init_test_logging};
//! use serde_json::json;
//!
//! init_test_logging(None);
//! let catalogs = StaticCatalogs::default()
//!     .with_entry(CatalogRef::Builtin(BuiltinCatalog::LoadGroup), 3, json!({"lgv": 13}));
//! ```

pub mod fixtures;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::models::CatalogRef;
use crate::providers::{CatalogProvider, CatalogRecord};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` set, that level is used;
/// otherwise `RUST_LOG` is honoured, and without it nothing is logged.
///
/// ```bash
/// RUST_LOG=catalog_calc=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Reference catalogs held in memory.
///
/// Built-in catalogs always exist. A directory exists once it is registered
/// or holds an entry.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogs {
    entries: BTreeMap<CatalogRef, BTreeMap<i64, CatalogRecord>>,
    directories: BTreeSet<i64>,
}

impl StaticCatalogs {
    /// Add one record. Non-object values are stored as an empty record.
    #[must_use]
    pub fn with_entry(mut self, catalog: CatalogRef, id: i64, record: Value) -> Self {
        let record = match record {
            Value::Object(map) => map,
            _ => CatalogRecord::new(),
        };
        self.entries.entry(catalog).or_default().insert(id, record);
        self
    }

    /// Register an empty directory.
    #[must_use]
    pub fn with_directory(mut self, id: i64) -> Self {
        self.directories.insert(id);
        self
    }
}

impl CatalogProvider for StaticCatalogs {
    fn catalog_exists(&self, catalog: &CatalogRef) -> bool {
        match catalog {
            CatalogRef::Builtin(_) => true,
            CatalogRef::Directory(id) => self.directories.contains(id) || self.entries.contains_key(catalog),
        }
    }

    fn lookup(&self, catalog: &CatalogRef, id: i64) -> Option<CatalogRecord> {
        self.entries.get(catalog)?.get(&id).cloned()
    }
}

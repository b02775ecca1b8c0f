//! Read-through cache for catalog lookups.
//!
//! Recalculating an item reads the same things over and over: the sorted
//! attributes of its variant, the child edges of its parent, the catalog
//! records its parameters point to. The engine keeps those behind a
//! [`CacheStore`] port so the storage can be swapped (the in-memory adapter
//! in [`memory`] is the only one shipped).
//!
//! # Keys
//!
//! | Key | Text form |
//! |---|---|
//! | [`CacheKey::VariantAttributes`] | `variant:{id}:attrs` |
//! | [`CacheKey::VariantSortedAttributes`] | `variant:{id}:sorted_attrs` |
//! | [`CacheKey::ItemChildren`] | `item:{id}:children` |
//! | [`CacheKey::CatalogEntry`] | `catalog_entry:{model}:{id}` or `directory_entry:{dir}:{id}` |
//!
//! Entries are invalidated explicitly by the engine when a change event
//! arrives, and expire after the configured TTL otherwise.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::models::{Attribute, CatalogRef, ItemChild};
use crate::providers::{CatalogProvider, CatalogRecord};

pub use memory::{CacheStats, InMemoryCache, NullCache};

/// Typed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Merged attributes visible to a variant, in position order
    VariantAttributes(i64),
    /// Merged attributes in evaluation order
    VariantSortedAttributes(i64),
    /// Child edges of an item
    ItemChildren(i64),
    /// One record of a reference catalog
    CatalogEntry { catalog: CatalogRef, id: i64 },
}

impl CacheKey {
    /// Whether this key belongs to the given variant.
    #[must_use]
    pub fn is_variant(&self, variant_id: i64) -> bool {
        matches!(self, Self::VariantAttributes(id) | Self::VariantSortedAttributes(id) if *id == variant_id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariantAttributes(id) => write!(f, "variant:{id}:attrs"),
            Self::VariantSortedAttributes(id) => write!(f, "variant:{id}:sorted_attrs"),
            Self::ItemChildren(id) => write!(f, "item:{id}:children"),
            Self::CatalogEntry {
                catalog: CatalogRef::Builtin(model),
                id,
            } => write!(f, "catalog_entry:{}:{id}", model.as_str()),
            Self::CatalogEntry {
                catalog: CatalogRef::Directory(directory),
                id,
            } => write!(f, "directory_entry:{directory}:{id}"),
        }
    }
}

/// Cached payloads. Shared through `Arc` so hits never copy the data.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Attributes(Arc<Vec<Attribute>>),
    Children(Arc<Vec<ItemChild>>),
    Record(Arc<CatalogRecord>),
}

/// Storage port for cached lookups.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    fn set(&self, key: CacheKey, value: CachedValue);

    fn invalidate(&self, key: &CacheKey);

    /// Drop every entry whose key matches `predicate`.
    fn invalidate_matching(&self, predicate: &dyn Fn(&CacheKey) -> bool);

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    /// Cached attribute list, or `load` stored under `key`.
    fn attributes_or_insert_with(
        &self,
        key: CacheKey,
        load: &mut dyn FnMut() -> Vec<Attribute>,
    ) -> Arc<Vec<Attribute>> {
        if let Some(CachedValue::Attributes(attributes)) = self.get(&key) {
            return attributes;
        }
        let attributes = Arc::new(load());
        self.set(key, CachedValue::Attributes(Arc::clone(&attributes)));
        attributes
    }

    /// Cached child edges, or `load` stored under `key`.
    fn children_or_insert_with(
        &self,
        key: CacheKey,
        load: &mut dyn FnMut() -> Vec<ItemChild>,
    ) -> Arc<Vec<ItemChild>> {
        if let Some(CachedValue::Children(children)) = self.get(&key) {
            return children;
        }
        let children = Arc::new(load());
        self.set(key, CachedValue::Children(Arc::clone(&children)));
        children
    }
}

/// Catalog provider that serves records through a [`CacheStore`].
///
/// Misses are not cached, so a record added later is found on the next
/// lookup.
pub struct CachingProvider<'a> {
    inner: &'a dyn CatalogProvider,
    cache: &'a dyn CacheStore,
}

impl<'a> CachingProvider<'a> {
    #[must_use]
    pub fn new(inner: &'a dyn CatalogProvider, cache: &'a dyn CacheStore) -> Self {
        Self {
            inner,
            cache,
        }
    }
}

impl CatalogProvider for CachingProvider<'_> {
    fn catalog_exists(&self, catalog: &CatalogRef) -> bool {
        self.inner.catalog_exists(catalog)
    }

    fn lookup(&self, catalog: &CatalogRef, id: i64) -> Option<CatalogRecord> {
        let key = CacheKey::CatalogEntry {
            catalog: catalog.clone(),
            id,
        };
        if let Some(CachedValue::Record(record)) = self.cache.get(&key) {
            return Some(record.as_ref().clone());
        }

        let record = self.inner.lookup(catalog, id)?;
        self.cache.set(key, CachedValue::Record(Arc::new(record.clone())));
        Some(record)
    }
}

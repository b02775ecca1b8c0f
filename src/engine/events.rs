//! Change events and cache invalidation.
//!
//! Whoever stores catalog data reports what changed through a
//! [`ChangeEvent`]. The engine drops the cache entries that depend on it and
//! answers with the items whose computed values are now stale: the directly
//! affected items plus every item that contains one of them, transitively.

use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};

use super::CatalogEngine;
use crate::cache::CacheKey;
use crate::models::CatalogRef;
use crate::providers::CatalogRepository;

/// Something was saved in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// An attribute definition owned by a detail type or a variant
    AttributeSaved { detail_type_id: Option<i64>, variant_id: Option<i64> },
    VariantSaved(i64),
    /// Designation or category changes rename child aliases in parents
    DetailTypeSaved(i64),
    /// Parameters of an item changed; the item itself is already current
    ItemSaved(i64),
    /// A composition edge below `parent_id` was added, moved or removed
    ItemChildSaved { parent_id: i64 },
    CatalogEntrySaved { catalog: CatalogRef, id: i64 },
}

impl CatalogEngine {
    /// Invalidate the cache for `event` and return the stale item ids.
    pub fn apply_change<R: CatalogRepository>(&self, repo: &R, event: &ChangeEvent) -> BTreeSet<i64> {
        let direct: Vec<i64> = match event {
            ChangeEvent::AttributeSaved {
                detail_type_id,
                variant_id,
            } => {
                let mut items = Vec::new();
                if let Some(variant_id) = *variant_id {
                    self.invalidate_variant(variant_id);
                    items.extend(repo.items_using_variant(variant_id));
                }
                if let Some(detail_type_id) = *detail_type_id {
                    for variant_id in repo.variants_of(detail_type_id) {
                        self.invalidate_variant(variant_id);
                    }
                    items.extend(repo.items_using_detail_type(detail_type_id));
                }
                items
            }
            ChangeEvent::VariantSaved(variant_id) => {
                self.invalidate_variant(*variant_id);
                repo.items_using_variant(*variant_id)
            }
            ChangeEvent::DetailTypeSaved(detail_type_id) => {
                for variant_id in repo.variants_of(*detail_type_id) {
                    self.invalidate_variant(variant_id);
                }
                repo.items_using_detail_type(*detail_type_id)
            }
            ChangeEvent::ItemSaved(item_id) => {
                let stale = ancestors(repo, [*item_id]);
                tracing::debug!("{event:?}: {} stale item(s)", stale.len());
                return stale;
            }
            ChangeEvent::ItemChildSaved {
                parent_id,
            } => {
                self.cache.invalidate(&CacheKey::ItemChildren(*parent_id));
                vec![*parent_id]
            }
            ChangeEvent::CatalogEntrySaved {
                catalog,
                id,
            } => {
                self.cache.invalidate(&CacheKey::CatalogEntry {
                    catalog: catalog.clone(),
                    id: *id,
                });
                self.items_referencing(repo, catalog, *id)
            }
        };

        let mut stale = ancestors(repo, direct.iter().copied());
        stale.extend(direct);
        tracing::debug!("{event:?}: {} stale item(s)", stale.len());
        stale
    }

    fn invalidate_variant(&self, variant_id: i64) {
        self.cache.invalidate_matching(&|key| key.is_variant(variant_id));
    }

    /// Items holding `id` in a parameter bound to `catalog`.
    fn items_referencing<R: CatalogRepository>(&self, repo: &R, catalog: &CatalogRef, id: i64) -> Vec<i64> {
        repo.item_ids()
            .into_iter()
            .filter(|&item_id| {
                let Some(item) = repo.item(item_id) else {
                    return false;
                };
                let Some(variant_id) = item.variant_id else {
                    return false;
                };
                self.visible_attributes(repo, variant_id).iter().any(|attribute| {
                    attribute.catalog.as_ref() == Some(catalog)
                        && item.parameters.get(&attribute.name).is_some_and(|v| refers_to(v, id))
                })
            })
            .collect()
    }
}

fn refers_to(value: &Value, id: i64) -> bool {
    match value {
        Value::Number(n) => n.as_i64() == Some(id),
        Value::String(s) => s.trim().parse::<i64>().ok() == Some(id),
        _ => false,
    }
}

/// Every item containing one of `start`, transitively. `start` itself is
/// not included unless it contains itself through another item.
fn ancestors<R: CatalogRepository>(repo: &R, start: impl IntoIterator<Item = i64>) -> BTreeSet<i64> {
    let mut found = BTreeSet::new();
    let mut queue: VecDeque<i64> = start.into_iter().collect();
    while let Some(id) = queue.pop_front() {
        for parent in repo.parents_of(id) {
            if found.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    found
}

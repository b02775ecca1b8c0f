//! Item recalculation.
//!
//! [`CatalogEngine`] runs the save path of an item:
//!
//! 1. gather the attributes visible to the item's variant, in evaluation order
//! 2. resolve `parameters` / `parameters_errors`
//! 3. evaluate the variant's derived-quantity formulas
//! 4. compile the marking (the sentinel plus `marking_errors` on failure)
//! 5. copy the marking into `name` unless the name was edited by hand
//!
//! Per-attribute and per-template failures are stored on the item. Only
//! structural problems (unknown variant, variant of another type, missing
//! child records) are returned as errors.
//!
//! Attribute lists, child edges and catalog records are read through the
//! engine's [`CacheStore`]; [`CatalogEngine::apply_change`] invalidates them.

pub mod bulk;
pub mod events;
pub mod progress;

use serde_json::{Map, Value};
use std::sync::Arc;

pub use bulk::{RecalcFilter, RecalcSummary};
pub use events::ChangeEvent;
pub use progress::ProgressBar;

use crate::cache::{CacheKey, CacheStore, CachedValue, CachingProvider, InMemoryCache, NullCache};
use crate::composition::collect_children;
use crate::config::EngineConfig;
use crate::core::CatalogError;
use crate::models::{Attribute, DerivedQuantity, Item, ItemChild, Variant};
use crate::providers::CatalogRepository;
use crate::resolver::{AttributeResolver, CyclicDependencyError, ResolverOptions, topological_sort};
use crate::templating::{MarkingCompiler, MarkingRenderer};

/// Recalculates items against a repository.
pub struct CatalogEngine {
    config: EngineConfig,
    renderer: MarkingRenderer,
    cache: Box<dyn CacheStore>,
}

impl std::fmt::Debug for CatalogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEngine")
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl Default for CatalogEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl CatalogEngine {
    /// Engine with the cache described by `config.cache`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let cache: Box<dyn CacheStore> = if config.cache.enabled {
            Box::new(InMemoryCache::from_config(&config.cache))
        } else {
            Box::new(NullCache)
        };
        Self::with_cache(config, cache)
    }

    /// Engine with an explicit cache store.
    #[must_use]
    pub fn with_cache(config: EngineConfig, cache: Box<dyn CacheStore>) -> Self {
        Self {
            renderer: MarkingRenderer::from_config(&config.cache),
            config,
            cache,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    #[must_use]
    pub fn renderer(&self) -> &MarkingRenderer {
        &self.renderer
    }

    /// Attributes visible to a variant, in position order.
    pub fn visible_attributes<R: CatalogRepository>(&self, repo: &R, variant_id: i64) -> Arc<Vec<Attribute>> {
        self.cache.attributes_or_insert_with(CacheKey::VariantAttributes(variant_id), &mut || {
            repo.merged_attributes(variant_id)
        })
    }

    /// Attributes visible to a variant, in evaluation order.
    ///
    /// Only successful sorts are cached.
    ///
    /// # Errors
    ///
    /// Returns the cycle when the formulas reference each other in a loop.
    pub fn sorted_attributes<R: CatalogRepository>(
        &self,
        repo: &R,
        variant_id: i64,
    ) -> Result<Arc<Vec<Attribute>>, CyclicDependencyError> {
        let key = CacheKey::VariantSortedAttributes(variant_id);
        if let Some(CachedValue::Attributes(sorted)) = self.cache.get(&key) {
            return Ok(sorted);
        }

        let sorted = Arc::new(topological_sort(&self.visible_attributes(repo, variant_id))?);
        self.cache.set(key, CachedValue::Attributes(Arc::clone(&sorted)));
        Ok(sorted)
    }

    fn item_children<R: CatalogRepository>(&self, repo: &R, item_id: i64) -> Arc<Vec<ItemChild>> {
        self.cache.children_or_insert_with(CacheKey::ItemChildren(item_id), &mut || repo.children_of(item_id))
    }

    /// Recalculate one item in place.
    ///
    /// Items without a variant are left untouched.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] for an unknown variant or a missing child
    /// - [`CatalogError::VariantTypeMismatch`] when the variant belongs to
    ///   another detail type
    pub fn recalculate_item<R: CatalogRepository>(&self, repo: &R, item: &mut Item) -> Result<(), CatalogError> {
        self.recalculate_item_with(repo, item, Map::new())
    }

    /// Recalculate one item with extra template values.
    ///
    /// `extra` is visible to every formula and to the marking; it is how
    /// selection supplies deferred variables such as `Fcold`.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogEngine::recalculate_item`].
    pub fn recalculate_item_with<R: CatalogRepository>(
        &self,
        repo: &R,
        item: &mut Item,
        extra: Map<String, Value>,
    ) -> Result<(), CatalogError> {
        let Some(variant_id) = item.variant_id else {
            tracing::debug!("Item {} has no variant, skipping", item.id);
            return Ok(());
        };
        let variant = repo.variant(variant_id).ok_or(CatalogError::NotFound {
            kind: "variant",
            id: variant_id,
        })?;
        if variant.detail_type_id != item.detail_type_id {
            return Err(CatalogError::VariantTypeMismatch {
                variant_id,
                detail_type_id: item.detail_type_id,
            });
        }

        let attributes = self.sorted_attributes(repo, variant_id).unwrap_or_else(|cycle| {
            tracing::warn!("Variant {variant_id}: {cycle}");
            self.visible_attributes(repo, variant_id)
        });
        let edges = self.item_children(repo, item.id);
        let children = collect_children(repo, &edges, |id| self.visible_attributes(repo, id))?;
        let catalogs = CachingProvider::new(repo, self.cache.as_ref());

        let compiler = MarkingCompiler::new(&self.renderer, &catalogs, &attributes)
            .with_children(&children)
            .with_identity(item.inner_id, item.weight)
            .with_extra_context(extra.clone());

        let resolved = AttributeResolver::new(&compiler, &catalogs, ResolverOptions::from(&self.config)).resolve(
            &attributes,
            &item.parameters,
            &item.locked_parameters,
        );
        if !resolved.errors.is_empty() {
            tracing::debug!("Item {}: {} parameter error(s)", item.id, resolved.errors.len());
        }
        item.parameters_errors = resolved.errors_or_none();
        item.parameters = resolved.parameters;

        for quantity in DerivedQuantity::ALL {
            if let Some((value, errors)) = derived_value(&compiler, variant, quantity, &item.parameters) {
                item.set_derived(quantity, value, errors);
            }
        }

        // The marking sees the freshly computed weight.
        let compiler = compiler.with_identity(item.inner_id, item.weight);
        let compiled =
            compiler.generate_marking(&variant.marking_template, &item.parameters, &self.config.marking_error_sentinel);
        if !item.name_manual_changed {
            item.name = Some(compiled.marking.clone());
        }
        item.marking = Some(compiled.marking);
        item.marking_errors = compiled.errors;

        tracing::debug!("Recalculated item {}: {:?}", item.id, item.marking);
        Ok(())
    }
}

/// New value and errors of a derived quantity, or `None` to leave it as is.
fn derived_value(
    compiler: &MarkingCompiler<'_>,
    variant: &Variant,
    quantity: DerivedQuantity,
    parameters: &Map<String, Value>,
) -> Option<(Option<f64>, Option<Vec<String>>)> {
    let Some(formula) = variant.formula(quantity) else {
        return (!quantity.keeps_value_without_formula()).then_some((None, None));
    };

    let outcome = compiler.compile_formula(formula, parameters).map_err(|e| e.to_string()).and_then(|text| {
        let text = text.trim();
        text.parse::<f64>().map_err(|_| format!("'{text}' is not a number"))
    });
    match outcome {
        Ok(value) => Some((Some(value), None)),
        Err(message) => {
            tracing::warn!("{} formula failed: {message}", quantity.as_str());
            Some((Some(0.0), Some(vec![message])))
        }
    }
}

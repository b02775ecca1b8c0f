//! Bulk recalculation of a snapshot.

use serde::Serialize;
use std::collections::BTreeSet;

use super::CatalogEngine;
use super::events::ChangeEvent;
use super::progress::ProgressBar;
use crate::composition::children_first_order;
use crate::core::CatalogError;
use crate::models::{Category, Item};
use crate::providers::CatalogRepository;
use crate::snapshot::CatalogSnapshot;

/// Restricts which items a bulk run recalculates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcFilter {
    pub category: Option<Category>,
    /// Exact detail type designation
    pub designation: Option<String>,
}

impl RecalcFilter {
    #[must_use]
    pub fn matches<R: CatalogRepository>(&self, repo: &R, item: &Item) -> bool {
        if self.category.is_none() && self.designation.is_none() {
            return true;
        }
        let Some(detail_type) = repo.detail_type(item.detail_type_id) else {
            return false;
        };
        self.category.is_none_or(|c| c == detail_type.category)
            && self.designation.as_deref().is_none_or(|d| d == detail_type.designation)
    }
}

/// Outcome of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecalcSummary {
    pub recalculated: usize,
    /// Items left out by the filter or without a variant
    pub skipped: usize,
    /// Items stored with parameter errors
    pub parameter_errors: usize,
    /// Items stored with a failed marking
    pub marking_errors: usize,
    /// Items that could not be recalculated at all
    pub failures: Vec<(i64, String)>,
    /// Items outside the filter that contain a recalculated item
    pub stale: BTreeSet<i64>,
}

impl CatalogEngine {
    /// Recalculate every matching item of `snapshot`, children first.
    ///
    /// Items missing an `inner_id` get one before the run. Each result is
    /// written back before its parents are computed, so parents see current
    /// child values.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidComposition`] when the stored item
    /// composition is cyclic. Failures of single items are collected in the
    /// summary instead.
    pub fn recalculate_all(
        &self,
        snapshot: &mut CatalogSnapshot,
        filter: &RecalcFilter,
        progress: &ProgressBar,
    ) -> Result<RecalcSummary, CatalogError> {
        let assigned = snapshot.assign_inner_ids();
        if assigned > 0 {
            tracing::info!("Assigned inner ids to {assigned} item(s)");
        }

        let order = children_first_order(&*snapshot)?;
        let mut summary = RecalcSummary::default();
        progress.set_prefix("Recalculating");

        for id in order {
            progress.inc(1);
            let Some(item) = snapshot.item(id) else {
                continue;
            };
            if item.variant_id.is_none() || !filter.matches(&*snapshot, item) {
                summary.skipped += 1;
                continue;
            }

            let mut item = item.clone();
            progress.set_message(item.name.clone().unwrap_or_else(|| format!("item {id}")));
            match self.recalculate_item(&*snapshot, &mut item) {
                Ok(()) => {
                    summary.recalculated += 1;
                    summary.parameter_errors += usize::from(item.parameters_errors.is_some());
                    summary.marking_errors += usize::from(item.marking_errors.is_some());
                    snapshot.add_item(item);
                    summary.stale.extend(self.apply_change(&*snapshot, &ChangeEvent::ItemSaved(id)));
                }
                Err(e) => {
                    tracing::warn!("Item {id} failed: {e}");
                    summary.failures.push((id, e.to_string()));
                }
            }
        }

        let recalculated: BTreeSet<i64> = snapshot
            .items()
            .filter(|i| i.variant_id.is_some() && filter.matches(&*snapshot, i))
            .map(|i| i.id)
            .collect();
        summary.stale.retain(|id| !recalculated.contains(id));

        progress.finish_with_message(format!("{} item(s) recalculated", summary.recalculated));
        tracing::info!(
            "Recalculated {} item(s), {} skipped, {} failed",
            summary.recalculated,
            summary.skipped,
            summary.failures.len()
        );
        Ok(summary)
    }
}

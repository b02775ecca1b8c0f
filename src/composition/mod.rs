//! Composition graphs.
//!
//! Two graphs describe how components nest:
//!
//! - type level: [`BaseComposition`] edges between detail types
//! - instance level: [`ItemChild`] edges between items
//!
//! Both must stay acyclic. The checks here run before an edge is stored;
//! [`children_first_order`] relies on them when it orders items for bulk
//! recalculation (every child before its parents).

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::CatalogError;
use crate::models::{Attribute, BaseComposition, ItemChild};
use crate::providers::CatalogRepository;
use crate::templating::ChildComponent;

/// Directed graph over ids with edges `parent -> child`.
#[derive(Debug, Default)]
pub struct CompositionGraph {
    graph: DiGraph<i64, ()>,
    nodes: HashMap<i64, NodeIndex>,
}

impl CompositionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of the given `(parent, child)` edges.
    #[must_use]
    pub fn from_edges(edges: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut graph = Self::new();
        for (parent, child) in edges {
            graph.add_edge(parent, child);
        }
        graph
    }

    fn node(&mut self, id: i64) -> NodeIndex {
        *self.nodes.entry(id).or_insert_with(|| self.graph.add_node(id))
    }

    pub fn add_edge(&mut self, parent: i64, child: i64) {
        let (from, to) = (self.node(parent), self.node(child));
        self.graph.update_edge(from, to, ());
    }

    /// Whether `descendant` is reachable from `ancestor` (or is the same id).
    #[must_use]
    pub fn contains_path(&self, ancestor: i64, descendant: i64) -> bool {
        match (self.nodes.get(&ancestor), self.nodes.get(&descendant)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => ancestor == descendant,
        }
    }

    /// Whether adding `parent -> child` would close a cycle.
    #[must_use]
    pub fn would_cycle(&self, parent: i64, child: i64) -> bool {
        self.contains_path(child, parent)
    }

    /// Ids ordered so that every child precedes its parents.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidComposition`] when the graph has a cycle.
    pub fn children_first(&self) -> Result<Vec<i64>, CatalogError> {
        let order = toposort(&self.graph, None).map_err(|cycle| CatalogError::InvalidComposition {
            reason: format!("component {} is part of a composition cycle", self.graph[cycle.node_id()]),
        })?;
        Ok(order.into_iter().rev().map(|n| self.graph[n]).collect())
    }
}

/// Check a type-level composition rule against the stored ones.
///
/// A rule with the same id as a stored rule replaces it.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidComposition`] naming the first violated rule.
pub fn validate_base_composition<R: CatalogRepository + ?Sized>(
    repo: &R,
    composition: &BaseComposition,
) -> Result<(), CatalogError> {
    let invalid = |reason: String| Err(CatalogError::InvalidComposition {
        reason,
    });

    for (variant_id, detail_type_id, role) in [
        (composition.base_parent_variant, composition.base_parent, "parent"),
        (composition.base_child_variant, composition.base_child, "child"),
    ] {
        let Some(variant_id) = variant_id else {
            continue;
        };
        let variant = repo.variant(variant_id).ok_or(CatalogError::NotFound {
            kind: "variant",
            id: variant_id,
        })?;
        if variant.detail_type_id != detail_type_id {
            return invalid(format!(
                "{role} variant {variant_id} does not belong to detail type {detail_type_id}"
            ));
        }
    }

    if composition.base_parent == composition.base_child {
        return invalid("a detail type cannot contain itself".to_string());
    }
    if composition.base_parent_variant.is_some() && composition.base_parent_variant == composition.base_child_variant
    {
        return invalid("a variant cannot contain itself".to_string());
    }

    let graph = CompositionGraph::from_edges(
        repo.base_compositions()
            .into_iter()
            .filter(|c| c.id != composition.id)
            .map(|c| (c.base_parent, c.base_child)),
    );
    if graph.would_cycle(composition.base_parent, composition.base_child) {
        return invalid(format!(
            "detail type {} already contains detail type {}",
            composition.base_child, composition.base_parent
        ));
    }
    Ok(())
}

/// Item-level composition graph of a repository.
#[must_use]
pub fn item_graph<R: CatalogRepository + ?Sized>(repo: &R) -> CompositionGraph {
    let mut graph = CompositionGraph::new();
    for id in repo.item_ids() {
        graph.node(id);
        for edge in repo.children_of(id) {
            graph.add_edge(edge.parent_id, edge.child_id);
        }
    }
    graph
}

/// Check an item composition edge against the stored ones.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidComposition`] when the edge is a self-loop
/// or would make the child contain one of its ancestors.
pub fn validate_item_child<R: CatalogRepository + ?Sized>(repo: &R, edge: &ItemChild) -> Result<(), CatalogError> {
    if edge.parent_id == edge.child_id {
        return Err(CatalogError::InvalidComposition {
            reason: "an item cannot contain itself".to_string(),
        });
    }

    let mut graph = CompositionGraph::new();
    for id in repo.item_ids() {
        for stored in repo.children_of(id).into_iter().filter(|c| c.id != edge.id) {
            graph.add_edge(stored.parent_id, stored.child_id);
        }
    }
    if graph.would_cycle(edge.parent_id, edge.child_id) {
        return Err(CatalogError::InvalidComposition {
            reason: format!("item {} already contains item {}", edge.child_id, edge.parent_id),
        });
    }
    Ok(())
}

/// Every item id, each child before its parents.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidComposition`] if the stored edges are cyclic.
pub fn children_first_order<R: CatalogRepository + ?Sized>(repo: &R) -> Result<Vec<i64>, CatalogError> {
    item_graph(repo).children_first()
}

/// Child components of an item as seen by its templates.
///
/// `attributes_of` returns the visible attributes of a variant.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when an edge points to a missing item or
/// detail type.
pub fn collect_children<R, F>(repo: &R, edges: &[ItemChild], mut attributes_of: F) -> Result<Vec<ChildComponent>, CatalogError>
where
    R: CatalogRepository + ?Sized,
    F: FnMut(i64) -> Arc<Vec<Attribute>>,
{
    let mut children = Vec::with_capacity(edges.len());
    for edge in edges {
        let item = repo.item(edge.child_id).ok_or(CatalogError::NotFound {
            kind: "item",
            id: edge.child_id,
        })?;
        let detail_type = repo.detail_type(item.detail_type_id).ok_or(CatalogError::NotFound {
            kind: "detail type",
            id: item.detail_type_id,
        })?;
        let attributes = item.variant_id.map(&mut attributes_of).map(|a| a.as_ref().clone()).unwrap_or_default();

        children.push(ChildComponent {
            category: detail_type.category,
            designation: detail_type.designation.clone(),
            position: edge.position,
            count: edge.count,
            inner_id: item.inner_id,
            parameters: item.parameters.clone(),
            attributes,
        });
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Item, Variant};
    use crate::snapshot::CatalogSnapshot;
    use crate::test_utils::fixtures::detail_type;

    fn composition(id: i64, parent: i64, child: i64) -> BaseComposition {
        BaseComposition {
            id,
            base_parent: parent,
            base_parent_variant: None,
            base_child: child,
            base_child_variant: None,
            position: 1,
            count: 1,
        }
    }

    fn snapshot() -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.add_detail_type(detail_type(1, Category::Product, "FHD"));
        snapshot.add_detail_type(detail_type(2, Category::AssemblyUnit, "SSB"));
        snapshot.add_detail_type(detail_type(3, Category::Detail, "HDH"));
        snapshot.add_variant(Variant::new(10, 1, "FHD-1"));
        snapshot.add_variant(Variant::new(30, 3, "HDH-1"));
        snapshot.add_base_composition(composition(1, 1, 2));
        snapshot.add_base_composition(composition(2, 2, 3));
        snapshot
    }

    #[test]
    fn test_base_composition_rejects_cycles() {
        let snapshot = snapshot();
        assert!(validate_base_composition(&snapshot, &composition(3, 1, 3)).is_ok());
        assert!(validate_base_composition(&snapshot, &composition(3, 3, 3)).is_err());

        let err = validate_base_composition(&snapshot, &composition(3, 3, 1)).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidComposition { .. }));

        // Rule 2 is replaced, so its reverse is allowed.
        assert!(validate_base_composition(&snapshot, &composition(2, 3, 2)).is_ok());
    }

    #[test]
    fn test_base_composition_checks_pinned_variants() {
        let snapshot = snapshot();
        let mut rule = composition(3, 1, 3);
        rule.base_parent_variant = Some(30);
        assert!(validate_base_composition(&snapshot, &rule).is_err());

        rule.base_parent_variant = Some(10);
        rule.base_child_variant = Some(30);
        assert!(validate_base_composition(&snapshot, &rule).is_ok());

        rule.base_child_variant = Some(99);
        assert!(matches!(
            validate_base_composition(&snapshot, &rule),
            Err(CatalogError::NotFound { kind: "variant", id: 99 })
        ));
    }

    #[test]
    fn test_item_edges_and_order() {
        let mut snapshot = snapshot();
        for (id, detail_type_id) in [(100, 1), (200, 2), (300, 3)] {
            snapshot.add_item(Item::new(id, detail_type_id, None));
        }
        let edge = |id, parent_id, child_id| ItemChild {
            id,
            parent_id,
            child_id,
            position: 1,
            count: 1,
        };
        snapshot.add_item_child(edge(1, 100, 200));
        snapshot.add_item_child(edge(2, 200, 300));

        assert!(validate_item_child(&snapshot, &edge(3, 300, 100)).is_err());
        assert!(validate_item_child(&snapshot, &edge(3, 300, 300)).is_err());
        assert!(validate_item_child(&snapshot, &edge(3, 100, 300)).is_ok());

        assert_eq!(children_first_order(&snapshot).unwrap(), vec![300, 200, 100]);
    }

    #[test]
    fn test_graph_paths() {
        let graph = CompositionGraph::from_edges([(1, 2), (2, 3)]);
        assert!(graph.contains_path(1, 3));
        assert!(!graph.contains_path(3, 1));
        assert!(graph.would_cycle(3, 1));
        assert!(graph.contains_path(7, 7));

        let cyclic = CompositionGraph::from_edges([(1, 2), (2, 1)]);
        assert!(cyclic.children_first().is_err());
    }
}

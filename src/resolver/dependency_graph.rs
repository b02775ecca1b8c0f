//! Attribute dependency graph and topological ordering.
//!
//! Calculated attributes must be evaluated after every attribute their
//! formula mentions. This module builds a graph over the attributes of one
//! variant (an arena of records plus index edges `dependency -> dependent`),
//! finds the attributes caught in cycles and produces a stable evaluation
//! order for the rest.
//!
//! Ordering is Kahn's algorithm with a min-heap on input position: among the
//! attributes that are ready, the one listed first goes first. Unrelated
//! attributes therefore keep their input order and sorting an already sorted
//! list returns it unchanged.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use thiserror::Error;

use super::dependencies::extract_dependencies;
use crate::models::Attribute;

/// A record that may depend on other records through a formula.
pub trait Dependent {
    fn name(&self) -> &str;

    fn formula(&self) -> Option<&str>;
}

impl Dependent for Attribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn formula(&self) -> Option<&str> {
        Attribute::formula(self)
    }
}

/// Formulas reference each other in a loop.
///
/// `fields` holds every attribute that lies on some cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cyclic dependency between attributes: {}", .fields.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct CyclicDependencyError {
    pub fields: BTreeSet<String>,
}

impl CyclicDependencyError {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Dependency graph over a slice of records.
///
/// Nodes carry the index of their record. Dependencies on names that are not
/// in the slice (child references, selection-time variables) are ignored.
pub struct AttributeGraph<'a, T> {
    records: &'a [T],
    graph: DiGraph<usize, ()>,
    /// Local dependencies of each record, by record index
    dependencies: Vec<BTreeSet<String>>,
}

impl<'a, T: Dependent> AttributeGraph<'a, T> {
    /// Build the graph. When names repeat, the first record wins.
    #[must_use]
    pub fn build(records: &'a [T]) -> Self {
        let mut graph = DiGraph::with_capacity(records.len(), records.len());
        let nodes: Vec<NodeIndex> = (0..records.len()).map(|i| graph.add_node(i)).collect();

        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            by_name.entry(record.name()).or_insert(index);
        }

        let mut dependencies = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let local: BTreeSet<String> = record
                .formula()
                .map(extract_dependencies)
                .unwrap_or_default()
                .into_iter()
                .filter(|name| by_name.contains_key(name.as_str()))
                .collect();

            for name in &local {
                let dependency = by_name[name.as_str()];
                if !graph.contains_edge(nodes[dependency], nodes[index]) {
                    graph.add_edge(nodes[dependency], nodes[index], ());
                }
            }
            dependencies.push(local);
        }

        tracing::trace!("Built attribute graph: {} nodes, {} edges", graph.node_count(), graph.edge_count());

        Self {
            records,
            graph,
            dependencies,
        }
    }

    /// Local dependencies of the record at `index`.
    #[must_use]
    pub fn dependencies_of(&self, index: usize) -> &BTreeSet<String> {
        &self.dependencies[index]
    }

    /// Names of every record that lies on a cycle.
    ///
    /// A record is on a cycle when its strongly connected component has more
    /// than one member or when its formula references itself.
    #[must_use]
    pub fn cycle_members(&self) -> BTreeSet<String> {
        let mut members = BTreeSet::new();
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component.first().is_some_and(|&n| self.graph.contains_edge(n, n));
            if cyclic {
                for node in component {
                    members.insert(self.records[self.graph[node]].name().to_string());
                }
            }
        }
        members
    }

    /// Evaluation order of the records whose names are not in `excluded`.
    ///
    /// Edges from excluded records are ignored, so excluding every cycle
    /// member always yields a complete order of the remaining records.
    #[must_use]
    pub fn order_excluding(&self, excluded: &BTreeSet<String>) -> Vec<usize> {
        let included: Vec<bool> =
            self.records.iter().map(|r| !excluded.contains(r.name())).collect();

        let mut in_degree = vec![0usize; self.records.len()];
        for edge in self.graph.raw_edges() {
            let (from, to) = (self.graph[edge.source()], self.graph[edge.target()]);
            if included[from] && included[to] && from != to {
                in_degree[to] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..self.records.len())
            .filter(|&i| included[i] && in_degree[i] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.records.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for neighbor in self.graph.neighbors(NodeIndex::new(index)) {
                let next = self.graph[neighbor];
                if !included[next] || next == index {
                    continue;
                }
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        order
    }

    /// Full evaluation order.
    ///
    /// # Errors
    ///
    /// Returns [`CyclicDependencyError`] naming every record on a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, CyclicDependencyError> {
        let cycles = self.cycle_members();
        if !cycles.is_empty() {
            return Err(CyclicDependencyError {
                fields: cycles,
            });
        }
        Ok(self.order_excluding(&BTreeSet::new()))
    }
}

/// Sort records so that every record comes after its local dependencies.
///
/// # Errors
///
/// Fails with the complete set of cycle members if the dependencies are not
/// acyclic; no partial order is returned.
pub fn topological_sort<T: Dependent + Clone>(records: &[T]) -> Result<Vec<T>, CyclicDependencyError> {
    let graph = AttributeGraph::build(records);
    let order = graph.topological_order()?;
    Ok(order.into_iter().map(|i| records[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec(&'static str, Option<&'static str>);

    impl Dependent for Rec {
        fn name(&self) -> &str {
            self.0
        }

        fn formula(&self) -> Option<&str> {
            self.1
        }
    }

    fn names(records: &[Rec]) -> Vec<&'static str> {
        records.iter().map(|r| r.0).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let records = vec![
            Rec("E", Some("d + d + d + <assembly_unit_SSB>.Sn")),
            Rec("d", Some("a + 1")),
            Rec("a", None),
        ];
        assert_eq!(names(&topological_sort(&records).unwrap()), ["a", "d", "E"]);
    }

    #[test]
    fn test_ready_records_keep_input_order() {
        let records = vec![
            Rec("E", Some("d + <assembly_unit_SSB>.x")),
            Rec("d", Some("a + b|to_int")),
            Rec("b", Some("c + 1")),
            Rec("a", None),
            Rec("c", None),
        ];
        assert_eq!(names(&topological_sort(&records).unwrap()), ["a", "c", "b", "d", "E"]);
    }

    #[test]
    fn test_field_access_orders_the_root_first() {
        let records = vec![Rec("x", Some("OD.size * 2")), Rec("OD", Some("3"))];
        assert_eq!(names(&topological_sort(&records).unwrap()), ["OD", "x"]);
    }

    #[test]
    fn test_cycle_reports_all_members() {
        let records = vec![Rec("A", Some("B + 1")), Rec("B", Some("C + 1")), Rec("C", Some("A + 1"))];
        let err = topological_sort(&records).unwrap_err();
        assert_eq!(err.fields, BTreeSet::from(["A".to_string(), "B".to_string(), "C".to_string()]));
        assert_eq!(err.to_string(), "Cyclic dependency between attributes: A, B, C");
    }

    #[test]
    fn test_cycle_with_child_references() {
        let records = vec![
            Rec("a", Some("b + <detail_HDH>.m")),
            Rec("b", Some("c * <assembly_unit_X>.2.k")),
            Rec("c", Some("a - 1")),
            Rec("x", None),
        ];
        let err = topological_sort(&records).unwrap_err();
        assert_eq!(err.fields.iter().map(String::as_str).collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let records = vec![Rec("a", Some("a + 1")), Rec("b", None)];
        let graph = AttributeGraph::build(&records);
        assert_eq!(graph.cycle_members(), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_order_excluding_cycle_members() {
        let records = vec![
            Rec("a", Some("b")),
            Rec("b", Some("a")),
            Rec("c", Some("d * 2")),
            Rec("d", None),
            Rec("e", Some("a + d")),
        ];
        let graph = AttributeGraph::build(&records);
        let cycles = graph.cycle_members();
        let order: Vec<_> = graph.order_excluding(&cycles).into_iter().map(|i| records[i].0).collect();
        assert_eq!(order, ["d", "c", "e"]);
        assert!(graph.dependencies_of(4).contains("a"));
    }

    #[test]
    fn test_resorting_is_identity() {
        let records = vec![
            Rec("E", Some("d + 5")),
            Rec("d", Some("a * 2")),
            Rec("a", None),
            Rec("z", None),
        ];
        let once = topological_sort(&records).unwrap();
        let twice = topological_sort(&once).unwrap();
        assert_eq!(once, twice);
    }
}

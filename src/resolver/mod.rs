//! Attribute dependency resolution.
//!
//! Calculated attributes are formulas over other attributes of the same item.
//! Resolution happens in three steps:
//!
//! 1. [`extract_dependencies`] finds the bare names a formula mentions.
//!    Bracket references to child components are not local dependencies.
//! 2. [`AttributeGraph`] orders the attributes so that every formula runs
//!    after its inputs, and reports the attributes caught in cycles.
//! 3. [`AttributeResolver`] evaluates formulas through a
//!    [`FormulaEvaluator`], converts values to their declared types and
//!    records per-attribute failures instead of aborting.
//!
//! # Example
//!
//! ```
//! use catalog_calc::models::{Attribute, AttributeType};
//! use catalog_calc::resolver::topological_sort;
//!
//! let mut e = Attribute::new(1, "E", AttributeType::Integer);
//! e.calculated_value = Some("d + 5".into());
//! let mut d = Attribute::new(2, "d", AttributeType::Integer);
//! d.calculated_value = Some("a * 2".into());
//! let a = Attribute::new(3, "a", AttributeType::Integer);
//!
//! let sorted = topological_sort(&[e, d, a]).unwrap();
//! let names: Vec<_> = sorted.iter().map(|a| a.name.as_str()).collect();
//! assert_eq!(names, ["a", "d", "E"]);
//! ```

pub mod dependencies;
pub mod dependency_graph;
pub mod value_resolver;

pub use dependencies::extract_dependencies;
pub use dependency_graph::{AttributeGraph, CyclicDependencyError, Dependent, topological_sort};
pub use value_resolver::{AttributeResolver, FormulaEvaluator, ResolvedParameters, ResolverOptions};

//! Resolution of attribute values for one item.
//!
//! [`AttributeResolver::resolve`] walks the visible attributes of a variant in
//! dependency order and produces the final `parameters` map together with a
//! per-attribute error map. A failing attribute never stops the batch: it is
//! stored as `null`, gets an error entry, and every calculated attribute that
//! depends on it fails the same way.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::dependencies::extract_dependencies;
use super::dependency_graph::{AttributeGraph, CyclicDependencyError};
use crate::config::EngineConfig;
use crate::constants::{DEFAULT_DEFERRED_VARIABLES, DEFAULT_NUMBER_PRECISION};
use crate::core::CatalogError;
use crate::models::Attribute;
use crate::providers::CatalogProvider;
use crate::templating::TemplateError;

/// Evaluates an attribute formula against the values resolved so far.
pub trait FormulaEvaluator {
    /// Render `formula` and return the resulting text.
    ///
    /// # Errors
    ///
    /// Any rendering failure, including undefined names.
    fn evaluate(&self, formula: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError>;

    /// Whether the evaluator supplies `name` itself.
    ///
    /// Deferred variables are only rejected when nobody provides them.
    fn provides(&self, _name: &str) -> bool {
        false
    }
}

/// Knobs of the resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Decimal places kept for `number` values
    pub precision: u32,
    /// Names only known during selection; formulas using them are skipped
    pub deferred_variables: BTreeSet<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            precision: DEFAULT_NUMBER_PRECISION,
            deferred_variables: DEFAULT_DEFERRED_VARIABLES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl From<&EngineConfig> for ResolverOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            precision: config.number_precision,
            deferred_variables: config.deferred_variables.iter().cloned().collect(),
        }
    }
}

/// Output of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    pub parameters: Map<String, Value>,
    /// Attribute name to error message, for every value stored as `null` on failure
    pub errors: BTreeMap<String, String>,
}

impl ResolvedParameters {
    /// Errors in the shape stored on an item.
    #[must_use]
    pub fn errors_or_none(&self) -> Option<BTreeMap<String, String>> {
        (!self.errors.is_empty()).then(|| self.errors.clone())
    }
}

/// Computes parameter values from supplied input and formulas.
pub struct AttributeResolver<'a> {
    evaluator: &'a dyn FormulaEvaluator,
    catalogs: &'a dyn CatalogProvider,
    options: ResolverOptions,
}

impl<'a> AttributeResolver<'a> {
    #[must_use]
    pub fn new(
        evaluator: &'a dyn FormulaEvaluator,
        catalogs: &'a dyn CatalogProvider,
        options: ResolverOptions,
    ) -> Self {
        Self {
            evaluator,
            catalogs,
            options,
        }
    }

    /// Resolve every attribute.
    ///
    /// - Cycle members become `null` with the cycle message; the rest still
    ///   resolve in dependency order.
    /// - `locked` names keep their supplied value.
    /// - Supplied keys without an attribute pass through unchanged.
    #[must_use]
    pub fn resolve(
        &self,
        attributes: &[Attribute],
        supplied: &Map<String, Value>,
        locked: &BTreeSet<String>,
    ) -> ResolvedParameters {
        let mut parameters = supplied.clone();
        let mut errors = BTreeMap::new();
        let mut failed: HashSet<String> = HashSet::new();

        let graph = AttributeGraph::build(attributes);
        let cycles = graph.cycle_members();
        if !cycles.is_empty() {
            let message = CatalogError::from(CyclicDependencyError {
                fields: cycles.clone(),
            })
            .to_string();
            tracing::warn!("{message}");
            for name in cycles.iter().filter(|name| !locked.contains(*name)) {
                parameters.insert(name.clone(), Value::Null);
                errors.insert(name.clone(), message.clone());
                failed.insert(name.clone());
            }
        }

        let mut seen = HashSet::new();
        for index in graph.order_excluding(&cycles) {
            let attribute = &attributes[index];
            if !seen.insert(attribute.name.as_str()) || locked.contains(&attribute.name) {
                continue;
            }

            let outcome = match attribute.formula() {
                Some(formula) => {
                    let failed_dependencies: Vec<&str> = graph
                        .dependencies_of(index)
                        .iter()
                        .filter(|d| failed.contains(*d))
                        .map(String::as_str)
                        .collect();
                    if failed_dependencies.is_empty() {
                        self.calculate(attribute, formula, &parameters)
                    } else {
                        Err(format!(
                            "Depends on unresolved attribute(s): {}",
                            failed_dependencies.join(", ")
                        ))
                    }
                }
                None => self.accept_input(attribute, parameters.get(&attribute.name)),
            };

            match outcome {
                Ok(value) => {
                    parameters.insert(attribute.name.clone(), value);
                }
                Err(message) => {
                    tracing::debug!("Attribute '{}' unresolved: {message}", attribute.name);
                    parameters.insert(attribute.name.clone(), Value::Null);
                    errors.insert(attribute.name.clone(), message);
                    failed.insert(attribute.name.clone());
                }
            }
        }

        ResolvedParameters {
            parameters,
            errors,
        }
    }

    fn calculate(
        &self,
        attribute: &Attribute,
        formula: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, String> {
        let deferred: Vec<String> = extract_dependencies(formula)
            .into_iter()
            .filter(|name| self.options.deferred_variables.contains(name) && !self.evaluator.provides(name))
            .collect();
        if !deferred.is_empty() {
            return Err(format!(
                "Uses {} which is only known during selection; the value is calculated there",
                deferred.join(", ")
            ));
        }

        let rendered = self.evaluator.evaluate(formula, parameters).map_err(|e| e.to_string())?;
        attribute
            .convert(&Value::String(rendered.trim().to_string()), self.options.precision, self.catalogs)
            .map_err(|e| e.to_string())
    }

    fn accept_input(&self, attribute: &Attribute, raw: Option<&Value>) -> Result<Value, String> {
        let raw = match raw {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(value) => Some(value),
        };

        let Some(raw) = raw else {
            return match attribute.converted_default(self.options.precision, self.catalogs) {
                Some(converted) => converted.map_err(|e| e.to_string()),
                None if attribute.is_required => Err("This field is required".to_string()),
                None => Ok(Value::Null),
            };
        };

        if !attribute.accepts_choice(raw) {
            return Err(format!(
                "Value {} is not one of the allowed choices",
                crate::models::attribute::plain_text(raw)
            ));
        }
        attribute.convert(raw, self.options.precision, self.catalogs).map_err(|e| e.to_string())
    }
}

//! Marking and formula compilation for one item.

use serde_json::{Map, Value};

use super::context::{ChildComponent, ContextBuilder, UnresolvedEntries, unresolved_for};
use super::error::TemplateError;
use super::preprocess::{Preprocessed, preprocess_template};
use super::renderer::MarkingRenderer;
use crate::models::Attribute;
use crate::providers::CatalogProvider;
use crate::resolver::FormulaEvaluator;

/// Wrap a bare expression in `{{ }}`.
///
/// Text that already starts with `{{` or ends with `}}` is left alone, so
/// formulas may also be written as full templates.
#[must_use]
pub fn auto_wrap(formula: &str) -> String {
    let trimmed = formula.trim();
    if trimmed.starts_with("{{") || trimmed.ends_with("}}") {
        formula.to_string()
    } else {
        format!("{{{{ {trimmed} }}}}")
    }
}

/// Outcome of marking generation. Failures are captured, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMarking {
    pub marking: String,
    pub errors: Option<Vec<String>>,
}

/// Renders templates against the context of one item.
///
/// The compiler is bound to the item's visible attributes (for catalog
/// resolution), its child components and its own identity. Parameter values
/// are passed per call so the same compiler can evaluate formulas while the
/// parameters are still being resolved.
pub struct MarkingCompiler<'a> {
    renderer: &'a MarkingRenderer,
    builder: ContextBuilder<'a>,
    attributes: &'a [Attribute],
    children: &'a [ChildComponent],
    inner_id: Option<i64>,
    weight: Option<f64>,
    extra_context: Map<String, Value>,
}

impl<'a> MarkingCompiler<'a> {
    #[must_use]
    pub fn new(
        renderer: &'a MarkingRenderer,
        catalogs: &'a dyn CatalogProvider,
        attributes: &'a [Attribute],
    ) -> Self {
        Self {
            renderer,
            builder: ContextBuilder::new(catalogs),
            attributes,
            children: &[],
            inner_id: None,
            weight: None,
            extra_context: Map::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: &'a [ChildComponent]) -> Self {
        self.children = children;
        self
    }

    /// Identity values exposed as `inner_id` and `weight`.
    #[must_use]
    pub fn with_identity(mut self, inner_id: Option<i64>, weight: Option<f64>) -> Self {
        self.inner_id = inner_id;
        self.weight = weight;
        self
    }

    /// Values applied on top of everything else, e.g. selection-time variables.
    #[must_use]
    pub fn with_extra_context(mut self, extra: Map<String, Value>) -> Self {
        self.extra_context = extra;
        self
    }

    /// Whether a name is supplied through the extra context.
    #[must_use]
    pub fn has_extra(&self, name: &str) -> bool {
        self.extra_context.contains_key(name)
    }

    /// Full rendering context for the given parameter values.
    ///
    /// Catalog values without a record are left out of the context and
    /// returned alongside it, so a template only fails if it reads one.
    #[must_use]
    pub fn build_context(&self, parameters: &Map<String, Value>) -> (Map<String, Value>, UnresolvedEntries) {
        let mut context = Map::new();
        let mut unresolved = UnresolvedEntries::new();
        context.insert("inner_id".to_string(), self.inner_id.map_or(Value::Null, Value::from));
        context.insert(
            "weight".to_string(),
            self.weight
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
        );

        context.extend(self.builder.resolve_parameters(parameters, self.attributes, &mut unresolved));
        self.builder.bind_children(&mut context, self.children, &mut unresolved);
        for key in self.extra_context.keys() {
            unresolved.remove(key);
        }
        context.extend(self.extra_context.iter().map(|(k, v)| (k.clone(), v.clone())));
        (context, unresolved)
    }

    /// Rewrite references and render `template` strictly.
    ///
    /// # Errors
    ///
    /// Any rendering failure. Undefined aliases that came from a bracket
    /// reference are reported as [`TemplateError::UnresolvedReference`] with
    /// the designation as written; reads of a catalog value without a record
    /// as [`TemplateError::CatalogEntryMissing`].
    pub fn compile(&self, template: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError> {
        let preprocessed = preprocess_template(template);
        let (context, unresolved) = self.build_context(parameters);

        self.renderer
            .render(&preprocessed.text, &context)
            .map_err(|e| Self::attribute_reference_error(e, &preprocessed, &context, &unresolved))
    }

    /// Compile a formula, wrapping bare expressions first.
    ///
    /// # Errors
    ///
    /// Same as [`MarkingCompiler::compile`].
    pub fn compile_formula(&self, formula: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError> {
        self.compile(&auto_wrap(formula), parameters)
    }

    /// Compile the marking template, capturing failures.
    ///
    /// On failure the marking is `sentinel` and the error text is kept.
    #[must_use]
    pub fn generate_marking(
        &self,
        template: &str,
        parameters: &Map<String, Value>,
        sentinel: &str,
    ) -> CompiledMarking {
        match self.compile(template, parameters) {
            Ok(marking) => CompiledMarking {
                marking,
                errors: None,
            },
            Err(e) => {
                tracing::warn!("Marking compilation failed: {e}");
                CompiledMarking {
                    marking: sentinel.to_string(),
                    errors: Some(vec![e.to_string()]),
                }
            }
        }
    }

    fn attribute_reference_error(
        error: TemplateError,
        preprocessed: &Preprocessed,
        context: &Map<String, Value>,
        unresolved: &UnresolvedEntries,
    ) -> TemplateError {
        if let TemplateError::VariableNotFound {
            variable,
            ..
        } = &error
        {
            if let Some(missing) = unresolved_for(unresolved, variable) {
                return missing.clone();
            }
            let root = variable.split('.').next().unwrap_or(variable);
            if let Some(designation) = preprocessed.designation_for(root) {
                if !context.contains_key(root) {
                    return TemplateError::UnresolvedReference {
                        designation: designation.to_string(),
                        alias: root.to_string(),
                    };
                }
            }
        }
        error
    }
}

impl FormulaEvaluator for MarkingCompiler<'_> {
    fn evaluate(&self, formula: &str, parameters: &Map<String, Value>) -> Result<String, TemplateError> {
        self.compile_formula(formula, parameters)
    }

    fn provides(&self, name: &str) -> bool {
        self.has_extra(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeType, BuiltinCatalog, CatalogRef, Category};
    use crate::test_utils::StaticCatalogs;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_auto_wrap() {
        assert_eq!(auto_wrap("a + 1"), "{{ a + 1 }}");
        assert_eq!(auto_wrap("{{ a }} mm"), "{{ a }} mm");
        assert_eq!(auto_wrap("x {{ a }}"), "x {{ a }}");
    }

    #[test]
    fn test_alias_in_extra_context_renders() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &[])
            .with_extra_context(params(json!({"normalized_hdh_12": {"e": 2}})));

        let out = compiler.compile("{{ 5 * <HDH-12>.e }}", &Map::new()).unwrap();
        assert_eq!(out, "10");
    }

    #[test]
    fn test_marking_uses_parameters_and_identity() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let attributes = vec![
            Attribute::new(1, "s", AttributeType::Integer),
            Attribute::new(2, "d", AttributeType::Integer),
        ];
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &attributes).with_identity(Some(100_001), None);

        let marking =
            compiler.generate_marking("FHD {{ s }}x{{ d }} #{{ inner_id }}", &params(json!({"s": 16, "d": 12})), "ERROR");
        assert_eq!(marking.marking, "FHD 16x12 #100001");
        assert_eq!(marking.errors, None);
    }

    #[test]
    fn test_undefined_variable_yields_sentinel() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &[]);

        let marking = compiler.generate_marking("FHD {{ missing }}", &Map::new(), "ERROR");
        assert_eq!(marking.marking, "ERROR");
        let errors = marking.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing"));
    }

    #[test]
    fn test_zfill_on_text_yields_sentinel() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let attributes = vec![Attribute::new(1, "s", AttributeType::String)];
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &attributes);

        let marking = compiler.generate_marking("FHD {{ s|zfill(width=4) }}", &params(json!({"s": "abc"})), "ERROR");
        assert_eq!(marking.marking, "ERROR");
        assert!(marking.errors.unwrap()[0].contains("zfill"));

        let marking = compiler.generate_marking("FHD {{ s|zfill(width=4) }}", &params(json!({"s": "12"})), "ERROR");
        assert_eq!(marking.marking, "FHD 0012");
    }

    #[test]
    fn test_missing_child_reports_designation() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &[]);

        let err = compiler.compile_formula("<detail_HDH (тип 1)>.m * 2", &Map::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnresolvedReference {
                designation: "detail_HDH (тип 1)".into(),
                alias: "normalized_detail_hdh_tip_1".into(),
            }
        );
    }

    #[test]
    fn test_missing_catalog_entry_only_fails_its_readers() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let mut lg = Attribute::new(1, "lg", AttributeType::Catalog);
        lg.catalog = Some(CatalogRef::Builtin(BuiltinCatalog::LoadGroup));
        let attributes = vec![lg, Attribute::new(2, "d", AttributeType::Integer)];
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &attributes);
        let parameters = params(json!({"lg": 999, "d": 4}));

        assert_eq!(compiler.compile_formula("d * 2", &parameters).unwrap(), "8");
        let err = compiler.compile_formula("lg.lgv + d", &parameters).unwrap_err();
        assert_eq!(
            err,
            TemplateError::CatalogEntryMissing {
                attribute: "lg".into(),
                catalog: "LoadGroup".into(),
                id: "999".into(),
            }
        );
    }

    #[test]
    fn test_child_reference_through_composition() {
        let renderer = MarkingRenderer::default();
        let catalogs = StaticCatalogs::default();
        let children = vec![ChildComponent {
            category: Category::Detail,
            designation: "ZZF".into(),
            position: 1,
            count: 2,
            inner_id: Some(7),
            parameters: params(json!({"B": 30})),
            attributes: vec![Attribute::new(9, "B", AttributeType::Integer)],
        }];
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &[]).with_children(&children);

        assert_eq!(compiler.compile_formula("<detail_ZZF>.B - 30", &Map::new()).unwrap(), "30");
        assert_eq!(compiler.compile_formula("<detail_ZZF>.1.inner_id", &Map::new()).unwrap(), "7");
    }
}

//! Template rendering engine with Tera.
//!
//! [`MarkingRenderer`] wraps a Tera instance with the catalog filters
//! registered and strict variable lookup (Tera fails on undefined names).
//! Parsed templates are kept by content hash so a marking template shared by
//! thousands of items is parsed once.

use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use strsim::levenshtein;
use tera::{Context as TeraContext, Tera};

use super::error::TemplateError;
use super::filters;
use crate::config::CacheConfig;
use crate::constants::DEFAULT_MAX_CACHED_TEMPLATES;

/// Maximum allowed Levenshtein distance as a percentage of target length for suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

struct RendererState {
    tera: Tera,
    /// Names of templates currently registered on `tera`
    compiled: HashSet<String>,
    hits: usize,
    misses: usize,
}

impl RendererState {
    fn fresh() -> Self {
        let mut tera = Tera::default();
        filters::register_filters(&mut tera);
        Self {
            tera,
            compiled: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }
}

/// Strict Tera renderer with a bounded compiled-template cache.
pub struct MarkingRenderer {
    state: Mutex<RendererState>,
    /// Whether parsed templates are kept between renders
    caching: bool,
    /// Number of parsed templates kept before the cache is reset
    max_templates: usize,
}

impl Default for MarkingRenderer {
    fn default() -> Self {
        Self::new(true, DEFAULT_MAX_CACHED_TEMPLATES)
    }
}

impl std::fmt::Debug for MarkingRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkingRenderer")
            .field("caching", &self.caching)
            .field("max_templates", &self.max_templates)
            .finish_non_exhaustive()
    }
}

impl MarkingRenderer {
    /// Create a renderer.
    ///
    /// With `caching` disabled every call parses its template again.
    #[must_use]
    pub fn new(caching: bool, max_templates: usize) -> Self {
        Self {
            state: Mutex::new(RendererState::fresh()),
            caching,
            max_templates: max_templates.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, config.max_templates)
    }

    fn lock(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Render `template` against `context`.
    ///
    /// The template is expected to be preprocessed already (bracket
    /// references replaced by aliases).
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::SyntaxError`] when the template cannot be
    /// parsed, [`TemplateError::VariableNotFound`] for undefined names and
    /// [`TemplateError::RenderFailed`] for everything else Tera rejects.
    pub fn render(&self, template: &str, context: &Map<String, Value>) -> Result<String, TemplateError> {
        let tera_context = TeraContext::from_value(Value::Object(context.clone())).map_err(|e| {
            TemplateError::RenderFailed {
                message: format!("Invalid template context: {e}"),
            }
        })?;

        let name = template_name(template);
        let mut state = self.lock();

        if state.compiled.contains(&name) {
            state.hits += 1;
        } else {
            state.misses += 1;
            if state.compiled.len() >= self.max_templates {
                tracing::debug!("Template cache full ({} entries), resetting", state.compiled.len());
                let (hits, misses) = (state.hits, state.misses);
                *state = RendererState::fresh();
                state.hits = hits;
                state.misses = misses;
            }
            state
                .tera
                .add_raw_template(&name, template)
                .map_err(|e| Self::parse_tera_error(&e, &name, context, true))?;
            state.compiled.insert(name.clone());
        }

        let result = state.tera.render(&name, &tera_context);

        if !self.caching {
            *state = RendererState {
                hits: state.hits,
                misses: state.misses,
                ..RendererState::fresh()
            };
        }

        result.map_err(|e| Self::parse_tera_error(&e, &name, context, false))
    }

    /// Cache statistics as `(hits, misses)`.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        let state = self.lock();
        (state.hits, state.misses)
    }

    /// Calculate hit rate as a percentage
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self.stats();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Drop every parsed template and reset statistics.
    pub fn clear(&self) {
        *self.lock() = RendererState::fresh();
    }

    /// Parse a Tera error into a structured TemplateError
    fn parse_tera_error(
        error: &tera::Error,
        template_name: &str,
        context: &Map<String, Value>,
        parsing: bool,
    ) -> TemplateError {
        let message = Self::format_tera_error(error, template_name);

        if parsing {
            return TemplateError::SyntaxError {
                line: Self::extract_line_from_tera_error(&message),
                message,
            };
        }

        if let Some(variable) = Self::extract_variable_name(&message) {
            let available = Self::extract_available_variables(context);
            let suggestions = Self::find_similar_variables(&variable, &available);
            return TemplateError::VariableNotFound {
                variable,
                suggestions,
            };
        }

        TemplateError::RenderFailed {
            message,
        }
    }

    /// Extract variable name from "Variable `foo` not found" message
    fn extract_variable_name(error_msg: &str) -> Option<String> {
        let re = Regex::new(r"Variable `([^`]+)` not found").ok()?;
        re.captures(error_msg).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string())
    }

    /// Top-level names plus one level of object fields (`alias.field`).
    fn extract_available_variables(context: &Map<String, Value>) -> Vec<String> {
        let mut vars = Vec::new();
        for (key, value) in context {
            vars.push(key.clone());
            if let Value::Object(fields) = value {
                for field in fields.keys() {
                    vars.push(format!("{key}.{field}"));
                }
            }
        }
        vars
    }

    /// Find similar variable names using Levenshtein distance
    fn find_similar_variables(target: &str, available: &[String]) -> Vec<String> {
        let mut scored: Vec<_> =
            available.iter().map(|var| (var.clone(), levenshtein(target, var))).collect();

        scored.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));

        scored
            .into_iter()
            .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(var, _)| var)
            .collect()
    }

    /// Tera parse errors point at the failing position as ` --> line:column`.
    fn extract_line_from_tera_error(message: &str) -> Option<usize> {
        let re = Regex::new(r"--> (\d+):(\d+)").ok()?;
        re.captures(message).and_then(|caps| caps.get(1)).and_then(|m| m.as_str().parse().ok())
    }

    /// Flatten a Tera error chain into one message.
    ///
    /// Tera wraps the root cause in "Failed to render '<name>'" layers; those
    /// are dropped and the internal template name is replaced by `template`.
    #[must_use]
    pub fn format_tera_error(error: &tera::Error, template_name: &str) -> String {
        use std::error::Error;

        let quoted = format!("'{template_name}'");
        let mut messages = Vec::new();

        let mut current: Option<&dyn Error> = Some(error);
        while let Some(err) = current {
            let cleaned = err
                .to_string()
                .replace(&format!("while rendering {quoted}"), "")
                .replace(&format!("Failed to render {quoted}"), "")
                .replace(&format!("Failed to parse {quoted}"), "")
                .replace(&quoted, "template")
                .replace(template_name, "template")
                .trim()
                .to_string();

            if !cleaned.is_empty() && !messages.contains(&cleaned) {
                messages.push(cleaned);
            }
            current = err.source();
        }

        if messages.is_empty() {
            "Template rendering failed".to_string()
        } else {
            messages.join(": ")
        }
    }
}

fn template_name(template: &str) -> String {
    let digest = Sha256::digest(template.as_bytes());
    format!("marking-{}", hex::encode(digest))
}

//! Structured template errors.
//!
//! Tera reports failures as nested messages. The renderer turns them into a
//! [`TemplateError`] so callers can tell an unknown variable from a missing
//! child component or a syntax problem, and so the message stored in
//! `marking_errors` names things the way the template author wrote them.

use std::fmt;

use crate::core::CatalogError;

/// Template rendering failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A plain variable is not in the context
    VariableNotFound {
        variable: String,
        /// Close matches among the available names
        suggestions: Vec<String>,
    },

    /// A bracket reference points at a component the item does not contain
    UnresolvedReference {
        /// Designation as written between `<` and `>`
        designation: String,
        alias: String,
    },

    /// A catalog attribute holds an id missing from its catalog
    CatalogEntryMissing {
        attribute: String,
        catalog: String,
        id: String,
    },

    /// The template could not be parsed
    SyntaxError {
        message: String,
        line: Option<usize>,
    },

    /// Rendering failed for another reason (filter error, bad operand, ...)
    RenderFailed {
        message: String,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::VariableNotFound {
                variable,
                ..
            } => write!(f, "Variable `{variable}` not found"),
            TemplateError::UnresolvedReference {
                designation,
                ..
            } => write!(f, "Reference <{designation}> does not match any component"),
            TemplateError::CatalogEntryMissing {
                attribute,
                catalog,
                id,
            } => write!(f, "Attribute `{attribute}` refers to missing entry {id} of catalog {catalog}"),
            TemplateError::SyntaxError {
                message,
                line,
            } => match line {
                Some(line) => write!(f, "Template syntax error at line {line}: {message}"),
                None => write!(f, "Template syntax error: {message}"),
            },
            TemplateError::RenderFailed {
                message,
            } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TemplateError {}

impl TemplateError {
    /// Multi-line message with suggestions, for terminal output.
    #[must_use]
    pub fn format_with_context(&self) -> String {
        let mut msg = format!("{self}\n");
        match self {
            TemplateError::VariableNotFound {
                suggestions,
                ..
            } if !suggestions.is_empty() => {
                msg.push_str("Did you mean one of these?\n");
                for suggestion in suggestions {
                    msg.push_str(&format!("  - {suggestion}\n"));
                }
            }
            TemplateError::UnresolvedReference {
                alias,
                ..
            } => {
                msg.push_str(&format!("Looked up as `{alias}`.\n"));
                msg.push_str("Check that the item has a child of this category and designation.\n");
            }
            TemplateError::SyntaxError {
                ..
            } => {
                msg.push_str("Common issues:\n");
                msg.push_str("  - Unclosed {{ }} or {% %} delimiters\n");
                msg.push_str("  - Filter arguments must be named, e.g. zfill(width=5)\n");
            }
            _ => {}
        }
        msg
    }
}

impl From<TemplateError> for CatalogError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::UnresolvedReference {
                designation,
                ..
            } => CatalogError::ReferenceResolution {
                designation,
            },
            other => CatalogError::TemplateRender {
                message: other.to_string(),
            },
        }
    }
}

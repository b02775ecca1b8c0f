//! Error handling for the catalog engine
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`CatalogError`]) for precise handling in code
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions for
//!    the `catcalc` command line
//!
//! # Error Categories
//!
//! - **Per-attribute**: [`CatalogError::ConversionError`],
//!   [`CatalogError::CyclicDependency`]. These are captured on the item
//!   (`parameters_errors`) and never abort a recalculation.
//! - **Per-render**: [`CatalogError::TemplateRender`],
//!   [`CatalogError::ReferenceResolution`]. Captured in `marking_errors` or the
//!   derived-quantity error lists.
//! - **Definition-level**: [`CatalogError::InvalidAttribute`],
//!   [`CatalogError::InvalidComposition`], [`CatalogError::VariantTypeMismatch`].
//!   These fail fast, before any item uses the definition.
//! - **Infrastructure**: configuration, snapshot files, lookups.
//!
//! # Examples
//!
//! ```rust,no_run
//! use catalog_calc::core::{CatalogError, user_friendly_error};
//!
//! let err = CatalogError::NotFound { kind: "variant", id: 42 };
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::resolver::CyclicDependencyError;

/// The main error type for catalog operations
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// A raw value could not be converted to the attribute's declared type
    #[error("Cannot convert value of attribute '{attribute}': {reason}")]
    ConversionError {
        /// Attribute (or attribute field, e.g. `default`) being converted
        attribute: String,
        /// Human-readable cause
        reason: String,
    },

    /// Formula dependencies form at least one cycle
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependencyError),

    /// Strict template rendering failed
    #[error("Template rendering failed: {message}")]
    TemplateRender {
        /// Rendering diagnostic, already cleaned of engine internals
        message: String,
    },

    /// A bracket reference names a component that is not in the composition
    #[error("Reference <{designation}> does not match any component of the composition")]
    ReferenceResolution {
        /// Designation as written inside the brackets
        designation: String,
    },

    /// Attribute definition violates a contract
    #[error("Invalid attribute '{name}': {}", format_field_errors(.errors))]
    InvalidAttribute {
        /// Attribute name
        name: String,
        /// Offending field -> message
        errors: BTreeMap<String, String>,
    },

    /// Composition edge would break the DAG or mixes foreign variants
    #[error("Invalid composition: {reason}")]
    InvalidComposition {
        /// Why the edge is rejected
        reason: String,
    },

    /// Item variant belongs to a different detail type
    #[error("Variant {variant_id} does not belong to detail type {detail_type_id}")]
    VariantTypeMismatch {
        /// Variant of the item
        variant_id: i64,
        /// Detail type of the item
        detail_type_id: i64,
    },

    /// A record referenced by id does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind (`item`, `variant`, ...)
        kind: &'static str,
        /// Missing id
        id: i64,
    },

    /// A catalog entry referenced by a catalog attribute does not exist
    #[error("No entry {key} in catalog {catalog}")]
    CatalogEntryNotFound {
        /// Catalog name or directory id
        catalog: String,
        /// Entry key
        key: i64,
    },

    /// Configuration file problems
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description
        message: String,
    },

    /// Snapshot file could not be parsed
    #[error("Invalid snapshot file {file}: {reason}")]
    SnapshotParseError {
        /// Snapshot path
        file: String,
        /// Parser message
        reason: String,
    },

    /// Other error
    #[error("{message}")]
    Other {
        /// Free-form message
        message: String,
    },
}

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors.iter().map(|(field, msg)| format!("{field}: {msg}")).collect::<Vec<_>>().join("; ")
}

/// Error wrapper that carries user-facing details and a suggestion
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: CatalogError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub const fn new(error: CatalogError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for terminal output.
///
/// Known [`CatalogError`] variants get tailored suggestions; I/O and parse errors
/// are mapped onto the closest variant; anything else is reported with its full
/// cause chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(catalog_error) = error.downcast_ref::<CatalogError>() {
        return create_error_context(catalog_error.clone());
    }

    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::NotFound {
            return ErrorContext::new(CatalogError::Other {
                message: error.to_string(),
            })
            .with_suggestion("Check that the file exists and the path is correct");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(CatalogError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the configuration file");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(CatalogError::Other {
        message,
    })
}

fn create_error_context(error: CatalogError) -> ErrorContext {
    match &error {
        CatalogError::CyclicDependency(cycle) => {
            let fields = cycle.fields.iter().cloned().collect::<Vec<_>>().join(", ");
            ErrorContext::new(error)
                .with_suggestion(format!(
                    "Break the cycle by turning one of [{fields}] into a user-entered attribute"
                ))
                .with_details("Formulas of these attributes reference each other directly or transitively")
        }
        CatalogError::InvalidAttribute { .. } => ErrorContext::new(error)
            .with_suggestion("A calculated attribute cannot also define choices, a default or be required")
            .with_details("Attribute definitions are validated before any item uses them"),
        CatalogError::InvalidComposition { .. } => ErrorContext::new(error)
            .with_suggestion("Compositions must form a tree: a component cannot contain itself or its ancestors"),
        CatalogError::VariantTypeMismatch { .. } => ErrorContext::new(error)
            .with_suggestion("Pick a variant of the item's detail type"),
        CatalogError::SnapshotParseError { .. } => ErrorContext::new(error)
            .with_suggestion("Snapshots are JSON, YAML or TOML files; the extension selects the format"),
        CatalogError::ConfigError { .. } => ErrorContext::new(error).with_suggestion(format!(
            "Check the file passed with --config or the {} environment variable",
            crate::constants::CONFIG_ENV_VAR
        )),
        CatalogError::NotFound { .. } | CatalogError::CatalogEntryNotFound { .. } => {
            ErrorContext::new(error).with_suggestion("Check the ids referenced in the snapshot")
        }
        _ => ErrorContext::new(error),
    }
}

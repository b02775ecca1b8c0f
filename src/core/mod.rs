//! Core error types and user-facing error reporting.

pub mod error;

pub use error::{CatalogError, ErrorContext, user_friendly_error};

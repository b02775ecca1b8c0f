//! Marking and formula templating.
//!
//! Markings and formulas are Tera templates with one extension: bracket
//! references to child components.
//!
//! ```text
//! FHD {{ s }}x{{ d }}                       plain attribute values
//! {{ <detail_HDH-12>.E + 5 }}               attribute of a child component
//! {{ <detail_HDH-12>.2.E }}                 child in composition slot 2
//! {{ inner_id|zfill(width=8) }}             custom filter
//! ```
//!
//! # Pipeline
//!
//! 1. [`preprocess_template`] replaces `<designation>` inside template blocks
//!    with the alias from [`normalize_designation`] and records the mapping.
//! 2. [`ContextBuilder`] assembles the context: item identity, attribute-backed
//!    parameters (catalog ids resolved to records), child bags and extra values.
//! 3. [`MarkingRenderer`] renders strictly; undefined names are errors.
//! 4. [`MarkingCompiler`] ties the steps together and maps failures back to
//!    the designation the author wrote.
//!
//! # Custom Filters
//!
//! See [`filters`]: `zfill`, `round_up`, `round_down`, `to_int`, `to_float`,
//! `dmy`, `dmyt`.

pub mod compiler;
pub mod context;
pub mod error;
pub mod filters;
pub mod normalize;
pub mod preprocess;
pub mod renderer;

pub use compiler::{CompiledMarking, MarkingCompiler, auto_wrap};
pub use context::{ChildComponent, ContextBuilder, UnresolvedEntries};
pub use error::TemplateError;
pub use normalize::normalize_designation;
pub use preprocess::{Preprocessed, preprocess_template, rewrite_positional_references};
pub use renderer::MarkingRenderer;

//! Constants shared across the catalog engine.
//!
//! Values that several modules agree on (the normalized identifier prefix,
//! the marking sentinel, cache defaults) live here so that the literal only
//! exists once.

use std::time::Duration;

/// Prefix prepended to every normalized designation alias.
///
/// Keeps aliases disjoint from plain attribute names such as `d` or `E`.
pub const NORMALIZED_PREFIX: &str = "normalized_";

/// Marking written onto an item when its template fails to render.
pub const MARKING_ERROR_SENTINEL: &str = "ERROR";

/// Default number of decimal places kept for `number` attributes.
pub const DEFAULT_NUMBER_PRECISION: u32 = 2;

/// Variables that only receive values during product selection.
///
/// Formulas that mention them are skipped during ordinary recalculation.
pub const DEFAULT_DEFERRED_VARIABLES: &[&str] = &["Fcold", "k"];

/// Default lifetime of cached lookups (one hour).
pub fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

/// Upper bound on compiled templates kept by the renderer.
pub const DEFAULT_MAX_CACHED_TEMPLATES: usize = 1024;

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "CATCALC_CONFIG";

/// `inner_id` given to the first item of an empty catalog.
pub const FIRST_INNER_ID: i64 = 100_000;

/// Environment variable that hides progress bars when set.
pub const NO_PROGRESS_ENV_VAR: &str = "CATCALC_NO_PROGRESS";

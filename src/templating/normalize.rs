//! Designation to template-identifier normalization.

use deunicode::deunicode;

use crate::constants::NORMALIZED_PREFIX;

/// Turn an arbitrary designation into a safe template identifier.
///
/// The designation is trimmed, lower-cased and transliterated to ASCII. Every
/// run of characters outside `[a-z0-9]` becomes a single `_`, and leading or
/// trailing underscores are dropped. A leading digit gets an extra `_` so the
/// body never starts with a number, and the whole thing is prefixed with
/// `normalized_` to keep aliases apart from attribute names.
///
/// # Examples
///
/// ```
/// use catalog_calc::templating::normalize_designation;
///
/// assert_eq!(normalize_designation("HDH-12"), "normalized_hdh_12");
/// assert_eq!(normalize_designation("HDH (тип 1)"), "normalized_hdh_tip_1");
/// assert_eq!(normalize_designation("  123  "), "normalized__123");
/// ```
#[must_use]
pub fn normalize_designation(designation: &str) -> String {
    let ascii = deunicode(&designation.trim().to_lowercase()).to_lowercase();

    let mut body = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !body.is_empty() {
                body.push('_');
            }
            pending_separator = false;
            body.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if body.starts_with(|c: char| c.is_ascii_digit()) {
        body.insert(0, '_');
    }

    format!("{NORMALIZED_PREFIX}{body}")
}

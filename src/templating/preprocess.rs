//! Bracket reference rewriting.
//!
//! Formulas and marking templates address child components with
//! `<Category_Designation>.field`. Designations may contain spaces, dashes
//! and non-latin letters, none of which are valid template identifiers, so
//! before rendering every reference inside a template block is replaced with
//! the alias produced by [`normalize_designation`].

use regex::{Captures, Regex};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::normalize::normalize_designation;
use crate::models::Category;

/// `{{ ... }}` and `{% ... %}` blocks, non-greedy, spanning lines.
static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{[{%].*?[}%]\}").expect("block pattern is valid"));

/// `<designation>` where the designation has no angle brackets and does not
/// start or end with whitespace. The whitespace rule keeps comparisons such
/// as `a < b and c > d` out.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([^<>\s](?:[^<>]*[^<>\s])?)>").expect("reference pattern is valid")
});

/// Result of [`preprocess_template`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preprocessed {
    /// Template text with every reference replaced by its alias
    pub text: String,
    /// Alias -> designation as written in the template. When two designations
    /// normalize to the same alias, the first one in the template is kept.
    pub mapping: BTreeMap<String, String>,
}

impl Preprocessed {
    /// Original designation for an alias, if the alias came from a reference.
    #[must_use]
    pub fn designation_for(&self, alias: &str) -> Option<&str> {
        self.mapping.get(alias).map(String::as_str)
    }
}

/// Replace bracket references inside template blocks with normalized aliases.
///
/// Text outside `{{ }}` / `{% %}` blocks is left alone, so literal markup such
/// as `<div>` survives. A string without any block markers is scanned as a
/// whole. Longer designations are substituted first.
///
/// # Examples
///
/// ```
/// use catalog_calc::templating::preprocess_template;
///
/// let out = preprocess_template("{{ <HDH-12>.e * 5 }}");
/// assert_eq!(out.text, "{{ normalized_hdh_12.e * 5 }}");
/// assert_eq!(out.mapping["normalized_hdh_12"], "HDH-12");
/// ```
#[must_use]
pub fn preprocess_template(source: &str) -> Preprocessed {
    let segments = split_segments(source);

    let mut designations = BTreeSet::new();
    for (text, scanned) in &segments {
        if *scanned {
            for caps in REFERENCE_RE.captures_iter(text) {
                designations.insert(caps[1].to_string());
            }
        }
    }

    if designations.is_empty() {
        return Preprocessed {
            text: source.to_string(),
            mapping: BTreeMap::new(),
        };
    }

    let mut ordered: Vec<&String> = designations.iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let aliases: BTreeMap<&str, String> =
        ordered.iter().map(|d| (d.as_str(), normalize_designation(d))).collect();

    let alternation = ordered
        .iter()
        .map(|d| format!("<({})>", regex::escape(d)))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(substitution) = Regex::new(&alternation) else {
        tracing::warn!("Could not build reference substitution pattern");
        return Preprocessed {
            text: source.to_string(),
            mapping: BTreeMap::new(),
        };
    };

    let mut mapping = BTreeMap::new();
    let mut text = String::with_capacity(source.len());
    for (segment, scanned) in segments {
        if !scanned {
            text.push_str(segment);
            continue;
        }
        let rewritten = substitution.replace_all(segment, |caps: &Captures| {
            let designation = caps.iter().skip(1).flatten().next().map_or("", |m| m.as_str());
            let alias = aliases.get(designation).cloned().unwrap_or_else(|| normalize_designation(designation));
            match mapping.entry(alias.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(designation.to_string());
                }
                Entry::Occupied(kept) if kept.get() != designation => {
                    tracing::warn!(
                        "References <{}> and <{designation}> share the alias `{alias}`",
                        kept.get()
                    );
                }
                Entry::Occupied(_) => {}
            }
            alias
        });
        text.push_str(&rewritten);
    }

    tracing::trace!("Rewrote {} reference(s)", mapping.len());
    Preprocessed {
        text,
        mapping,
    }
}

/// Split into `(segment, is_block)` pairs. Without any block the whole input
/// is a single scanned segment.
fn split_segments(source: &str) -> Vec<(&str, bool)> {
    if !source.contains("{{") && !source.contains("{%") {
        return vec![(source, true)];
    }

    let mut segments = Vec::new();
    let mut last = 0;
    for block in BLOCK_RE.find_iter(source) {
        if block.start() > last {
            segments.push((&source[last..block.start()], false));
        }
        segments.push((block.as_str(), true));
        last = block.end();
    }
    if last < source.len() {
        segments.push((&source[last..], false));
    }
    segments
}

/// Move positional references to a composition slot.
///
/// When the child slot of a composition moves from `old_position` to
/// `new_position`, references in the parent's formulas follow it. A reference
/// without a position addresses slot 1, so when the old position is 1 the bare
/// `<key>.field` form is rewritten; otherwise `<key>.{old}.field` is. Both
/// become `<key>.{new}.field`.
///
/// # Examples
///
/// ```
/// use catalog_calc::models::Category;
/// use catalog_calc::templating::rewrite_positional_references;
///
/// let formula = "<assembly_unit_FHD>.h + <assembly_unit_FHD>.2.h";
/// assert_eq!(
///     rewrite_positional_references(formula, Category::AssemblyUnit, "FHD", 1, 3),
///     "<assembly_unit_FHD>.3.h + <assembly_unit_FHD>.2.h",
/// );
/// ```
#[must_use]
pub fn rewrite_positional_references(
    formula: &str,
    category: Category,
    designation: &str,
    old_position: u32,
    new_position: u32,
) -> String {
    let key = format!("<{}_{}>", category, designation);
    let escaped = regex::escape(&key);
    let pattern = if old_position == 1 {
        format!(r"{escaped}\.([A-Za-z_][A-Za-z0-9_]*)")
    } else {
        format!(r"{escaped}\.{old_position}\.([A-Za-z0-9_]+)")
    };

    let Ok(re) = Regex::new(&pattern) else {
        return formula.to_string();
    };
    re.replace_all(formula, |caps: &Captures| format!("{key}.{new_position}.{}", &caps[1]))
        .into_owned()
}

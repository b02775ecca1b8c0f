//! Extraction of local attribute names from formulas.
//!
//! A formula depends on another attribute of the same item when it mentions
//! that attribute as a bare identifier. Everything else that looks like a name
//! is ignored:
//!
//! - bracket references and their chains: `<detail_HDH>.m`, `<X>.2.B`
//! - field accessors: `m` in `OD.m` (the local `OD` itself is a dependency)
//! - filters with their arguments: `b|to_int`, `x|round_up(precision=2)`
//! - tests: `x is defined`
//! - function calls: `range(end=3)`
//! - string and numeric literals, template keywords, block delimiters

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static STRING_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`[^`]*`"#).expect("string literal pattern is valid")
});

static REFERENCE_CHAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^<>\s](?:[^<>]*[^<>\s])?>(?:\.[A-Za-z0-9_]+)*").expect("reference chain pattern is valid")
});

static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*[A-Za-z_][A-Za-z0-9_]*(?:\s*\([^)]*\))?").expect("filter pattern is valid")
});

static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bis\s+(?:not\s+)?[A-Za-z_][A-Za-z0-9_]*(?:\s*\([^)]*\))?").expect("test pattern is valid")
});

/// Identifiers, or numbers (which swallow exponents and decimal parts).
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[0-9][A-Za-z0-9_.]*").expect("token pattern is valid")
});

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "elif", "else", "endif", "for", "endfor", "set",
    "set_global", "true", "false", "True", "False", "none", "None", "loop", "block", "endblock",
    "macro", "endmacro", "filter", "endfilter", "raw", "endraw", "break", "continue", "with",
    "endwith", "as",
];

/// Bare identifiers referenced by a formula.
///
/// # Examples
///
/// ```
/// use catalog_calc::resolver::extract_dependencies;
///
/// let deps = extract_dependencies("d + a + b|to_int + <detail_unit_HDH>.d");
/// assert_eq!(deps.into_iter().collect::<Vec<_>>(), ["a", "b", "d"]);
/// ```
#[must_use]
pub fn extract_dependencies(formula: &str) -> BTreeSet<String> {
    let text = formula.replace("{{", " ").replace("}}", " ").replace("{%", " ").replace("%}", " ");
    let text = STRING_LITERAL_RE.replace_all(&text, " ");
    let text = REFERENCE_CHAIN_RE.replace_all(&text, " ");
    let text = FILTER_RE.replace_all(&text, " ");
    let text = TEST_RE.replace_all(&text, " ");

    let bytes = text.as_bytes();
    let mut names = BTreeSet::new();
    // Loop targets between `for` and `in` are template locals.
    let mut in_loop_targets = false;

    for token in TOKEN_RE.find_iter(&text) {
        let name = token.as_str();
        match name {
            "for" => in_loop_targets = true,
            "in" => in_loop_targets = false,
            _ => {}
        }
        if in_loop_targets || name.as_bytes()[0].is_ascii_digit() || KEYWORDS.contains(&name) {
            continue;
        }

        let preceded_by_dot = token.start() > 0 && bytes[token.start() - 1] == b'.';
        let rest = text[token.end()..].trim_start();
        let is_call = rest.starts_with('(');
        let is_named_arg = rest.starts_with('=') && !rest.starts_with("==");

        if preceded_by_dot || is_call || is_named_arg {
            continue;
        }
        names.insert(name.to_string());
    }

    names
}

//! Postcode key conventions shared with the web client.
//!
//! Lookup keys are the canonical `"OUTWARD INWARD"` form with exactly one
//! space (`N15 5QA`), and chunks are keyed by outward code (`N15`). The
//! client canonicalizes user input the same way before looking a
//! postcode up, so both sides must agree byte for byte.

use std::sync::LazyLock;

use regex::Regex;

static OUTWARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,2}[0-9]{1,2}[A-Z]?").expect("valid regex"));

/// Canonicalizes a postcode: whitespace removed, upper-cased, and a
/// single space inserted before the last three characters when the
/// result is at least five characters long.
///
/// `"n155qa"`, `"N15  5QA"` and `"N15 5QA"` all become `"N15 5QA"`.
#[must_use]
pub fn canonical_postcode(raw: &str) -> String {
    let compact: Vec<char> = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if compact.len() < 5 {
        return compact.into_iter().collect();
    }

    let split = compact.len() - 3;
    let mut out = String::with_capacity(compact.len() + 1);
    out.extend(&compact[..split]);
    out.push(' ');
    out.extend(&compact[split..]);
    out
}

/// Extracts the outward code from the start of a postcode.
///
/// Returns `None` when the postcode does not start with a recognizable
/// outward code. Applying this to its own output returns the same value.
#[must_use]
pub fn outward_code(postcode: &str) -> Option<&str> {
    OUTWARD_RE.find(postcode).map(|m| m.as_str())
}

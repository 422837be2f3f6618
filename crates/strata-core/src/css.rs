//! CSS Body Rendering
//!
//! Turning entry lists into declaration text.

use crate::types::{CssEntries, CssEntry};

/// Drop `$$`-prefixed control entries and identical duplicate pairs,
/// keeping the first occurrence.
pub fn clear_identical_entries(entries: &CssEntries) -> Vec<&CssEntry> {
    let mut kept: Vec<&CssEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.name.starts_with("$$") {
            continue;
        }
        if kept
            .iter()
            .any(|k| k.name == entry.name && k.value == entry.value)
        {
            continue;
        }
        kept.push(entry);
    }
    kept
}

/// Render entries as `name:value;` declarations. Valueless entries are
/// dropped.
pub fn entries_to_css(entries: &CssEntries) -> String {
    let mut out = String::new();
    for entry in clear_identical_entries(entries) {
        if let Some(value) = &entry.value {
            out.push_str(&entry.name);
            out.push(':');
            out.push_str(value);
            out.push(';');
        }
    }
    out
}

/// Entry-list literal helper for rules and tests.
pub fn css_entries(pairs: &[(&str, &str)]) -> CssEntries {
    pairs
        .iter()
        .map(|(name, value)| CssEntry::new(*name, *value))
        .collect()
}

//! Selector Escaping
//!
//! CSS identifier escaping for raw utility tokens. Escaping is applied
//! exactly once, when a selector is seeded, and never re-applied by
//! variant handlers.

/// Escape a utility token for use inside a CSS selector.
///
/// Follows the CSS identifier escaping rules: NUL becomes U+FFFD, a
/// leading digit is hex-escaped, and everything outside
/// `[A-Za-z0-9_-]`/non-ASCII is backslash-escaped.
pub fn escape_selector(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() * 2);
    for (i, &c) in chars.iter().enumerate() {
        if c == '\0' {
            out.push('\u{FFFD}');
            continue;
        }
        // a lone `-` cannot start an identifier
        if c == '-' && chars.len() == 1 {
            out.push('\\');
            out.push(c);
            continue;
        }
        let identifier_start = i == 0 || (i == 1 && chars[0] == '-');
        if identifier_start && c.is_ascii_digit() {
            out.push_str("\\3");
            out.push(c);
            out.push(' ');
            continue;
        }
        if c as u32 >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// `.{escaped token}` — the seed selector for a raw token.
pub fn to_escaped_selector(raw: &str) -> String {
    format!(".{}", escape_selector(raw))
}

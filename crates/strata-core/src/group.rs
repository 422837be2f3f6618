//! Variant Group Expansion
//!
//! Expands the `hover:(a b)` grouping syntax into plain tokens before
//! resolution. `~` inside a group stands for the bare prefix, and a
//! leading `!` is hoisted in front of the expanded token.

use std::sync::OnceLock;

use regex::Regex;

const DEFAULT_DEPTH: usize = 5;
const DEFAULT_SEPARATORS: &[char] = &['-', ':'];

fn class_group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"((?:[!@\w+:_/-]|\[&?>?:?.*?\])+?)([:-])\(((?:[~!\w\s:/\\,%#.$?-]|\[.*?\])+?)\)")
            .expect("static pattern compiles")
    })
}

/// Expand variant groups with the default `-`/`:` separators and depth 5.
pub fn expand_variant_group(input: &str) -> String {
    expand_variant_group_with(input, DEFAULT_SEPARATORS, DEFAULT_DEPTH)
}

/// Expand variant groups, honoring only the given separators, up to
/// `depth` nesting levels.
pub fn expand_variant_group_with(input: &str, separators: &[char], depth: usize) -> String {
    let pattern = class_group_pattern();
    let mut content = input.to_string();
    let mut rounds = depth;
    while rounds > 0 {
        let next = pattern
            .replace_all(&content, |caps: &regex::Captures<'_>| {
                let pre = &caps[1];
                let sep = &caps[2];
                let separator = sep.chars().next().unwrap_or(':');
                if !separators.contains(&separator) {
                    return caps[0].to_string();
                }
                caps[3]
                    .split_whitespace()
                    .map(|item| {
                        if item == "~" {
                            pre.to_string()
                        } else if let Some(rest) = item.strip_prefix('!') {
                            format!("!{pre}{sep}{rest}")
                        } else {
                            format!("{pre}{sep}{item}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .into_owned();
        let changed = next != content;
        content = next;
        rounds -= 1;
        if !changed {
            break;
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_group() {
        assert_eq!(
            expand_variant_group("hover:(color-red m-1)"),
            "hover:color-red hover:m-1"
        );
    }

    #[test]
    fn test_no_group_untouched() {
        assert_eq!(expand_variant_group("hover:color-red"), "hover:color-red");
    }

    #[test]
    fn test_nested_groups() {
        assert_eq!(
            expand_variant_group("dark:(hover:(m-1 p-1))"),
            "dark:hover:m-1 dark:hover:p-1"
        );
    }

    #[test]
    fn test_tilde_keeps_bare_prefix() {
        assert_eq!(expand_variant_group("text-(~ sm)"), "text text-sm");
    }

    #[test]
    fn test_important_hoisted() {
        assert_eq!(expand_variant_group("hover:(!m-1)"), "!hover:m-1");
    }

    #[test]
    fn test_disabled_separator() {
        assert_eq!(
            expand_variant_group_with("text-(sm red)", &[':'], 5),
            "text-(sm red)"
        );
    }
}

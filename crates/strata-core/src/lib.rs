//! strata-core
//!
//! Data model and CSS primitives for the strata on-demand utility
//! engine: CSS entries, rule/variant/shortcut declarations, the resolved
//! configuration, selector escaping and body rendering.
//!
//! This crate is inert data; the resolution pipeline lives in
//! `strata-engine`.

pub mod config;
pub mod types;

mod css;
mod escape;
mod group;

pub use config::{
    BlocklistRule, Config, ConfigError, DynamicRuleEntry, DynamicShortcutEntry, LayerSorter,
    Postprocessor, Preflight, Preprocessor, ResolvedConfig, Rule, Shortcut, ShortcutBody,
    StaticRuleEntry, StaticShortcutEntry, Variant,
};
pub use css::{clear_identical_entries, css_entries, entries_to_css};
pub use escape::{escape_selector, to_escaped_selector};
pub use group::{expand_variant_group, expand_variant_group_with};
pub use types::{
    BoxFuture, CssEntries, CssEntry, CssValue, CssValues, MatchError, ParentWrapper, ParsedUtil,
    PatternMatch, Provenance, RawUtil, RuleContext, RuleMeta, ShortcutValue, StringifiedUtil,
    Util, UtilObject, VariantContext, VariantHandler, VariantHandlerContext, VariantMatch,
};

/// The layer utilities land on when neither rule nor variant names one.
pub const LAYER_DEFAULT: &str = "default";

//! strata-engine
//!
//! On-demand utility CSS engine: resolves utility tokens (`w-4`,
//! `hover:text-red`) against an extensible configuration of rules,
//! variants and shortcuts, and serializes the results into a
//! deterministic, layered stylesheet. No pre-generated stylesheet
//! exists; CSS is compiled from the tokens actually seen.
//!
//! # Example
//! ```rust,ignore
//! use strata_engine::{Config, GenerateOptions, Generator, Rule, css_entries};
//!
//! let mut config = Config::default();
//! config.rules.push(Rule::new("m-1", css_entries(&[("margin", "0.25rem")])));
//! let engine = Generator::with_config(config);
//! let result = smol::block_on(engine.generate(["m-1"], &GenerateOptions::default()));
//! assert_eq!(result.css, "/* layer: default */\n.m-1{margin:0.25rem;}");
//! ```

mod cache;
mod generator;
mod serialize;
mod shortcut;

pub use generator::{GenerateOptions, Generator, ResolveError, TokenFailure, VariantMatched};
pub use serialize::GenerateResult;

// Re-export the data model for convenience
pub use strata_core;
pub use strata_core::{
    BlocklistRule, BoxFuture, Config, ConfigError, CssEntries, CssEntry, CssValue, CssValues,
    LAYER_DEFAULT, MatchError, ParentWrapper, ParsedUtil, PatternMatch, Preflight, Provenance,
    RawUtil, ResolvedConfig, Rule, RuleContext, RuleMeta, Shortcut, ShortcutBody, ShortcutValue,
    StringifiedUtil, Util, UtilObject, Variant, VariantContext, VariantHandler,
    VariantHandlerContext, VariantMatch, css_entries, entries_to_css, escape_selector,
    expand_variant_group, to_escaped_selector,
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Resolved Configuration
//!
//! The immutable ruleset the engine resolves tokens against: rules split
//! into an exact-match static map and an ordered dynamic list, shortcuts
//! with the same matching discipline, ordered variants, blocklist and
//! safelist, layer ordering and generation toggles.
//!
//! A `Config` is resolved once into a `ResolvedConfig`; the resolved
//! value is never mutated during generation. Reloading swaps in a whole
//! new value and invalidates the token cache.

use std::collections::HashMap;
use std::fmt;
use std::future::ready;

use regex::Regex;

use crate::types::{
    BoxFuture, CssEntries, CssValues, MatchError, PatternMatch, RuleContext, RuleMeta,
    ShortcutValue, UtilObject, VariantContext, VariantMatch,
};

/// Error raised while resolving a configuration. A malformed
/// configuration is a programmer error, fatal at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Dynamic rule matcher callback.
pub type DynamicMatcherFn = Box<
    dyn Fn(PatternMatch, RuleContext) -> BoxFuture<Result<Option<CssValues>, MatchError>>
        + Send
        + Sync,
>;

/// Dynamic shortcut handler callback.
pub type ShortcutMatcherFn = Box<
    dyn Fn(PatternMatch, RuleContext) -> BoxFuture<Result<Option<ShortcutBody>, MatchError>>
        + Send
        + Sync,
>;

/// Variant match callback.
pub type VariantMatchFn =
    Box<dyn Fn(String, VariantContext) -> BoxFuture<Option<VariantMatch>> + Send + Sync>;

/// Token rewriter running before blocklist checks and variant matching.
/// Returning `None` excludes the token.
pub type Preprocessor = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Utility rewriter running after the variant handler chain.
pub type Postprocessor = Box<dyn Fn(&mut UtilObject) + Send + Sync>;

/// Custom layer ordering function, applied after the numeric sort.
pub type LayerSorter = Box<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;

/// A declared mapping from token text to CSS: an exact key or a pattern
/// with a matcher callback.
pub enum Rule {
    Static {
        key: String,
        entries: CssEntries,
        meta: RuleMeta,
    },
    Dynamic {
        pattern: Regex,
        matcher: DynamicMatcherFn,
        meta: RuleMeta,
    },
}

impl Rule {
    /// Exact-key rule.
    pub fn new(key: impl Into<String>, entries: CssEntries) -> Self {
        Rule::Static {
            key: key.into(),
            entries,
            meta: RuleMeta::default(),
        }
    }

    /// Pattern rule with a synchronous matcher.
    pub fn dynamic<F>(pattern: &str, matcher: F) -> Result<Self, ConfigError>
    where
        F: Fn(&PatternMatch, &RuleContext) -> Option<CssValues> + Send + Sync + 'static,
    {
        Ok(Rule::Dynamic {
            pattern: compile(pattern)?,
            matcher: Box::new(move |m, ctx| Box::pin(ready(Ok(matcher(&m, &ctx))))),
            meta: RuleMeta::default(),
        })
    }

    /// Pattern rule with a fully asynchronous, fallible matcher.
    pub fn dynamic_async(pattern: &str, matcher: DynamicMatcherFn) -> Result<Self, ConfigError> {
        Ok(Rule::Dynamic {
            pattern: compile(pattern)?,
            matcher,
            meta: RuleMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: RuleMeta) -> Self {
        match &mut self {
            Rule::Static { meta: slot, .. } | Rule::Dynamic { meta: slot, .. } => *slot = meta,
        }
        self
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Static { key, meta, .. } => f
                .debug_struct("Rule::Static")
                .field("key", key)
                .field("meta", meta)
                .finish_non_exhaustive(),
            Rule::Dynamic { pattern, meta, .. } => f
                .debug_struct("Rule::Dynamic")
                .field("pattern", &pattern.as_str())
                .field("meta", meta)
                .finish_non_exhaustive(),
        }
    }
}

/// What a shortcut expands to: token text (variant-group expanded and
/// whitespace-split) or an explicit value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutBody {
    Text(String),
    Values(Vec<ShortcutValue>),
}

/// A declared alias expanding one token into further tokens or inline
/// CSS before rule matching.
pub enum Shortcut {
    Static {
        key: String,
        body: ShortcutBody,
        meta: RuleMeta,
    },
    Dynamic {
        pattern: Regex,
        handler: ShortcutMatcherFn,
        meta: RuleMeta,
    },
}

impl Shortcut {
    /// Exact-key shortcut expanding to token text.
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Shortcut::Static {
            key: key.into(),
            body: ShortcutBody::Text(body.into()),
            meta: RuleMeta::default(),
        }
    }

    /// Exact-key shortcut with an explicit value list.
    pub fn values(key: impl Into<String>, values: Vec<ShortcutValue>) -> Self {
        Shortcut::Static {
            key: key.into(),
            body: ShortcutBody::Values(values),
            meta: RuleMeta::default(),
        }
    }

    /// Pattern shortcut with a synchronous handler.
    pub fn dynamic<F>(pattern: &str, handler: F) -> Result<Self, ConfigError>
    where
        F: Fn(&PatternMatch, &RuleContext) -> Option<ShortcutBody> + Send + Sync + 'static,
    {
        Ok(Shortcut::Dynamic {
            pattern: compile(pattern)?,
            handler: Box::new(move |m, ctx| Box::pin(ready(Ok(handler(&m, &ctx))))),
            meta: RuleMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: RuleMeta) -> Self {
        match &mut self {
            Shortcut::Static { meta: slot, .. } | Shortcut::Dynamic { meta: slot, .. } => {
                *slot = meta
            }
        }
        self
    }
}

impl fmt::Debug for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shortcut::Static { key, body, meta } => f
                .debug_struct("Shortcut::Static")
                .field("key", key)
                .field("body", body)
                .field("meta", meta)
                .finish(),
            Shortcut::Dynamic { pattern, meta, .. } => f
                .debug_struct("Shortcut::Dynamic")
                .field("pattern", &pattern.as_str())
                .field("meta", meta)
                .finish_non_exhaustive(),
        }
    }
}

/// A declared prefix/suffix transform stripping part of a token and
/// recording a rewrite to apply after rule matching.
pub struct Variant {
    pub name: Option<String>,
    /// Allow this variant to match again on subsequent rounds.
    pub multi_pass: bool,
    match_fn: VariantMatchFn,
}

impl Variant {
    /// Variant with a synchronous match function.
    pub fn new<F>(name: impl Into<String>, match_fn: F) -> Self
    where
        F: Fn(&str, &VariantContext) -> Option<VariantMatch> + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            multi_pass: false,
            match_fn: Box::new(move |input, ctx| Box::pin(ready(match_fn(&input, &ctx)))),
        }
    }

    /// Variant with an asynchronous match function.
    pub fn new_async(name: impl Into<String>, match_fn: VariantMatchFn) -> Self {
        Self {
            name: Some(name.into()),
            multi_pass: false,
            match_fn,
        }
    }

    pub fn multi_pass(mut self) -> Self {
        self.multi_pass = true;
        self
    }

    /// Offer the current token text to this variant.
    pub fn matches(&self, input: String, ctx: &VariantContext) -> BoxFuture<Option<VariantMatch>> {
        (self.match_fn)(input, ctx.clone())
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.name)
            .field("multi_pass", &self.multi_pass)
            .finish_non_exhaustive()
    }
}

/// A blocklist entry: exact token text or a pattern.
#[derive(Debug, Clone)]
pub enum BlocklistRule {
    Exact(String),
    Pattern(Regex),
}

impl BlocklistRule {
    pub fn exact(token: impl Into<String>) -> Self {
        BlocklistRule::Exact(token.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Ok(BlocklistRule::Pattern(compile(pattern)?))
    }

    pub fn is_match(&self, token: &str) -> bool {
        match self {
            BlocklistRule::Exact(exact) => exact == token,
            BlocklistRule::Pattern(pattern) => pattern.is_match(token),
        }
    }
}

/// Raw CSS injected ahead of the utilities of its layer. Only the
/// ordering contract is handled here; producing preflight content is a
/// consumer concern.
pub struct Preflight {
    pub layer: Option<String>,
    getter: Box<dyn Fn() -> Option<String> + Send + Sync>,
}

impl Preflight {
    pub fn new(css: impl Into<String>) -> Self {
        let css = css.into();
        Self {
            layer: None,
            getter: Box::new(move || Some(css.clone())),
        }
    }

    pub fn from_fn(getter: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            layer: None,
            getter: Box::new(getter),
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn css(&self) -> Option<String> {
        (self.getter)()
    }
}

impl fmt::Debug for Preflight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preflight")
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// User-facing configuration, resolved into a `ResolvedConfig` before
/// the engine consumes it.
pub struct Config {
    pub rules: Vec<Rule>,
    pub shortcuts: Vec<Shortcut>,
    pub variants: Vec<Variant>,
    pub blocklist: Vec<BlocklistRule>,
    pub safelist: Vec<String>,
    pub preflights: Vec<Preflight>,
    /// Explicit numeric layer orders; unlisted layers default to 0.
    pub layers: HashMap<String, i32>,
    pub sort_layers: Option<LayerSorter>,
    /// Merge utilities with the exact same body.
    pub merge_selectors: bool,
    /// Retain provenance on stringified utilities for inspection.
    pub details: bool,
    /// Emit a warning when a blocklisted token is seen.
    pub warn: bool,
    pub preprocess: Vec<Preprocessor>,
    pub postprocess: Vec<Postprocessor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            shortcuts: Vec::new(),
            variants: Vec::new(),
            blocklist: Vec::new(),
            safelist: Vec::new(),
            preflights: Vec::new(),
            layers: HashMap::new(),
            sort_layers: None,
            merge_selectors: true,
            details: false,
            warn: true,
            preprocess: Vec::new(),
            postprocess: Vec::new(),
        }
    }
}

impl Config {
    /// Split rules and shortcuts into their static maps and ordered
    /// dynamic lists, assigning each declaration its explicit index.
    pub fn resolve(self) -> ResolvedConfig {
        let rules_size = self.rules.len();
        let mut rules_static_map = HashMap::new();
        let mut rules_dynamic = Vec::new();
        for (index, rule) in self.rules.into_iter().enumerate() {
            match rule {
                Rule::Static { key, entries, meta } => {
                    let prefixed = match &meta.prefix {
                        Some(prefix) => format!("{prefix}{key}"),
                        None => key,
                    };
                    rules_static_map.insert(prefixed, StaticRuleEntry { index, entries, meta });
                }
                Rule::Dynamic {
                    pattern,
                    matcher,
                    meta,
                } => rules_dynamic.push(DynamicRuleEntry {
                    index,
                    pattern,
                    matcher,
                    meta,
                }),
            }
        }

        let mut shortcuts_static_map = HashMap::new();
        let mut shortcuts_dynamic = Vec::new();
        for (index, shortcut) in self.shortcuts.into_iter().enumerate() {
            match shortcut {
                Shortcut::Static { key, body, meta } => {
                    let prefixed = match &meta.prefix {
                        Some(prefix) => format!("{prefix}{key}"),
                        None => key,
                    };
                    shortcuts_static_map
                        .insert(prefixed, StaticShortcutEntry { index, body, meta });
                }
                Shortcut::Dynamic {
                    pattern,
                    handler,
                    meta,
                } => shortcuts_dynamic.push(DynamicShortcutEntry {
                    index,
                    pattern,
                    handler,
                    meta,
                }),
            }
        }

        ResolvedConfig {
            rules_static_map,
            rules_dynamic,
            rules_size,
            shortcuts_static_map,
            shortcuts_dynamic,
            variants: self.variants,
            blocklist: self.blocklist,
            safelist: self.safelist,
            preflights: self.preflights,
            layers: self.layers,
            sort_layers: self.sort_layers,
            merge_selectors: self.merge_selectors,
            details: self.details,
            warn: self.warn,
            preprocess: self.preprocess,
            postprocess: self.postprocess,
        }
    }
}

/// A static rule with its declaration index.
#[derive(Debug)]
pub struct StaticRuleEntry {
    pub index: usize,
    pub entries: CssEntries,
    pub meta: RuleMeta,
}

/// A dynamic rule with its declaration index; evaluated in declaration
/// order, first defined non-empty result wins.
pub struct DynamicRuleEntry {
    pub index: usize,
    pub pattern: Regex,
    pub matcher: DynamicMatcherFn,
    pub meta: RuleMeta,
}

impl fmt::Debug for DynamicRuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicRuleEntry")
            .field("index", &self.index)
            .field("pattern", &self.pattern.as_str())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// A static shortcut with its declaration index.
#[derive(Debug)]
pub struct StaticShortcutEntry {
    pub index: usize,
    pub body: ShortcutBody,
    pub meta: RuleMeta,
}

/// A dynamic shortcut with its declaration index.
pub struct DynamicShortcutEntry {
    pub index: usize,
    pub pattern: Regex,
    pub handler: ShortcutMatcherFn,
    pub meta: RuleMeta,
}

impl fmt::Debug for DynamicShortcutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicShortcutEntry")
            .field("index", &self.index)
            .field("pattern", &self.pattern.as_str())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Fully merged, immutable ruleset. Shared read-only across all token
/// resolutions; replaced wholesale on reload.
pub struct ResolvedConfig {
    pub rules_static_map: HashMap<String, StaticRuleEntry>,
    pub rules_dynamic: Vec<DynamicRuleEntry>,
    pub rules_size: usize,
    pub shortcuts_static_map: HashMap<String, StaticShortcutEntry>,
    pub shortcuts_dynamic: Vec<DynamicShortcutEntry>,
    pub variants: Vec<Variant>,
    pub blocklist: Vec<BlocklistRule>,
    pub safelist: Vec<String>,
    pub preflights: Vec<Preflight>,
    pub layers: HashMap<String, i32>,
    pub sort_layers: Option<LayerSorter>,
    pub merge_selectors: bool,
    pub details: bool,
    pub warn: bool,
    pub preprocess: Vec<Preprocessor>,
    pub postprocess: Vec<Postprocessor>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rules", &self.rules.len())
            .field("shortcuts", &self.shortcuts.len())
            .field("variants", &self.variants.len())
            .field("merge_selectors", &self.merge_selectors)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("rules_size", &self.rules_size)
            .field("rules_dynamic", &self.rules_dynamic.len())
            .field("shortcuts_dynamic", &self.shortcuts_dynamic.len())
            .field("variants", &self.variants.len())
            .field("layers", &self.layers)
            .field("merge_selectors", &self.merge_selectors)
            .field("details", &self.details)
            .field("warn", &self.warn)
            .finish_non_exhaustive()
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

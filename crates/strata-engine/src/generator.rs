//! Utility Generator
//!
//! The resolution pipeline: shortcut expansion, variant stripping, rule
//! matching and variant-chain composition, front-ended by a
//! generation-tagged token cache. Resolution of a single token is
//! strictly sequential; independent tokens are independent, and the
//! serialized output never depends on completion order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::{IndexMap, IndexSet};
use strata_core::{
    Config, LAYER_DEFAULT, MatchError, ParsedUtil, PatternMatch, Provenance, RawUtil,
    ResolvedConfig, RuleContext, StringifiedUtil, Util, UtilObject, VariantContext,
    VariantHandler, VariantHandlerContext, VariantMatch, entries_to_css, to_escaped_selector,
};

use crate::cache::{CachedResolution, TokenCache};
use crate::serialize::{self, BatchOutput, GenerateResult};
use crate::shortcut;

/// Guard against runaway `multi_pass` variants.
const MAX_VARIANT_HANDLERS: usize = 500;

/// Per-token resolution failure. Failures are local to the token that
/// caused them; sibling tokens in a batch still resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A shortcut expanded back into itself, directly or transitively.
    #[error("shortcut expansion cycle detected for `{token}`")]
    ShortcutCycle { token: String },
    /// Variant stripping never settled.
    #[error("too many variants applied to `{token}`")]
    TooManyVariants { token: String },
    /// A user matcher callback failed.
    #[error("matcher failed for `{token}`: {source}")]
    Matcher {
        token: String,
        #[source]
        source: MatchError,
    },
}

/// A token whose resolution failed, carried in `GenerateResult`.
#[derive(Debug, Clone)]
pub struct TokenFailure {
    pub token: String,
    pub error: ResolveError,
}

/// Options for a generation batch.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Emit preflight CSS ahead of each layer's utilities.
    pub preflights: bool,
    /// Include the configured safelist in the token set.
    pub safelist: bool,
    /// Drop newlines and layer marks.
    pub minify: bool,
    /// Namespaces the cache and prefixes generated selectors for style
    /// isolation.
    pub scope: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            preflights: true,
            safelist: true,
            minify: false,
            scope: None,
        }
    }
}

/// Result of variant stripping for one token: the residual string and
/// the ordered handler list.
#[derive(Debug)]
pub struct VariantMatched {
    pub raw: String,
    /// Residual passed to the rule matcher.
    pub current: String,
    /// Accumulated handlers; each newly matched handler is pushed to the
    /// front, so the list reads innermost first.
    pub handlers: Vec<VariantHandler>,
}

/// The on-demand utility engine. Owns the resolved configuration and
/// the token cache; both are read-only during normal resolution and
/// replaced together on reload.
pub struct Generator {
    config: ResolvedConfig,
    cache: RwLock<TokenCache>,
    parent_orders: RwLock<HashMap<String, i32>>,
}

impl Generator {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(TokenCache::default()),
            parent_orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self::new(config.resolve())
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Swap in a new configuration. The token cache is invalidated
    /// wholesale; resolutions started under the old configuration are
    /// discarded rather than cached.
    pub fn set_config(&mut self, config: ResolvedConfig) {
        self.config = config;
        self.cache_mut().invalidate();
        self.parent_orders_mut().clear();
        tracing::debug!("configuration reloaded, token cache invalidated");
    }

    /// Resolve a batch of tokens into a layered stylesheet. Every token
    /// is awaited before serialization starts, and output ordering is
    /// derived only from content, never from completion order.
    pub async fn generate<I, S>(&self, tokens: I, options: &GenerateOptions) -> GenerateResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut input: IndexSet<String> = tokens.into_iter().map(Into::into).collect();
        if options.safelist {
            for token in &self.config.safelist {
                input.insert(token.clone());
            }
        }

        let mut matched: IndexSet<String> = IndexSet::new();
        let mut sheet: IndexMap<String, Vec<StringifiedUtil>> = IndexMap::new();
        let mut layer_set: IndexSet<String> = IndexSet::new();
        layer_set.insert(LAYER_DEFAULT.to_string());
        let mut failures: Vec<TokenFailure> = Vec::new();

        if options.preflights {
            for preflight in &self.config.preflights {
                layer_set.insert(
                    preflight
                        .layer
                        .clone()
                        .unwrap_or_else(|| LAYER_DEFAULT.to_string()),
                );
            }
        }

        for raw in &input {
            match self
                .resolve_token(raw, None, options.scope.as_deref())
                .await
            {
                Ok(Some(utils)) => {
                    matched.insert(raw.clone());
                    for util in utils.iter() {
                        let parent = util.parent.clone().unwrap_or_default();
                        if let Some(layer) = util.meta.as_ref().and_then(|m| m.layer.clone()) {
                            layer_set.insert(layer);
                        }
                        sheet.entry(parent).or_default().push(util.clone());
                    }
                }
                Ok(None) => {}
                Err(error) => failures.push(TokenFailure {
                    token: raw.clone(),
                    error,
                }),
            }
        }

        let layers = self.sort_layers(layer_set);
        let parent_orders = self.parent_orders_read().clone();
        serialize::build_result(
            &self.config,
            BatchOutput {
                sheet,
                layers,
                matched,
                failures,
                parent_orders,
            },
            options,
        )
    }

    /// Naive whitespace extraction over raw source text.
    pub async fn generate_source(&self, source: &str, options: &GenerateOptions) -> GenerateResult {
        self.generate(source.split_whitespace().map(str::to_string), options)
            .await
    }

    /// Resolve one token in isolation, bypassing the serializer.
    /// `alias` substitutes the raw token in the generated selector when
    /// resolving on behalf of another name.
    pub async fn parse_token(
        &self,
        raw: &str,
        alias: Option<&str>,
    ) -> Result<Option<Arc<Vec<StringifiedUtil>>>, ResolveError> {
        self.resolve_token(raw, alias, None).await
    }

    /// Cache-fronted end-to-end resolution of one raw token.
    async fn resolve_token(
        &self,
        raw: &str,
        alias: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Option<Arc<Vec<StringifiedUtil>>>, ResolveError> {
        let key = cache_key(raw, alias, scope);
        let generation;
        {
            let cache = self.cache_read();
            generation = cache.generation();
            if let Some(hit) = cache.get(&key) {
                return match hit {
                    CachedResolution::Hit(utils) => Ok(Some(utils)),
                    CachedResolution::NoMatch => Ok(None),
                    CachedResolution::Failed(error) => Err(error),
                };
            }
        }

        let outcome = self.resolve_uncached(raw, alias, scope).await;
        let cached = match &outcome {
            Ok(Some(utils)) => CachedResolution::Hit(utils.clone()),
            Ok(None) => CachedResolution::NoMatch,
            Err(error) => CachedResolution::Failed(error.clone()),
        };
        self.cache_mut().insert(generation, key, cached);
        outcome
    }

    async fn resolve_uncached(
        &self,
        raw: &str,
        alias: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Option<Arc<Vec<StringifiedUtil>>>, ResolveError> {
        let mut current = raw.to_string();
        for preprocessor in &self.config.preprocess {
            match preprocessor(&current) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        if self.is_blocked(&current) {
            self.warn_blocked(raw);
            return Ok(None);
        }

        let mut matched = self.match_variants(raw, &current).await?;
        if self.is_blocked(&matched.current) {
            self.warn_blocked(raw);
            return Ok(None);
        }
        if let Some(alias) = alias {
            matched.raw = alias.to_string();
        }

        let ctx = RuleContext {
            raw_token: matched.raw.clone(),
            current: matched.current.clone(),
        };

        let utils = match shortcut::expand_shortcut(self, &matched.current, &ctx).await? {
            Some((expanded, meta)) => {
                shortcut::stringify_shortcuts(self, &matched, &ctx, expanded, meta, scope).await?
            }
            None => match self.parse_util(&matched, &ctx, false).await? {
                Some(parsed) => parsed
                    .into_iter()
                    .filter_map(|util| self.stringify_util(util, &ctx, scope))
                    .collect(),
                None => Vec::new(),
            },
        };

        if utils.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Arc::new(utils)))
        }
    }

    /// Repeatedly strip variant prefixes from the token, accumulating
    /// handlers. A variant is consumed after its first match unless it
    /// declares `multi_pass`; the first match per round wins and the
    /// round restarts on the rewritten string.
    pub async fn match_variants(
        &self,
        raw: &str,
        current: &str,
    ) -> Result<VariantMatched, ResolveError> {
        let mut processed = current.to_string();
        let mut handlers: VecDeque<VariantHandler> = VecDeque::new();
        let mut used: HashSet<usize> = HashSet::new();
        let ctx = VariantContext {
            raw_token: raw.to_string(),
        };

        'round: loop {
            for (index, variant) in self.config.variants.iter().enumerate() {
                if !variant.multi_pass && used.contains(&index) {
                    continue;
                }
                let Some(result) = variant.matches(processed.clone(), &ctx).await else {
                    continue;
                };
                let handler = match result {
                    VariantMatch::Rewritten(next) => {
                        if next == processed {
                            continue;
                        }
                        VariantHandler::new(next)
                    }
                    VariantMatch::Handler(handler) => handler,
                };
                processed = handler.matcher.clone();
                handlers.push_front(handler);
                used.insert(index);
                if handlers.len() > MAX_VARIANT_HANDLERS {
                    return Err(ResolveError::TooManyVariants {
                        token: raw.to_string(),
                    });
                }
                continue 'round;
            }
            break;
        }

        Ok(VariantMatched {
            raw: raw.to_string(),
            current: processed,
            handlers: handlers.into(),
        })
    }

    /// Match the residual against the static rule map, then the dynamic
    /// rules in declaration order. The first rule whose pattern matches
    /// and whose matcher returns a defined, non-empty value wins; empty
    /// results continue the scan.
    pub async fn parse_util<'a>(
        &self,
        matched: &'a VariantMatched,
        ctx: &RuleContext,
        internal: bool,
    ) -> Result<Option<Vec<Util<'a>>>, ResolveError> {
        let current = matched.current.as_str();

        if let Some(entry) = self.config.rules_static_map.get(current) {
            if internal || !entry.meta.internal {
                return Ok(Some(vec![Util::Parsed(ParsedUtil {
                    index: entry.index,
                    raw: matched.raw.clone(),
                    entries: entry.entries.clone(),
                    meta: Some(entry.meta.clone()),
                    handlers: &matched.handlers,
                })]));
            }
        }

        for rule in &self.config.rules_dynamic {
            if rule.meta.internal && !internal {
                continue;
            }
            let unprefixed = match &rule.meta.prefix {
                Some(prefix) => match current.strip_prefix(prefix.as_str()) {
                    Some(rest) => rest,
                    None => continue,
                },
                None => current,
            };
            let Some(caps) = rule.pattern.captures(unprefixed) else {
                continue;
            };
            let pattern_match = PatternMatch::from_captures(&caps);
            let result = (rule.matcher)(pattern_match, ctx.clone())
                .await
                .map_err(|source| ResolveError::Matcher {
                    token: matched.raw.clone(),
                    source,
                })?;
            let Some(values) = result else {
                continue;
            };
            let groups = values.into_groups();
            if groups.is_empty() {
                // observed behavior: an empty result falls through to
                // later rules instead of ending the scan
                continue;
            }
            let utils = groups
                .into_iter()
                .map(|group| match group {
                    strata_core::CssValue::Raw(css) => Util::Raw(RawUtil {
                        index: rule.index,
                        raw_css: css,
                        meta: Some(rule.meta.clone()),
                    }),
                    strata_core::CssValue::Entries(entries) => Util::Parsed(ParsedUtil {
                        index: rule.index,
                        raw: matched.raw.clone(),
                        entries,
                        meta: Some(rule.meta.clone()),
                        handlers: &matched.handlers,
                    }),
                })
                .collect();
            return Ok(Some(utils));
        }

        Ok(None)
    }

    /// Apply the accumulated variant handlers, in ascending `order`
    /// (stable on ties), to compose selector, body and parent. `extra`
    /// handlers are appended after the util's own, the way shortcut
    /// sub-tokens inherit their parent's variants.
    pub fn apply_variants(
        &self,
        parsed: &ParsedUtil<'_>,
        extra: &[VariantHandler],
        raw: &str,
    ) -> UtilObject {
        let mut ordered: Vec<&VariantHandler> = parsed.handlers.iter().chain(extra).collect();
        ordered.sort_by_key(|handler| handler.order);

        let mut ctx = VariantHandlerContext {
            prefix: String::new(),
            selector: to_escaped_selector(raw),
            pseudo: String::new(),
            entries: parsed.entries.clone(),
            parent: None,
            parent_order: None,
            layer: None,
            sort: None,
            no_merge: None,
        };

        let mut wraps: Vec<&strata_core::types::WrapFn> = Vec::new();
        for handler in &ordered {
            if let Some(body) = &handler.body {
                if let Some(next) = body(&ctx.entries) {
                    ctx.entries = next;
                }
            }
            if let Some(selector) = &handler.selector {
                if let Some(next) = selector(&ctx.selector, &ctx.entries) {
                    ctx.selector = next;
                }
            }
            if let Some(parent) = &handler.parent {
                ctx.parent = Some(parent.parent.clone());
                ctx.parent_order = parent.order.or(ctx.parent_order);
            }
            if let Some(layer) = &handler.layer {
                ctx.layer = Some(layer.clone());
            }
            if let Some(sort) = handler.sort {
                ctx.sort = Some(sort);
            }
            if let Some(no_merge) = handler.no_merge {
                ctx.no_merge = Some(no_merge);
            }
            if let Some(wrap) = &handler.wrap {
                wraps.push(wrap);
            }
        }
        // the outermost handler's wrap step runs last
        for wrap in wraps.iter().rev() {
            wrap(&mut ctx);
        }

        if let (Some(parent), Some(order)) = (&ctx.parent, ctx.parent_order) {
            self.parent_orders_mut().insert(parent.clone(), order);
        }

        let mut util = UtilObject {
            selector: format!("{}{}{}", ctx.prefix, ctx.selector, ctx.pseudo),
            entries: ctx.entries,
            parent: ctx.parent,
            layer: ctx.layer,
            sort: ctx.sort,
            no_merge: ctx.no_merge,
        };
        for postprocessor in &self.config.postprocess {
            postprocessor(&mut util);
        }
        util
    }

    /// Render one matched utility into its terminal stringified form.
    /// Returns `None` when the composed body is empty.
    pub fn stringify_util(
        &self,
        util: Util<'_>,
        ctx: &RuleContext,
        scope: Option<&str>,
    ) -> Option<StringifiedUtil> {
        match util {
            Util::Raw(raw) => Some(StringifiedUtil {
                index: raw.index,
                selector: None,
                body: raw.raw_css,
                parent: None,
                no_merge: raw.meta.as_ref().is_some_and(|m| m.no_merge),
                provenance: self.provenance(ctx, Some(raw.index)),
                meta: raw.meta,
            }),
            Util::Parsed(parsed) => {
                let object = self.apply_variants(&parsed, &[], &parsed.raw);
                let body = entries_to_css(&object.entries);
                if body.is_empty() {
                    return None;
                }
                let mut meta = parsed.meta.clone().unwrap_or_default();
                if let Some(layer) = object.layer {
                    meta.layer = Some(layer);
                }
                if let Some(sort) = object.sort {
                    meta.sort = Some(sort);
                }
                let no_merge = object.no_merge.unwrap_or(meta.no_merge);
                Some(StringifiedUtil {
                    index: parsed.index,
                    selector: Some(apply_scope(&object.selector, scope)),
                    body,
                    parent: object.parent,
                    no_merge,
                    provenance: self.provenance(ctx, Some(parsed.index)),
                    meta: Some(meta),
                })
            }
        }
    }

    pub(crate) fn provenance(
        &self,
        ctx: &RuleContext,
        rule_index: Option<usize>,
    ) -> Option<Provenance> {
        self.config.details.then(|| Provenance {
            raw_token: ctx.raw_token.clone(),
            current: ctx.current.clone(),
            rule_index,
        })
    }

    fn is_blocked(&self, token: &str) -> bool {
        self.config.blocklist.iter().any(|rule| rule.is_match(token))
    }

    fn warn_blocked(&self, raw: &str) {
        if self.config.warn {
            tracing::warn!(token = %raw, "token is blocklisted, skipping");
        }
    }

    fn sort_layers(&self, set: IndexSet<String>) -> Vec<String> {
        let mut layers: Vec<String> = set.into_iter().collect();
        layers.sort_by(|a, b| {
            let order_a = self.config.layers.get(a).copied().unwrap_or(0);
            let order_b = self.config.layers.get(b).copied().unwrap_or(0);
            order_a.cmp(&order_b).then_with(|| a.cmp(b))
        });
        match &self.config.sort_layers {
            Some(sorter) => sorter(layers),
            None => layers,
        }
    }

    fn cache_read(&self) -> RwLockReadGuard<'_, TokenCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_mut(&self) -> RwLockWriteGuard<'_, TokenCache> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    fn parent_orders_read(&self) -> RwLockReadGuard<'_, HashMap<String, i32>> {
        self.parent_orders.read().unwrap_or_else(|e| e.into_inner())
    }

    fn parent_orders_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, i32>> {
        self.parent_orders.write().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn apply_scope(selector: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{scope} {selector}"),
        None => selector.to_string(),
    }
}

fn cache_key(raw: &str, alias: Option<&str>, scope: Option<&str>) -> String {
    // tokens are whitespace-split upstream, so spaces are unambiguous
    let mut key = raw.to_string();
    if let Some(alias) = alias {
        key.push(' ');
        key.push_str(alias);
    }
    if let Some(scope) = scope {
        key.push_str(" @");
        key.push_str(scope);
    }
    key
}

//! Shortcut Expansion
//!
//! Rewrites a token into further tokens or inline CSS before rule
//! matching. Expansion is recursive, order preserving and depth
//! bounded; a token that resolves back to itself is a cycle error,
//! fatal for that token only. The entries of a shortcut's sub-tokens
//! are concatenated under the shortcut's own selector, never merged
//! with standalone occurrences.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use strata_core::{
    CssEntries, ParsedUtil, PatternMatch, RawUtil, RuleContext, RuleMeta, ShortcutBody,
    ShortcutValue, StringifiedUtil, Util, VariantHandler, entries_to_css, expand_variant_group,
};

use crate::generator::{Generator, ResolveError, VariantMatched, apply_scope};

/// Recursion bound for nested shortcuts.
const MAX_DEPTH: usize = 5;

/// A resolved expansion item: a further token or inline CSS entries.
#[derive(Debug, Clone)]
pub(crate) enum Expanded {
    Token(String),
    Inline(CssEntries),
}

/// Expand `input` if it names a shortcut. `Ok(None)` means the token is
/// not a shortcut and proceeds to plain rule matching.
pub(crate) async fn expand_shortcut(
    engine: &Generator,
    input: &str,
    ctx: &RuleContext,
) -> Result<Option<(Vec<Expanded>, Option<RuleMeta>)>, ResolveError> {
    let mut stack: Vec<String> = Vec::new();
    expand_inner(engine, input.to_string(), ctx, MAX_DEPTH, &mut stack).await
}

type ExpandOutcome = Result<Option<(Vec<Expanded>, Option<RuleMeta>)>, ResolveError>;

fn expand_inner<'a>(
    engine: &'a Generator,
    input: String,
    ctx: &'a RuleContext,
    depth: usize,
    stack: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = ExpandOutcome> + Send + 'a>> {
    Box::pin(async move {
        if depth == 0 {
            return Ok(None);
        }
        if stack.contains(&input) {
            return Err(ResolveError::ShortcutCycle { token: input });
        }

        let config = engine.config();
        let mut body: Option<ShortcutBody> = None;
        let mut meta: Option<RuleMeta> = None;

        // static map first, prefix baked into the key
        if let Some(entry) = config.shortcuts_static_map.get(&input) {
            body = Some(entry.body.clone());
            meta = Some(entry.meta.clone());
        } else {
            for entry in &config.shortcuts_dynamic {
                let unprefixed = match &entry.meta.prefix {
                    Some(prefix) => match input.strip_prefix(prefix.as_str()) {
                        Some(rest) => rest,
                        None => continue,
                    },
                    None => input.as_str(),
                };
                let Some(caps) = entry.pattern.captures(unprefixed) else {
                    continue;
                };
                let pattern_match = PatternMatch::from_captures(&caps);
                let result = (entry.handler)(pattern_match, ctx.clone()).await.map_err(
                    |source| ResolveError::Matcher {
                        token: ctx.raw_token.clone(),
                        source,
                    },
                )?;
                if let Some(found) = result {
                    body = Some(found);
                    meta = Some(entry.meta.clone());
                    break;
                }
            }
        }

        let Some(body) = body else {
            return Ok(None);
        };

        let values: Vec<ShortcutValue> = match body {
            ShortcutBody::Text(text) => expand_variant_group(text.trim())
                .split_whitespace()
                .map(|token| ShortcutValue::Token(token.to_string()))
                .collect(),
            ShortcutBody::Values(values) => values,
        };

        stack.push(input);
        let mut out: Vec<Expanded> = Vec::new();
        for value in values {
            match value {
                ShortcutValue::Inline(entries) => out.push(Expanded::Inline(entries)),
                ShortcutValue::Token(token) => {
                    match expand_inner(engine, token.clone(), ctx, depth - 1, &mut *stack).await? {
                        Some((nested, _)) => out.extend(nested),
                        None => out.push(Expanded::Token(token)),
                    }
                }
            }
        }
        stack.pop();

        Ok(Some((out, meta)))
    })
}

/// Either kind of sub-utility, detached from its borrowed handler list.
enum OwnedUtil {
    Raw(RawUtil),
    Entries {
        index: usize,
        entries: CssEntries,
        meta: Option<RuleMeta>,
    },
}

struct SubParsed {
    matched: Option<VariantMatched>,
    utils: Vec<OwnedUtil>,
}

/// Resolve every expansion item and fold the results into stringified
/// utilities carrying the shortcut's own selector. Sub-utilities with
/// the same selector and parent concatenate their bodies per layer.
pub(crate) async fn stringify_shortcuts(
    engine: &Generator,
    parent: &VariantMatched,
    ctx: &RuleContext,
    expanded: Vec<Expanded>,
    meta: Option<RuleMeta>,
    scope: Option<&str>,
) -> Result<Vec<StringifiedUtil>, ResolveError> {
    // repeated sub-tokens collapse to their first occurrence
    let mut seen: HashSet<String> = HashSet::new();
    let mut items: Vec<Expanded> = Vec::new();
    for item in expanded {
        match &item {
            Expanded::Token(token) => {
                if seen.insert(token.clone()) {
                    items.push(item);
                }
            }
            Expanded::Inline(_) => items.push(item),
        }
    }

    // each sub-token gets its own variant stripping, then matches with
    // internal rules allowed
    let mut pieces: Vec<SubParsed> = Vec::new();
    for item in items {
        match item {
            Expanded::Inline(entries) => pieces.push(SubParsed {
                matched: None,
                utils: vec![OwnedUtil::Entries {
                    index: usize::MAX,
                    entries,
                    meta: None,
                }],
            }),
            Expanded::Token(token) => {
                let matched = engine.match_variants(&token, &token).await?;
                let Some(parsed) = engine.parse_util(&matched, ctx, true).await? else {
                    tracing::warn!(token = %token, shortcut = %ctx.current, "unmatched shortcut segment");
                    continue;
                };
                let utils = parsed
                    .into_iter()
                    .map(|util| match util {
                        Util::Raw(raw) => OwnedUtil::Raw(raw),
                        Util::Parsed(parsed) => OwnedUtil::Entries {
                            index: parsed.index,
                            entries: parsed.entries,
                            meta: parsed.meta,
                        },
                    })
                    .collect();
                pieces.push(SubParsed {
                    matched: Some(matched),
                    utils,
                });
            }
        }
    }

    // flatten in listed order: a shortcut's effective body concatenates
    // its sub-tokens in the order they were written
    let mut flat: Vec<(usize, OwnedUtil)> = Vec::new();
    for (piece_index, piece) in pieces.iter_mut().enumerate() {
        for util in piece.utils.drain(..) {
            flat.push((piece_index, util));
        }
    }

    let mut raw_utils: Vec<StringifiedUtil> = Vec::new();
    let mut layer_map: IndexMap<Option<String>, Vec<StringifiedUtil>> = IndexMap::new();

    for (piece_index, util) in flat {
        match util {
            OwnedUtil::Raw(raw) => raw_utils.push(StringifiedUtil {
                index: raw.index,
                selector: None,
                body: raw.raw_css,
                parent: None,
                no_merge: raw.meta.as_ref().is_some_and(|m| m.no_merge),
                provenance: engine.provenance(ctx, Some(raw.index)),
                meta: raw.meta,
            }),
            OwnedUtil::Entries {
                index,
                entries,
                meta: sub_meta,
            } => {
                let own_handlers: &[VariantHandler] = pieces[piece_index]
                    .matched
                    .as_ref()
                    .map(|m| m.handlers.as_slice())
                    .unwrap_or(&[]);
                let parsed = ParsedUtil {
                    index,
                    raw: parent.raw.clone(),
                    entries,
                    meta: sub_meta.clone(),
                    handlers: own_handlers,
                };
                let object = engine.apply_variants(&parsed, &parent.handlers, &parent.raw);
                let body = entries_to_css(&object.entries);
                if body.is_empty() {
                    continue;
                }

                let mut effective = sub_meta.unwrap_or_default();
                if let Some(shortcut_meta) = &meta {
                    if effective.layer.is_none() {
                        effective.layer = shortcut_meta.layer.clone();
                    }
                    if effective.sort.is_none() {
                        effective.sort = shortcut_meta.sort;
                    }
                    effective.no_merge = effective.no_merge || shortcut_meta.no_merge;
                }
                if let Some(layer) = object.layer.clone() {
                    effective.layer = Some(layer);
                }
                if let Some(sort) = object.sort {
                    effective.sort = Some(sort);
                }
                let no_merge = object.no_merge.unwrap_or(effective.no_merge);
                let selector = apply_scope(&object.selector, scope);

                let group = layer_map.entry(effective.layer.clone()).or_default();
                let merge_target = if no_merge {
                    None
                } else {
                    group.iter().position(|existing| {
                        !existing.no_merge
                            && existing.selector.as_deref() == Some(selector.as_str())
                            && existing.parent == object.parent
                    })
                };
                match merge_target {
                    Some(at) => group[at].body.push_str(&body),
                    None => group.push(StringifiedUtil {
                        index,
                        selector: Some(selector),
                        body,
                        parent: object.parent,
                        meta: Some(effective),
                        provenance: engine.provenance(ctx, Some(index)),
                        no_merge,
                    }),
                }
            }
        }
    }

    let mut out = raw_utils;
    for (_, group) in layer_map {
        out.extend(group);
    }
    Ok(out)
}

//! Merge & Layer Serialization
//!
//! Groups stringified utilities by parent wrapper, merges identical
//! bodies across selectors, orders layers deterministically and renders
//! the final CSS text. Sorting keys are derived from content (layer,
//! declaration index, sort overrides, selector), never from the order
//! resolutions completed in.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use strata_core::{LAYER_DEFAULT, ResolvedConfig, StringifiedUtil};

use crate::generator::{GenerateOptions, TokenFailure};

/// Final output of a generation batch.
#[derive(Debug)]
pub struct GenerateResult {
    /// Every non-empty layer concatenated in output order.
    pub css: String,
    /// Layer names in output order.
    pub layers: Vec<String>,
    /// Raw tokens that produced CSS.
    pub matched: IndexSet<String>,
    /// Per-token resolution failures; the stylesheet is best-effort
    /// over the tokens that succeeded.
    pub failures: Vec<TokenFailure>,
    layer_css: IndexMap<String, String>,
    separator: String,
}

impl GenerateResult {
    /// Rendered text of one layer, if it produced any CSS.
    pub fn get_layer(&self, name: &str) -> Option<&str> {
        self.layer_css
            .get(name)
            .map(String::as_str)
            .filter(|css| !css.is_empty())
    }

    /// Compose a subset of layers, respecting the output order.
    pub fn get_layers(&self, includes: Option<&[&str]>, excludes: Option<&[&str]>) -> String {
        self.layers
            .iter()
            .filter(|layer| includes.is_none_or(|list| list.contains(&layer.as_str())))
            .filter(|layer| excludes.is_none_or(|list| !list.contains(&layer.as_str())))
            .filter_map(|layer| self.get_layer(layer))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

/// Everything the generator gathered for one batch.
pub(crate) struct BatchOutput {
    /// Utilities grouped by parent wrapper; empty string means none.
    pub sheet: IndexMap<String, Vec<StringifiedUtil>>,
    /// Layer names, already sorted.
    pub layers: Vec<String>,
    pub matched: IndexSet<String>,
    pub failures: Vec<TokenFailure>,
    /// Ordering recorded for parent wrappers by variant handlers.
    pub parent_orders: HashMap<String, i32>,
}

pub(crate) fn build_result(
    config: &ResolvedConfig,
    batch: BatchOutput,
    options: &GenerateOptions,
) -> GenerateResult {
    let nl = if options.minify { "" } else { "\n" };

    // deterministic parent order: recorded order first, then lexical
    let mut parents: Vec<(&String, &Vec<StringifiedUtil>)> = batch.sheet.iter().collect();
    parents.sort_by(|a, b| {
        let order_a = batch.parent_orders.get(a.0).copied().unwrap_or(0);
        let order_b = batch.parent_orders.get(b.0).copied().unwrap_or(0);
        order_a.cmp(&order_b).then_with(|| a.0.cmp(b.0))
    });

    let mut preflight_map: HashMap<String, String> = HashMap::new();
    if options.preflights {
        for preflight in &config.preflights {
            if let Some(css) = preflight.css() {
                let layer = preflight
                    .layer
                    .clone()
                    .unwrap_or_else(|| LAYER_DEFAULT.to_string());
                let slot = preflight_map.entry(layer).or_default();
                if !slot.is_empty() {
                    slot.push_str(nl);
                }
                slot.push_str(&css);
            }
        }
    }

    let mut layer_css: IndexMap<String, String> = IndexMap::new();
    for layer in &batch.layers {
        let utilities = render_layer(layer, &parents, config, nl);
        let mut text = String::new();
        if let Some(preflight) = preflight_map.get(layer.as_str()) {
            text.push_str(preflight);
        }
        if !utilities.is_empty() {
            if !text.is_empty() {
                text.push_str(nl);
            }
            text.push_str(&utilities);
        }
        if !text.is_empty() && !options.minify {
            text = format!("/* layer: {layer} */{nl}{text}");
        }
        layer_css.insert(layer.clone(), text);
    }

    let css = layer_css
        .values()
        .filter(|text| !text.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(nl);

    GenerateResult {
        css,
        layers: batch.layers,
        matched: batch.matched,
        failures: batch.failures,
        layer_css,
        separator: nl.to_string(),
    }
}

/// One output rule being assembled: selector/sort pairs plus body.
struct PreparedRule {
    selectors: Vec<(String, i32)>,
    body: String,
    no_merge: bool,
}

fn render_layer(
    layer: &str,
    parents: &[(&String, &Vec<StringifiedUtil>)],
    config: &ResolvedConfig,
    nl: &str,
) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for (parent, items) in parents {
        let mut utils: Vec<&StringifiedUtil> = items
            .iter()
            .filter(|util| util_layer(util) == layer)
            .collect();
        if utils.is_empty() {
            continue;
        }
        utils.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| util_sort(a).cmp(&util_sort(b)))
                .then_with(|| a.selector.cmp(&b.selector))
        });

        // merge identical bodies: the merged rule stays at the first
        // occurrence, selectors keep first-seen order
        let mut prepared: Vec<PreparedRule> = Vec::new();
        for util in utils {
            let sort = util_sort(util);
            if config.merge_selectors && !util.no_merge && util.selector.is_some() {
                if let Some(existing) = prepared.iter_mut().find(|rule| {
                    !rule.no_merge && !rule.selectors.is_empty() && rule.body == util.body
                }) {
                    if let Some(selector) = &util.selector {
                        existing.selectors.push((selector.clone(), sort));
                    }
                    continue;
                }
            }
            prepared.push(PreparedRule {
                selectors: util
                    .selector
                    .clone()
                    .map(|selector| vec![(selector, sort)])
                    .unwrap_or_default(),
                body: util.body.clone(),
                no_merge: util.no_merge,
            });
        }

        let rules: Vec<String> = prepared
            .into_iter()
            .map(|mut rule| {
                if rule.selectors.is_empty() {
                    return rule.body;
                }
                rule.selectors.sort_by_key(|(_, sort)| *sort);
                let mut selectors: Vec<String> = Vec::with_capacity(rule.selectors.len());
                for (selector, _) in rule.selectors {
                    if !selectors.contains(&selector) {
                        selectors.push(selector);
                    }
                }
                format!("{}{{{}}}", selectors.join(&format!(",{nl}")), rule.body)
            })
            .collect();

        let css = rules.join(nl);
        let block = if parent.is_empty() {
            css
        } else {
            // ` $$ `-separated parents nest as multiple wrappers
            let wrappers: Vec<&str> = parent.split(" $$ ").collect();
            format!(
                "{}{{{nl}{css}{nl}{}",
                wrappers.join(&format!("{{{nl}")),
                "}".repeat(wrappers.len())
            )
        };
        blocks.push(block);
    }
    blocks.join(nl)
}

fn util_layer(util: &StringifiedUtil) -> &str {
    util.meta
        .as_ref()
        .and_then(|meta| meta.layer.as_deref())
        .unwrap_or(LAYER_DEFAULT)
}

fn util_sort(util: &StringifiedUtil) -> i32 {
    util.meta.as_ref().and_then(|meta| meta.sort).unwrap_or(0)
}

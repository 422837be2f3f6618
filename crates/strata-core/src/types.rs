//! Core Value Types
//!
//! The data that flows through the resolution pipeline: CSS entries,
//! rule metadata, variant handlers and the intermediate and terminal
//! utility records.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by matcher callbacks. Every matcher invocation
/// is treated as potentially asynchronous and awaited before its result
/// is inspected.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Failure raised by a user-provided matcher callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MatchError(pub String);

/// A single CSS declaration, e.g. `margin: 0.25rem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssEntry {
    pub name: String,
    /// `None` marks a placeholder entry that is dropped at render time.
    pub value: Option<String>,
}

impl CssEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// An entry with no value; useful as a marker for body rewrites.
    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Ordered list of CSS declarations.
pub type CssEntries = Vec<CssEntry>;

/// One rule result group: property entries or raw CSS text that skips
/// entry composition entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssValue {
    Entries(CssEntries),
    Raw(String),
}

impl CssValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CssValue::Entries(entries) => entries.is_empty(),
            CssValue::Raw(css) => css.is_empty(),
        }
    }
}

impl From<CssEntries> for CssValue {
    fn from(entries: CssEntries) -> Self {
        CssValue::Entries(entries)
    }
}

/// What a dynamic matcher may produce: a single value, or several groups
/// each fanning out into its own utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssValues {
    Value(CssValue),
    Groups(Vec<CssValue>),
}

impl CssValues {
    /// Flatten into the list of non-empty groups.
    pub fn into_groups(self) -> Vec<CssValue> {
        match self {
            CssValues::Value(value) => {
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value]
                }
            }
            CssValues::Groups(groups) => groups.into_iter().filter(|g| !g.is_empty()).collect(),
        }
    }
}

impl From<CssValue> for CssValues {
    fn from(value: CssValue) -> Self {
        CssValues::Value(value)
    }
}

impl From<CssEntries> for CssValues {
    fn from(entries: CssEntries) -> Self {
        CssValues::Value(CssValue::Entries(entries))
    }
}

impl From<String> for CssValues {
    fn from(raw: String) -> Self {
        CssValues::Value(CssValue::Raw(raw))
    }
}

impl From<&str> for CssValues {
    fn from(raw: &str) -> Self {
        CssValues::Value(CssValue::Raw(raw.to_string()))
    }
}

/// Per-rule metadata controlling layer assignment, ordering and merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMeta {
    /// Target layer; `None` means the default layer.
    pub layer: Option<String>,
    /// Fine-tune sort within a layer.
    pub sort: Option<i32>,
    /// Never merge this utility with others sharing the same body.
    pub no_merge: bool,
    /// The token must start with this prefix; it is stripped before the
    /// pattern is tested.
    pub prefix: Option<String>,
    /// Matched only while expanding shortcuts, never from user tokens.
    pub internal: bool,
}

impl RuleMeta {
    pub fn layer(name: impl Into<String>) -> Self {
        Self {
            layer: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Owned snapshot of a successful pattern match, handed to matcher
/// callbacks in place of borrowed captures.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    /// Full matched text.
    pub full: String,
    /// Capture groups in order of appearance.
    pub groups: Vec<Option<String>>,
}

impl PatternMatch {
    pub fn from_captures(caps: &regex::Captures<'_>) -> Self {
        Self {
            full: caps
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            groups: caps
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// Capture group by 1-based index, the way patterns number them.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index.checked_sub(1)?)?.as_deref()
    }
}

/// Context handed to rule and shortcut matchers.
#[derive(Debug, Clone)]
pub struct RuleContext {
    /// Unprocessed token from user input (or an alias placeholder).
    pub raw_token: String,
    /// Current residual being matched.
    pub current: String,
}

/// Context handed to variant match functions.
#[derive(Debug, Clone)]
pub struct VariantContext {
    /// Unprocessed token from user input.
    pub raw_token: String,
}

/// Selector rewrite: receives the current selector and the (possibly
/// rewritten) body entries.
pub type SelectorRewrite = Box<dyn Fn(&str, &CssEntries) -> Option<String> + Send + Sync>;
/// Body rewrite: may filter or transform the entries.
pub type BodyRewrite = Box<dyn Fn(&CssEntries) -> Option<CssEntries> + Send + Sync>;
/// Wrap step: runs after the remaining handler chain has been applied.
pub type WrapFn = Box<dyn Fn(&mut VariantHandlerContext) + Send + Sync>;

/// Parent wrapper (e.g. a media query) with its own ordering, distinct
/// from the rule's sort index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentWrapper {
    pub parent: String,
    pub order: Option<i32>,
}

impl ParentWrapper {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            order: None,
        }
    }

    pub fn with_order(parent: impl Into<String>, order: i32) -> Self {
        Self {
            parent: parent.into(),
            order: Some(order),
        }
    }
}

/// The record a matched variant leaves behind: the rewritten token for
/// the next matching round plus the rewrites to apply to the produced
/// utility.
pub struct VariantHandler {
    /// Rewritten token for the next round of variant matching.
    pub matcher: String,
    /// Position in the handler chain; lower applies first.
    pub order: i32,
    pub selector: Option<SelectorRewrite>,
    pub body: Option<BodyRewrite>,
    pub parent: Option<ParentWrapper>,
    pub layer: Option<String>,
    pub sort: Option<i32>,
    pub no_merge: Option<bool>,
    /// Runs after every later handler has been applied, so the handler
    /// can rewrite what the inner chain produced.
    pub wrap: Option<WrapFn>,
}

impl VariantHandler {
    pub fn new(matcher: impl Into<String>) -> Self {
        Self {
            matcher: matcher.into(),
            order: 0,
            selector: None,
            body: None,
            parent: None,
            layer: None,
            sort: None,
            no_merge: None,
            wrap: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_selector(
        mut self,
        rewrite: impl Fn(&str, &CssEntries) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.selector = Some(Box::new(rewrite));
        self
    }

    pub fn with_body(
        mut self,
        rewrite: impl Fn(&CssEntries) -> Option<CssEntries> + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(Box::new(rewrite));
        self
    }

    pub fn with_parent(mut self, parent: ParentWrapper) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_no_merge(mut self, no_merge: bool) -> Self {
        self.no_merge = Some(no_merge);
        self
    }

    pub fn with_wrap(
        mut self,
        wrap: impl Fn(&mut VariantHandlerContext) + Send + Sync + 'static,
    ) -> Self {
        self.wrap = Some(Box::new(wrap));
        self
    }
}

impl fmt::Debug for VariantHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantHandler")
            .field("matcher", &self.matcher)
            .field("order", &self.order)
            .field("parent", &self.parent)
            .field("layer", &self.layer)
            .field("sort", &self.sort)
            .field("no_merge", &self.no_merge)
            .finish_non_exhaustive()
    }
}

/// Outcome of a variant match function.
#[derive(Debug)]
pub enum VariantMatch {
    /// Pass-through rewrite of the token, no output transformation.
    Rewritten(String),
    /// Full handler describing selector/body/parent rewrites.
    Handler(VariantHandler),
}

/// Mutable composition context threaded through the handler chain.
#[derive(Debug, Clone, Default)]
pub struct VariantHandlerContext {
    /// Prepended to the final selector, e.g. a parent selector.
    pub prefix: String,
    pub selector: String,
    /// Appended to the final selector, e.g. a pseudo element.
    pub pseudo: String,
    pub entries: CssEntries,
    /// Parent wrapper such as a media query.
    pub parent: Option<String>,
    /// Ordering of the parent wrapper within its layer.
    pub parent_order: Option<i32>,
    pub layer: Option<String>,
    pub sort: Option<i32>,
    pub no_merge: Option<bool>,
}

/// Composed utility after the handler chain, before stringification.
#[derive(Debug, Clone)]
pub struct UtilObject {
    pub selector: String,
    pub entries: CssEntries,
    pub parent: Option<String>,
    pub layer: Option<String>,
    pub sort: Option<i32>,
    pub no_merge: Option<bool>,
}

/// Result of rule matching before the handler chain is applied.
#[derive(Debug)]
pub struct ParsedUtil<'a> {
    /// Declaration index of the matched rule.
    pub index: usize,
    /// The raw token the resolution started from.
    pub raw: String,
    pub entries: CssEntries,
    pub meta: Option<RuleMeta>,
    /// Handlers accumulated by the variant stripper, innermost first.
    pub handlers: &'a [VariantHandler],
}

/// Direct raw-CSS emission bypassing entry composition.
#[derive(Debug, Clone)]
pub struct RawUtil {
    pub index: usize,
    pub raw_css: String,
    pub meta: Option<RuleMeta>,
}

/// Either kind of matched utility.
#[derive(Debug)]
pub enum Util<'a> {
    Parsed(ParsedUtil<'a>),
    Raw(RawUtil),
}

/// Provenance retained on stringified utilities when `details` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub raw_token: String,
    /// Residual the rule matched against.
    pub current: String,
    pub rule_index: Option<usize>,
}

/// Terminal, cacheable unit: one CSS rule worth of output.
#[derive(Debug, Clone)]
pub struct StringifiedUtil {
    /// Declaration index of the producing rule; primary sort key.
    pub index: usize,
    /// `None` for raw CSS emitted without a selector.
    pub selector: Option<String>,
    pub body: String,
    pub parent: Option<String>,
    pub meta: Option<RuleMeta>,
    pub provenance: Option<Provenance>,
    pub no_merge: bool,
}

/// A shortcut expansion item: a further token, or inline CSS entries
/// emitted under the shortcut's own selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutValue {
    Token(String),
    Inline(CssEntries),
}

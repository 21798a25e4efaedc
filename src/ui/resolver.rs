//! Multi-strategy element resolution.
//!
//! A [`Selector`] is an ordered list of matching strategies; resolution
//! tries them in the caller's declared order and stops at the first one
//! that produces a node. Strategy order matters: stable resource ids come
//! first, free-text containment is a last resort, and the blind
//! first-clickable fallback participates only when a caller explicitly
//! lists it.

use serde::{Deserialize, Serialize};

use crate::ui::types::{Node, Snapshot};

/// One way of locating an element inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum Strategy {
    /// Exact resource-id equality
    ResourceId(String),

    /// Trailing-substring match on the resource id, for when the exact
    /// identifier namespace is unknown
    ResourceIdSuffix(String),

    /// Exact content-description equality; the match's own bounds are used
    ContentDesc(String),

    /// Exact content-description match, then tap the smallest clickable
    /// ancestor whose bounds fully enclose it. Compensates for icon-only
    /// descriptors nested inside a larger tappable container.
    ContainedDesc(String),

    /// Exact text equality
    Text(String),

    /// Case-insensitive text containment
    TextContains(String),

    /// First clickable node in document order
    FirstClickable,
}

impl Strategy {
    pub fn describe(&self) -> String {
        match self {
            Strategy::ResourceId(v) => format!("resource-id='{}'", v),
            Strategy::ResourceIdSuffix(v) => format!("resource-id-suffix='{}'", v),
            Strategy::ContentDesc(v) => format!("content-desc='{}'", v),
            Strategy::ContainedDesc(v) => format!("contained-desc='{}'", v),
            Strategy::Text(v) => format!("text='{}'", v),
            Strategy::TextContains(v) => format!("text-contains='{}'", v),
            Strategy::FirstClickable => "first-clickable".to_string(),
        }
    }

    /// Short strategy kind, as reported in `Match::strategy_used`.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::ResourceId(_) => "resource-id",
            Strategy::ResourceIdSuffix(_) => "resource-id-suffix",
            Strategy::ContentDesc(_) => "content-desc",
            Strategy::ContainedDesc(_) => "contained-desc",
            Strategy::Text(_) => "text",
            Strategy::TextContains(_) => "text-contains",
            Strategy::FirstClickable => "first-clickable",
        }
    }
}

/// An ordered set of strategies for locating one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    strategies: Vec<Strategy>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ResourceId(id.into()));
        self
    }

    pub fn resource_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ResourceIdSuffix(suffix.into()));
        self
    }

    pub fn content_desc(mut self, desc: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ContentDesc(desc.into()));
        self
    }

    pub fn contained_desc(mut self, desc: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ContainedDesc(desc.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Text(text.into()));
        self
    }

    pub fn text_contains(mut self, needle: impl Into<String>) -> Self {
        self.strategies.push(Strategy::TextContains(needle.into()));
        self
    }

    pub fn first_clickable(mut self) -> Self {
        self.strategies.push(Strategy::FirstClickable);
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn describe(&self) -> String {
        self.strategies
            .iter()
            .map(Strategy::describe)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// A successful resolution: the node, the strategy that found it, and the
/// computed tap point.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    /// The matched node
    pub node: &'a Node,

    /// Index of the matched node in the snapshot
    pub index: usize,

    /// Kind of the strategy that matched (e.g. "text")
    pub strategy_used: &'static str,

    /// Center of the tap target, floored to integer pixels. For a
    /// `TextContains` match with empty bounds this comes from the nearest
    /// preceding node that has usable bounds; for `ContainedDesc` it comes
    /// from the enclosing clickable container.
    pub tap_point: (i32, i32),
}

/// Resolution failure carrying the ordered list of strategies attempted,
/// so callers can produce an actionable diagnostic.
#[derive(Debug, Clone)]
pub enum ResolveError {
    NotFound { tried: Vec<String> },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound { tried } => {
                write!(f, "no element matched; tried: {}", tried.join(", "))
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolve a selector against a snapshot. Strategies are tried in the
/// declared order; the first success wins. The fallback tap on the first
/// clickable node is never applied implicitly.
pub fn resolve<'a>(snapshot: &'a Snapshot, selector: &Selector) -> Result<Match<'a>, ResolveError> {
    let mut tried = Vec::with_capacity(selector.strategies().len());

    for strategy in selector.strategies() {
        if let Some(m) = apply(snapshot, strategy) {
            return Ok(m);
        }
        tried.push(strategy.describe());
    }

    Err(ResolveError::NotFound { tried })
}

fn apply<'a>(snapshot: &'a Snapshot, strategy: &Strategy) -> Option<Match<'a>> {
    let nodes = &snapshot.nodes;
    match strategy {
        Strategy::ResourceId(id) => {
            at(nodes, strategy, find_index(nodes, |n| n.resource_id == *id)?)
        }
        Strategy::ResourceIdSuffix(suffix) => at(
            nodes,
            strategy,
            find_index(nodes, |n| {
                !n.resource_id.is_empty() && n.resource_id.ends_with(suffix.as_str())
            })?,
        ),
        Strategy::ContentDesc(desc) => {
            at(nodes, strategy, find_index(nodes, |n| n.content_desc == *desc)?)
        }
        Strategy::ContainedDesc(desc) => {
            let inner = find_index(nodes, |n| n.content_desc == *desc)?;
            let container = enclosing_clickable(nodes, inner)?;
            Some(Match {
                node: &nodes[inner],
                index: inner,
                strategy_used: strategy.kind(),
                tap_point: nodes[container].bounds.center(),
            })
        }
        Strategy::Text(text) => at(nodes, strategy, find_index(nodes, |n| n.text == *text)?),
        Strategy::TextContains(needle) => {
            let lowered = needle.to_lowercase();
            let index = find_index(nodes, |n| {
                !n.text.is_empty() && n.text.to_lowercase().contains(&lowered)
            })?;
            let tap_point = if nodes[index].bounds.is_empty() {
                preceding_anchor(nodes, index)?
            } else {
                nodes[index].bounds.center()
            };
            Some(Match {
                node: &nodes[index],
                index,
                strategy_used: strategy.kind(),
                tap_point,
            })
        }
        Strategy::FirstClickable => at(nodes, strategy, find_index(nodes, |n| n.clickable)?),
    }
}

fn find_index(nodes: &[Node], predicate: impl Fn(&Node) -> bool) -> Option<usize> {
    nodes.iter().position(predicate)
}

fn at<'a>(nodes: &'a [Node], strategy: &Strategy, index: usize) -> Option<Match<'a>> {
    Some(Match {
        node: &nodes[index],
        index,
        strategy_used: strategy.kind(),
        tap_point: nodes[index].bounds.center(),
    })
}

/// Smallest clickable node whose bounds fully enclose `nodes[inner]`.
/// Ties on area are broken by first occurrence in document order.
fn enclosing_clickable(nodes: &[Node], inner: usize) -> Option<usize> {
    let target = &nodes[inner].bounds;
    let mut best: Option<(usize, i64)> = None;
    for (i, n) in nodes.iter().enumerate() {
        if !n.clickable || !n.bounds.contains(target) {
            continue;
        }
        let area = n.bounds.area();
        match best {
            Some((_, best_area)) if area >= best_area => {}
            _ => best = Some((i, area)),
        }
    }
    best.map(|(i, _)| i)
}

/// Nearest preceding node in document order with usable bounds, used as a
/// best-effort anchor for text matches that carry no geometry of their own.
fn preceding_anchor(nodes: &[Node], index: usize) -> Option<(i32, i32)> {
    nodes[..index]
        .iter()
        .rev()
        .find(|n| !n.bounds.is_empty())
        .map(|n| n.bounds.center())
}

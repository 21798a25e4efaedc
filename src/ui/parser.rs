//! Tolerant parsing of uiautomator XML dumps into typed snapshots.
//!
//! The device emits one `<node …/>` tag per on-screen element. Dumps arrive
//! over an adb pipe and are routinely truncated or interleaved with shell
//! noise, so the parser never fails: fragments that cannot be made sense of
//! are skipped, and garbage input yields an empty snapshot that callers
//! treat as "no data yet".
//!
//! All downstream consumers (resolver, change detection, the inventory
//! printer) operate on the typed [`Node`] records produced here; none of
//! them re-scan the raw dump text.

use std::sync::OnceLock;

use regex::Regex;

use crate::ui::types::{Bounds, Node, Snapshot};

fn node_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b[^>]*>").expect("node tag pattern"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([a-zA-Z-]+)="([^"]*)""#).expect("attribute pattern"))
}

fn bounds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+),(\d+)\]\[(\d+),(\d+)\]").expect("bounds pattern"))
}

/// Parse a raw accessibility-tree dump into an ordered snapshot.
///
/// One linear pass over the element tags. An element is kept only if it has
/// a `class` attribute and a well-formed `bounds` attribute; missing boolean
/// attributes default to `false`.
pub fn parse(label: impl Into<String>, raw: &str) -> Snapshot {
    let mut nodes = Vec::new();

    for tag in node_tag_re().find_iter(raw) {
        if let Some(node) = parse_fragment(tag.as_str()) {
            nodes.push(node);
        }
    }

    Snapshot::new(label, nodes)
}

/// Parse the `[l,t][r,b]` bounds syntax. Malformed or inverted rectangles
/// are rejected.
pub fn parse_bounds(value: &str) -> Option<Bounds> {
    let caps = bounds_re().captures(value)?;
    let left = caps.get(1)?.as_str().parse().ok()?;
    let top = caps.get(2)?.as_str().parse().ok()?;
    let right = caps.get(3)?.as_str().parse().ok()?;
    let bottom = caps.get(4)?.as_str().parse().ok()?;
    Bounds::new(left, top, right, bottom)
}

fn parse_fragment(tag: &str) -> Option<Node> {
    let mut node = Node::default();
    let mut have_class = false;
    let mut have_bounds = false;

    for caps in attr_re().captures_iter(tag) {
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        match key {
            "class" => {
                node.class = value.to_string();
                have_class = !node.class.is_empty();
            }
            "resource-id" => node.resource_id = value.to_string(),
            "content-desc" => node.content_desc = value.to_string(),
            "text" => node.text = value.to_string(),
            "bounds" => {
                if let Some(bounds) = parse_bounds(value) {
                    node.bounds = bounds;
                    have_bounds = true;
                }
            }
            "clickable" => node.clickable = value == "true",
            "enabled" => node.enabled = value == "true",
            "focused" => node.focused = value == "true",
            _ => {}
        }
    }

    if have_class && have_bounds { Some(node) } else { None }
}

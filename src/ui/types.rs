// Core types for accessibility-tree snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rectangular screen region occupied by an element, in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Create bounds from the four corners. Returns `None` unless
    /// `left <= right` and `top <= bottom` with non-negative coordinates.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        if left < 0 || top < 0 || left > right || top > bottom {
            return None;
        }
        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Center point, floored to integer pixels. This is the tap target.
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// Whether `other` lies entirely inside these bounds.
    pub fn contains(&self, other: &Bounds) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn area(&self) -> i64 {
        i64::from(self.right - self.left) * i64::from(self.bottom - self.top)
    }

    /// Zero-area bounds carry no usable tap target.
    pub fn is_empty(&self) -> bool {
        self.left == self.right || self.top == self.bottom
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// One element of the accessibility tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Widget class (e.g. "android.widget.Button")
    pub class: String,

    /// Resource identifier, may be empty
    #[serde(default)]
    pub resource_id: String,

    /// Accessibility content description, may be empty
    #[serde(default)]
    pub content_desc: String,

    /// Visible text, may be empty
    #[serde(default)]
    pub text: String,

    /// Screen region occupied by the element
    pub bounds: Bounds,

    /// Whether the element accepts taps
    #[serde(default)]
    pub clickable: bool,

    /// Whether the element is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Whether the element currently holds input focus
    #[serde(default)]
    pub focused: bool,
}

impl Node {
    /// Stable identity string for diffing: resource id when present,
    /// otherwise class plus bounds.
    pub fn identity(&self) -> String {
        if self.resource_id.is_empty() {
            format!("{}@{}", self.class, self.bounds)
        } else {
            self.resource_id.clone()
        }
    }

    /// Short class name without the package prefix.
    pub fn short_class(&self) -> &str {
        self.class.rsplit('.').next().unwrap_or(&self.class)
    }
}

/// An immutable, ordered capture of the on-screen accessibility tree.
///
/// Snapshots are created fresh for each inspection and superseded, never
/// updated, by later captures. The caller that requested a snapshot owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Caller-supplied label (e.g. "ShareIngest:pre")
    pub label: String,

    /// Timestamp when the tree was dumped
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,

    /// Parsed nodes in document order
    pub nodes: Vec<Node>,
}

impl Snapshot {
    /// Create a snapshot from already-parsed nodes.
    pub fn new(label: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            label: label.into(),
            timestamp: Utc::now(),
            nodes,
        }
    }

    /// An empty snapshot means "no data yet", not an error; callers retry
    /// per their own backoff.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// One inventory line per node, capped at `limit` (0 = all). Used by the
    /// `inventory` command and by failure diagnostics.
    pub fn inventory(&self, limit: usize) -> Vec<String> {
        let take = if limit == 0 { self.nodes.len() } else { limit };
        self.nodes
            .iter()
            .enumerate()
            .take(take)
            .map(|(i, n)| {
                let text: String = n.text.chars().take(36).collect();
                format!(
                    "#{} id={} desc={} text={} cls={} b={} clk={}",
                    i,
                    dash_if_empty(&n.resource_id),
                    dash_if_empty(&n.content_desc),
                    dash_if_empty(&text),
                    n.short_class(),
                    n.bounds,
                    n.clickable,
                )
            })
            .collect()
    }

    /// Compact text sample for diagnostics, capped at `max_chars`.
    pub fn sample(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for line in self.inventory(0) {
            if out.len() + line.len() + 1 > max_chars {
                break;
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn dash_if_empty(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_center_floors() {
        let b = Bounds::new(0, 0, 101, 51).unwrap();
        assert_eq!(b.center(), (50, 25));
    }

    #[test]
    fn test_bounds_rejects_inverted() {
        assert!(Bounds::new(10, 0, 5, 20).is_none());
        assert!(Bounds::new(0, 30, 10, 20).is_none());
        assert!(Bounds::new(-1, 0, 5, 5).is_none());
    }

    #[test]
    fn test_bounds_contains() {
        let outer = Bounds::new(0, 0, 100, 100).unwrap();
        let inner = Bounds::new(10, 10, 20, 20).unwrap();
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
    }

    #[test]
    fn test_node_identity_prefers_resource_id() {
        let node = Node {
            class: "android.widget.Button".to_string(),
            resource_id: "app:id/go".to_string(),
            bounds: Bounds::new(0, 0, 10, 10).unwrap(),
            ..Default::default()
        };
        assert_eq!(node.identity(), "app:id/go");

        let anon = Node {
            class: "android.view.View".to_string(),
            bounds: Bounds::new(0, 0, 10, 10).unwrap(),
            ..Default::default()
        };
        assert_eq!(anon.identity(), "android.view.View@[0,0][10,10]");
    }

    #[test]
    fn test_snapshot_inventory_limit() {
        let nodes = (0..5)
            .map(|i| Node {
                class: "android.view.View".to_string(),
                text: format!("t{}", i),
                bounds: Bounds::default(),
                ..Default::default()
            })
            .collect();
        let snapshot = Snapshot::new("test", nodes);
        assert_eq!(snapshot.inventory(2).len(), 2);
        assert_eq!(snapshot.inventory(0).len(), 5);
    }
}

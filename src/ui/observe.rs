//! Snapshot observation metrics and change detection.
//!
//! An [`UiObservation`] reduces a snapshot to a handful of counters plus
//! caller-defined badge values; a [`ChangeSet`] is the signed delta between
//! two observations. A change is *significant* only when its magnitude
//! clears a fixed per-dimension threshold, which keeps list churn and
//! animation noise from registering as state transitions.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::ui::types::Snapshot;

/// Significance thresholds. A delta must exceed the threshold (strictly)
/// to register on that dimension.
pub const NODE_COUNT_THRESHOLD: i64 = 5;
pub const CLICKABLE_COUNT_THRESHOLD: i64 = 2;
pub const TEXT_COUNT_THRESHOLD: i64 = 3;
pub const ENABLED_BUTTON_THRESHOLD: i64 = 1;

/// Extracts one numeric "badge" value from node text, e.g. a credit
/// balance rendered as a glyph followed by digits.
#[derive(Debug, Clone)]
pub struct BadgeRule {
    pub name: String,
    pattern: Regex,
}

impl BadgeRule {
    /// Build a rule from a regex with a single numeric capture group.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Rule for a `<glyph> <digits>` counter, e.g. `glyph_counter("credits", "💎")`.
    pub fn glyph_counter(name: impl Into<String>, glyph: &str) -> Result<Self, regex::Error> {
        Self::new(name, &format!(r"{}\s*(\d+)", regex::escape(glyph)))
    }

    fn extract(&self, snapshot: &Snapshot) -> Option<i64> {
        snapshot.nodes.iter().find_map(|n| {
            let caps = self.pattern.captures(&n.text)?;
            caps.get(1)?.as_str().parse().ok()
        })
    }
}

/// Counters and badge values derived from one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct UiObservation {
    pub label: String,
    pub node_count: i64,
    pub clickable_count: i64,
    pub text_count: i64,
    pub enabled_button_count: i64,

    /// Badge values by rule name; `None` when the badge was not on screen
    pub badges: BTreeMap<String, Option<i64>>,

    /// Identity of the focused node, if any
    pub focused: Option<String>,
}

impl UiObservation {
    pub fn of(snapshot: &Snapshot, rules: &[BadgeRule]) -> Self {
        let badges = rules
            .iter()
            .map(|r| (r.name.clone(), r.extract(snapshot)))
            .collect();
        Self {
            label: snapshot.label.clone(),
            node_count: snapshot.nodes.len() as i64,
            clickable_count: snapshot.nodes.iter().filter(|n| n.clickable).count() as i64,
            text_count: snapshot.nodes.iter().filter(|n| !n.text.is_empty()).count() as i64,
            enabled_button_count: snapshot
                .nodes
                .iter()
                .filter(|n| n.enabled && n.class.to_lowercase().contains("button"))
                .count() as i64,
            badges,
            focused: snapshot
                .nodes
                .iter()
                .find(|n| n.focused)
                .map(|n| n.identity()),
        }
    }
}

/// How input focus moved between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusChange {
    Unchanged,
    GainedFocus,
    LostFocus,
    Changed,
}

/// Signed badge delta; `Unknown` when the badge was visible on only one
/// side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeDelta {
    Delta(i64),
    Unknown,
}

/// A dimension on which a change cleared its significance threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDimension {
    NodeCount,
    ClickableCount,
    TextCount,
    EnabledButtons,
    Badge(String),
    Focus,
}

/// Signed deltas between two observations.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    pub node_delta: i64,
    pub clickable_delta: i64,
    pub text_delta: i64,
    pub enabled_button_delta: i64,
    pub badge_deltas: BTreeMap<String, BadgeDelta>,
    pub focus: FocusChange,
}

impl ChangeSet {
    pub fn between(before: &UiObservation, after: &UiObservation) -> Self {
        let mut badge_deltas = BTreeMap::new();
        for (name, after_value) in &after.badges {
            let before_value = before.badges.get(name).copied().flatten();
            let delta = match (before_value, after_value) {
                (Some(b), Some(a)) => BadgeDelta::Delta(a - b),
                (None, None) => BadgeDelta::Delta(0),
                _ => BadgeDelta::Unknown,
            };
            badge_deltas.insert(name.clone(), delta);
        }

        let focus = match (&before.focused, &after.focused) {
            (a, b) if a == b => FocusChange::Unchanged,
            (Some(_), None) => FocusChange::LostFocus,
            (None, Some(_)) => FocusChange::GainedFocus,
            _ => FocusChange::Changed,
        };

        Self {
            node_delta: after.node_count - before.node_count,
            clickable_delta: after.clickable_count - before.clickable_count,
            text_delta: after.text_count - before.text_count,
            enabled_button_delta: after.enabled_button_count - before.enabled_button_count,
            badge_deltas,
            focus,
        }
    }

    /// Dimensions whose delta cleared the significance threshold.
    pub fn significant(&self) -> Vec<ChangeDimension> {
        let mut out = Vec::new();
        if self.node_delta.abs() > NODE_COUNT_THRESHOLD {
            out.push(ChangeDimension::NodeCount);
        }
        if self.clickable_delta.abs() > CLICKABLE_COUNT_THRESHOLD {
            out.push(ChangeDimension::ClickableCount);
        }
        if self.text_delta.abs() > TEXT_COUNT_THRESHOLD {
            out.push(ChangeDimension::TextCount);
        }
        if self.enabled_button_delta.abs() > ENABLED_BUTTON_THRESHOLD {
            out.push(ChangeDimension::EnabledButtons);
        }
        for (name, delta) in &self.badge_deltas {
            if matches!(delta, BadgeDelta::Delta(d) if *d != 0) {
                out.push(ChangeDimension::Badge(name.clone()));
            }
        }
        if self.focus != FocusChange::Unchanged {
            out.push(ChangeDimension::Focus);
        }
        out
    }

    pub fn is_significant(&self) -> bool {
        !self.significant().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::types::{Bounds, Node};

    fn snapshot_with(nodes: usize, texts: &[&str], focused: Option<&str>) -> Snapshot {
        let mut out = Vec::new();
        for i in 0..nodes {
            out.push(Node {
                class: "android.view.View".to_string(),
                bounds: Bounds::new(0, 0, 10, 10).unwrap(),
                text: texts.get(i).map(|s| s.to_string()).unwrap_or_default(),
                focused: focused.map(|f| f == format!("n{}", i)).unwrap_or(false),
                resource_id: format!("n{}", i),
                ..Default::default()
            });
        }
        Snapshot::new("t", out)
    }

    #[test]
    fn test_node_count_threshold() {
        let before = UiObservation::of(&snapshot_with(10, &[], None), &[]);
        let six_more = UiObservation::of(&snapshot_with(16, &[], None), &[]);
        let three_more = UiObservation::of(&snapshot_with(13, &[], None), &[]);

        let big = ChangeSet::between(&before, &six_more);
        assert_eq!(big.node_delta, 6);
        assert_eq!(big.significant(), vec![ChangeDimension::NodeCount]);

        let small = ChangeSet::between(&before, &three_more);
        assert_eq!(small.node_delta, 3);
        assert!(!small.is_significant());
    }

    #[test]
    fn test_badge_extraction_and_delta() {
        let rule = BadgeRule::glyph_counter("credits", "💎").unwrap();
        let before = UiObservation::of(&snapshot_with(3, &["💎 12"], None), &[rule.clone()]);
        let after = UiObservation::of(&snapshot_with(3, &["💎 9"], None), &[rule]);

        assert_eq!(before.badges["credits"], Some(12));
        let changes = ChangeSet::between(&before, &after);
        assert_eq!(changes.badge_deltas["credits"], BadgeDelta::Delta(-3));
        assert_eq!(
            changes.significant(),
            vec![ChangeDimension::Badge("credits".to_string())]
        );
    }

    #[test]
    fn test_badge_missing_on_one_side_is_unknown_not_significant() {
        let rule = BadgeRule::glyph_counter("credits", "💎").unwrap();
        let before = UiObservation::of(&snapshot_with(3, &["💎 12"], None), &[rule.clone()]);
        let after = UiObservation::of(&snapshot_with(3, &[], None), &[rule]);

        let changes = ChangeSet::between(&before, &after);
        assert_eq!(changes.badge_deltas["credits"], BadgeDelta::Unknown);
        assert!(!changes.is_significant());
    }

    #[test]
    fn test_focus_classification() {
        let none = UiObservation::of(&snapshot_with(3, &[], None), &[]);
        let on_first = UiObservation::of(&snapshot_with(3, &[], Some("n0")), &[]);
        let on_second = UiObservation::of(&snapshot_with(3, &[], Some("n1")), &[]);

        assert_eq!(ChangeSet::between(&none, &none).focus, FocusChange::Unchanged);
        assert_eq!(
            ChangeSet::between(&none, &on_first).focus,
            FocusChange::GainedFocus
        );
        assert_eq!(
            ChangeSet::between(&on_first, &none).focus,
            FocusChange::LostFocus
        );
        assert_eq!(
            ChangeSet::between(&on_first, &on_second).focus,
            FocusChange::Changed
        );
    }
}

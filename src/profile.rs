//! Application profile: what the app under test looks like.
//!
//! Element selector tables and journey step lists drift with the
//! application's UI, so they live here as configuration data owned by the
//! app profile rather than being hard-coded in the engine. Swapping the
//! profile retargets the whole harness at a different build or app.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::journey::{Action, Expectation, Journey, JourneyStep};
use crate::ui::{BadgeRule, Selector};

/// Identity and UI vocabulary of the application under test.
#[derive(Debug)]
pub struct AppProfile {
    /// Application package (e.g. "com.example.capture")
    pub package: String,

    /// Main activity class, relative to the package
    pub main_activity: String,

    /// Share-ingest activity class, relative to the package
    pub share_activity: String,

    elements: BTreeMap<String, Selector>,
    badge_rules: Vec<BadgeRule>,
    log_context: String,
}

impl AppProfile {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            main_activity: ".MainActivity".to_string(),
            share_activity: ".ShareIngestActivity".to_string(),
            elements: BTreeMap::new(),
            badge_rules: Vec::new(),
            log_context: "(intent|ingest|share|capture|processing)".to_string(),
        }
    }

    pub fn main_activity(mut self, activity: impl Into<String>) -> Self {
        self.main_activity = activity.into();
        self
    }

    pub fn share_activity(mut self, activity: impl Into<String>) -> Self {
        self.share_activity = activity.into();
        self
    }

    /// Register a named element selector.
    pub fn element(mut self, name: impl Into<String>, selector: Selector) -> Self {
        self.elements.insert(name.into(), selector);
        self
    }

    pub fn badge_rule(mut self, rule: BadgeRule) -> Self {
        self.badge_rules.push(rule);
        self
    }

    /// Set the logcat filter used for forensic log tails.
    pub fn log_context_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.log_context = pattern.into();
        self
    }

    pub fn main_component(&self) -> String {
        format!("{}/{}", self.package, self.main_activity)
    }

    pub fn share_component(&self) -> String {
        format!("{}/{}", self.package, self.share_activity)
    }

    pub fn selector(&self, name: &str) -> Option<&Selector> {
        self.elements.get(name)
    }

    /// Expectation for a named element. Unknown names produce an empty
    /// selector that never resolves, which surfaces in diagnostics as a
    /// missing component instead of panicking mid-journey.
    pub fn expectation(&self, name: &str) -> Expectation {
        Expectation::new(name, self.elements.get(name).cloned().unwrap_or_default())
    }

    pub fn badge_rules(&self) -> &[BadgeRule] {
        &self.badge_rules
    }

    pub fn log_context(&self) -> &str {
        &self.log_context
    }

    /// Profile for the stock share-capture demo app.
    pub fn demo(package: impl Into<String>) -> Self {
        let package = package.into();
        let id = |suffix: &str| format!("{}:id/{}", package, suffix);

        Self::new(package.clone())
            .element(
                "MainScreen",
                Selector::new()
                    .resource_id(id("main_container"))
                    .resource_id_suffix("id/main_container")
                    .content_desc("Main screen"),
            )
            .element(
                "NavigationHost",
                Selector::new()
                    .resource_id(id("nav_host"))
                    .resource_id_suffix("id/nav_host"),
            )
            .element(
                "CaptureSheet",
                Selector::new()
                    .resource_id(id("capture_sheet"))
                    .content_desc("Capture sheet")
                    .text_contains("capture"),
            )
            .element(
                "ProcessingStatus",
                Selector::new()
                    .resource_id_suffix("id/processing_status")
                    .text("Processing")
                    .text_contains("pending"),
            )
            .element(
                "QuickScan",
                Selector::new()
                    .resource_id(id("quick_scan"))
                    .text("Quick Scan")
                    .contained_desc("Quick Scan"),
            )
            .badge_rule(
                BadgeRule::glyph_counter("credits", "💎").expect("credits badge pattern"),
            )
            .log_context_pattern(
                "(intent|ingest|share|capture|processing|REQUEST_SUBMITTED|quick.?scan)",
            )
    }
}

/// The built-in journey suite, in canonical execution order. Later
/// journeys assume the device state earlier journeys produced.
pub fn builtin_journeys(profile: &AppProfile, url: &str) -> Vec<Journey> {
    vec![
        Journey::new("AppLaunch", "launch the app and land on the main screen").step(
            JourneyStep::new("launch", Action::LaunchApp)
                .postcondition(profile.expectation("MainScreen"))
                .postcondition(profile.expectation("NavigationHost")),
        ),
        Journey::new("ShareIngest", "deliver a share intent and reach the capture sheet")
            .step(
                JourneyStep::new(
                    "deliver-intent",
                    Action::ShareText {
                        text: url.to_string(),
                    },
                )
                .precondition(profile.expectation("MainScreen"))
                .postcondition(profile.expectation("CaptureSheet")),
            )
            .step(JourneyStep::new(
                "confirm-receipt",
                Action::WaitForLogPattern {
                    pattern: "(intent|ingest|share|REQUEST_SUBMITTED)".to_string(),
                    timeout_ms: 15_000,
                },
            )),
        Journey::new("MediaProcessing", "kick off a quick scan and observe processing")
            .step(
                JourneyStep::new(
                    "choose-quick-scan",
                    Action::TapAny {
                        candidates: vec![
                            profile
                                .selector("QuickScan")
                                .cloned()
                                .unwrap_or_default(),
                            Selector::new().first_clickable(),
                        ],
                    },
                )
                .precondition(profile.expectation("CaptureSheet"))
                .postcondition(profile.expectation("ProcessingStatus"))
                .timeout(Duration::from_secs(20)),
            )
            .step(JourneyStep::new(
                "processing-signal",
                Action::WaitForLogPattern {
                    pattern: "(processing|transcribing|REQUEST_SUBMITTED|status)".to_string(),
                    timeout_ms: 20_000,
                },
            )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_profile_components() {
        let profile = AppProfile::demo("com.example.capture");
        assert_eq!(
            profile.main_component(),
            "com.example.capture/.MainActivity"
        );
        assert_eq!(
            profile.share_component(),
            "com.example.capture/.ShareIngestActivity"
        );
        assert!(profile.selector("MainScreen").is_some());
        assert!(profile.selector("Nope").is_none());
    }

    #[test]
    fn test_unknown_expectation_never_resolves() {
        let profile = AppProfile::demo("com.example.capture");
        let expectation = profile.expectation("Nope");
        assert_eq!(expectation.component, "Nope");
        assert!(expectation.selector.is_empty());
    }

    #[test]
    fn test_builtin_journeys_order() {
        let profile = AppProfile::demo("com.example.capture");
        let journeys = builtin_journeys(&profile, "https://example.com/v/1");
        let names: Vec<&str> = journeys.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["AppLaunch", "ShareIngest", "MediaProcessing"]);
        // The share step carries the target URL into the intent.
        match &journeys[1].steps[0].action {
            Action::ShareText { text } => assert_eq!(text, "https://example.com/v/1"),
            other => panic!("unexpected action: {:?}", other),
        }
    }
}

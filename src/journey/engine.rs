//! Journey execution state machine.
//!
//! Each step moves through `NotStarted → PreconditionChecked →
//! ActionPerformed → PostconditionChecked → Passed | Failed`. Precondition
//! and postcondition checks get exactly one backoff-and-recheck; beyond
//! that, a missing precondition is a critical error that aborts the whole
//! journey, while a missing postcondition is a recorded diagnostic folded
//! into the journey's overall result. Higher-level recovery happens across
//! runs via the result store, never via in-process journey retries.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config;
use crate::context::RunContext;
use crate::device::{Device, DeviceGateway, Logcat};
use crate::journey::types::{
    Action, Expectation, Journey, JourneyOutcome, JourneyStep, StepOutcome, StepPhase, StepState,
};
use crate::profile::AppProfile;
use crate::ui::{ChangeSet, Snapshot, UiObservation, resolve};
use crate::wait::poll_until;

/// Engine timing, defaulted from the global configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Backoff before the single expectation recheck
    pub backoff: Duration,
    /// Poll interval for settle waits
    pub poll_interval: Duration,
    /// Deadline for the post-launch window-focus wait
    pub focus_timeout: Duration,
    /// Cap on the post-action settle wait
    pub settle_timeout: Duration,
    /// How many logcat lines a forensic bundle keeps
    pub forensic_log_lines: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let timing = &config::get().timing;
        Self {
            backoff: Duration::from_millis(timing.step_backoff_ms),
            poll_interval: Duration::from_millis(timing.poll_interval_ms),
            focus_timeout: Duration::from_millis(timing.wait_timeout_ms),
            settle_timeout: Duration::from_millis(timing.wait_timeout_ms),
            forensic_log_lines: 400,
        }
    }
}

struct ExpectationCheck {
    missing: Vec<String>,
    snapshot: Snapshot,
}

impl ExpectationCheck {
    fn ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Drives journeys against one device.
pub struct JourneyEngine<'a> {
    gateway: &'a dyn DeviceGateway,
    profile: &'a AppProfile,
    settings: EngineSettings,
}

impl<'a> JourneyEngine<'a> {
    pub fn new(gateway: &'a dyn DeviceGateway, profile: &'a AppProfile) -> Self {
        Self {
            gateway,
            profile,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    fn device(&self) -> Device<'a> {
        Device::new(self.gateway)
    }

    /// Execute one journey to a terminal state.
    pub fn run_journey(&self, ctx: &mut RunContext, journey: &Journey) -> JourneyOutcome {
        info!(journey = %journey.name, "starting journey: {}", journey.description);

        let mut steps: Vec<StepOutcome> = Vec::new();
        let mut passed = true;
        let mut aborted = false;
        let mut journey_error = None;
        let mut forensics_captured = false;

        for step in &journey.steps {
            let tag = format!("{}:{}", journey.name, step.name);
            let mut outcome = StepOutcome::not_started(&step.name);

            // Preconditions: one backoff-and-recheck, then abort.
            let pre = self.check_expectations(ctx, &tag, StepPhase::Precondition, &step.preconditions);
            if !pre.ok() {
                let message = format!("{}: missing {}", tag, pre.missing.join(", "));
                ctx.record_critical("Precondition Failed", message.as_str(), journey.name.as_str());
                self.capture_forensics(ctx, &format!("{}-pre", tag));
                forensics_captured = true;
                outcome.state = StepState::Failed;
                outcome.error = Some(message.clone());
                steps.push(outcome);
                passed = false;
                aborted = true;
                journey_error = Some(message);
                break;
            }
            outcome.precondition_ok = true;
            outcome.state = StepState::PreconditionChecked;

            // Baseline for the post-action settle wait. Steps without
            // preconditions have no snapshot yet, so dump one.
            let baseline = if step.action.changes_ui() {
                let snapshot = if step.preconditions.is_empty() {
                    self.snapshot_or_empty(ctx, &format!("{}:baseline", tag))
                } else {
                    pre.snapshot
                };
                Some(UiObservation::of(&snapshot, self.profile.badge_rules()))
            } else {
                None
            };

            // Action: device side effects, not retried by this layer.
            match self.perform(ctx, step) {
                Ok(()) => {
                    outcome.action_ok = true;
                    outcome.state = StepState::ActionPerformed;
                    if let Some(baseline) = &baseline {
                        let deadline = step.timeout.min(self.settings.settle_timeout);
                        self.wait_for_settle(ctx, &tag, baseline, deadline);
                    }
                }
                Err(message) => {
                    let message = format!("{}: {}", tag, message);
                    ctx.record_critical("Action Failed", message.as_str(), journey.name.as_str());
                    self.capture_forensics(ctx, &format!("{}-action", tag));
                    forensics_captured = true;
                    outcome.state = StepState::Failed;
                    outcome.error = Some(message.clone());
                    steps.push(outcome);
                    passed = false;
                    aborted = true;
                    journey_error = Some(message);
                    break;
                }
            }

            // Postconditions: same recheck policy, but a persistent miss is
            // a diagnostic, not an abort.
            let post = self.check_expectations(ctx, &tag, StepPhase::Postcondition, &step.postconditions);
            outcome.state = StepState::PostconditionChecked;
            if post.ok() {
                outcome.postcondition_ok = true;
                outcome.state = StepState::Passed;
            } else {
                let expected = step
                    .postconditions
                    .iter()
                    .map(|e| e.component.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let observed = format!("missing: {}", post.missing.join(", "));
                ctx.record_step_failure(
                    tag.as_str(),
                    expected.as_str(),
                    observed.as_str(),
                    post.snapshot.sample(2000),
                );
                outcome.state = StepState::Failed;
                outcome.error = Some(observed);
                passed = false;
            }
            steps.push(outcome);
        }

        if !passed && !forensics_captured {
            self.capture_forensics(ctx, &format!("{}-failed", journey.name));
        }

        let outcome = JourneyOutcome {
            journey: journey.name.clone(),
            passed,
            aborted,
            steps,
            error: journey_error,
        };
        if outcome.passed {
            info!(journey = %journey.name, "journey passed");
        } else {
            warn!(journey = %journey.name, aborted, "journey failed");
        }
        outcome
    }

    /// Resolve every expectation against a fresh snapshot; on a miss, wait
    /// one backoff interval and recheck exactly once.
    fn check_expectations(
        &self,
        ctx: &RunContext,
        tag: &str,
        phase: StepPhase,
        expectations: &[Expectation],
    ) -> ExpectationCheck {
        if expectations.is_empty() {
            return ExpectationCheck {
                missing: Vec::new(),
                snapshot: Snapshot::new(format!("{}:{}", tag, phase), Vec::new()),
            };
        }

        let first = self.check_once(ctx, tag, phase, expectations);
        if first.ok() {
            return first;
        }
        debug!(%tag, %phase, missing = ?first.missing, "expectations missing, backing off for recheck");
        if !ctx.cancel.sleep(self.settings.backoff) {
            return first;
        }
        self.check_once(ctx, tag, phase, expectations)
    }

    fn check_once(
        &self,
        ctx: &RunContext,
        tag: &str,
        phase: StepPhase,
        expectations: &[Expectation],
    ) -> ExpectationCheck {
        let snapshot = self.snapshot_or_empty(ctx, &format!("{}:{}", tag, phase));
        let missing = expectations
            .iter()
            .filter(|e| resolve(&snapshot, &e.selector).is_err())
            .map(|e| e.component.clone())
            .collect();
        ExpectationCheck { missing, snapshot }
    }

    fn snapshot_or_empty(&self, ctx: &RunContext, label: &str) -> Snapshot {
        match self.device().snapshot(label, &ctx.cancel) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%label, %err, "hierarchy dump failed");
                Snapshot::new(label, Vec::new())
            }
        }
    }

    fn perform(&self, ctx: &RunContext, step: &JourneyStep) -> Result<(), String> {
        let device = self.device();
        match &step.action {
            Action::LaunchApp => {
                let component = self.profile.main_component();
                if !device.launch_activity(&component) {
                    return Err(format!("launch command failed for {}", component));
                }
                // First frames after a launch can be empty; give the window
                // a chance to take focus before validating anything.
                if !device.wait_until_focused(
                    &self.profile.package,
                    self.settings.focus_timeout,
                    &ctx.cancel,
                ) {
                    warn!(package = %self.profile.package, "window not focused within timeout, proceeding");
                }
                Ok(())
            }
            Action::ShareText { text } => {
                let component = self.profile.share_component();
                if device.share_text(&component, text) {
                    Ok(())
                } else {
                    Err(format!("share intent failed for {}", component))
                }
            }
            Action::Tap { selector } => {
                let snapshot = self.snapshot_or_empty(ctx, &format!("{}:tap", step.name));
                let found = resolve(&snapshot, selector).map_err(|e| e.to_string())?;
                debug!(
                    strategy = found.strategy_used,
                    x = found.tap_point.0,
                    y = found.tap_point.1,
                    "tapping resolved element"
                );
                if device.tap(found.tap_point.0, found.tap_point.1) {
                    Ok(())
                } else {
                    Err("tap command failed".to_string())
                }
            }
            Action::TapAny { candidates } => {
                let snapshot = self.snapshot_or_empty(ctx, &format!("{}:tap-any", step.name));
                for selector in candidates {
                    if let Ok(found) = resolve(&snapshot, selector) {
                        debug!(strategy = found.strategy_used, "tapping first matching candidate");
                        return if device.tap(found.tap_point.0, found.tap_point.1) {
                            Ok(())
                        } else {
                            Err("tap command failed".to_string())
                        };
                    }
                }
                Err(format!(
                    "none of {} candidate selectors resolved",
                    candidates.len()
                ))
            }
            Action::TypeText { text } => {
                if device.type_text(text) {
                    Ok(())
                } else {
                    Err("text input command failed".to_string())
                }
            }
            Action::KeyEvent { code } => {
                if device.key_event(*code) {
                    Ok(())
                } else {
                    Err(format!("key event {} failed", code))
                }
            }
            Action::WaitForLogPattern { pattern, timeout_ms } => {
                let logcat = Logcat::new(self.gateway);
                let outcome = logcat.wait_for_pattern(
                    pattern,
                    Duration::from_millis(*timeout_ms),
                    &ctx.cancel,
                );
                if outcome.found {
                    Ok(())
                } else {
                    for line in outcome.value.unwrap_or_default() {
                        debug!("log context: {}", line);
                    }
                    Err(format!(
                        "log pattern '{}' not seen within {}ms",
                        pattern, timeout_ms
                    ))
                }
            }
            Action::Sleep { millis } => {
                if ctx.cancel.sleep(Duration::from_millis(*millis)) {
                    Ok(())
                } else {
                    Err("cancelled".to_string())
                }
            }
        }
    }

    /// After a UI-affecting action, poll until the tree shows a significant
    /// change from the pre-action baseline. Overrunning the deadline is
    /// reported and ignored; the postconditions decide severity.
    fn wait_for_settle(
        &self,
        ctx: &RunContext,
        tag: &str,
        baseline: &UiObservation,
        timeout: Duration,
    ) {
        let outcome = poll_until(
            || {
                let snapshot = self.snapshot_or_empty(ctx, tag);
                if snapshot.is_empty() {
                    return None;
                }
                let now = UiObservation::of(&snapshot, self.profile.badge_rules());
                let changes = ChangeSet::between(baseline, &now);
                changes.is_significant().then_some(changes)
            },
            timeout,
            self.settings.poll_interval,
            &ctx.cancel,
        );

        match outcome.value {
            Some(changes) => debug!(
                %tag,
                dimensions = ?changes.significant(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "UI settled after action"
            ),
            None => debug!(%tag, "no significant UI change observed after action"),
        }
    }

    /// Capture a forensic bundle: UI dump and screenshot under `ui/`, a
    /// filtered log tail under `logs/`. Parts are captured independently;
    /// one failing does not prevent the others.
    fn capture_forensics(&self, ctx: &RunContext, tag: &str) {
        info!(%tag, "capturing forensic bundle");

        match self.device().dump_hierarchy(&ctx.cancel) {
            Ok(raw) => {
                let path = ctx.session.ui_path("dump", tag, "xml");
                if let Err(err) = std::fs::write(&path, &raw) {
                    warn!(%err, "failed to write hierarchy dump artifact");
                }
            }
            Err(err) => warn!(%err, "hierarchy dump unavailable for forensics"),
        }

        match self.gateway.screenshot() {
            Ok(bytes) if !bytes.is_empty() => {
                match image::load_from_memory(&bytes) {
                    Ok(img) => {
                        let (width, height) = image::GenericImageView::dimensions(&img);
                        debug!(width, height, "screenshot captured");
                    }
                    Err(err) => warn!(%err, "screenshot bytes are not a decodable image"),
                }
                let path = ctx.session.ui_path("screen", tag, "png");
                if let Err(err) = std::fs::write(&path, &bytes) {
                    warn!(%err, "failed to write screenshot artifact");
                }
            }
            Ok(_) => warn!("screenshot returned no data"),
            Err(err) => warn!(%err, "screenshot unavailable for forensics"),
        }

        let logcat = Logcat::new(self.gateway);
        if let Err(err) = logcat.save_recent(
            self.profile.log_context(),
            &ctx.session.log_path(tag),
            self.settings.forensic_log_lines,
        ) {
            warn!(%err, "failed to write log tail artifact");
        }
    }
}

impl Action {
    /// Whether the action is expected to change what is on screen.
    fn changes_ui(&self) -> bool {
        !matches!(
            self,
            Action::WaitForLogPattern { .. } | Action::Sleep { .. }
        )
    }
}

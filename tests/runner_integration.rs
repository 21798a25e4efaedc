//! End-to-end tests for the journey engine and smart runner, driven
//! against a scripted device gateway.

use std::time::Duration;

use pretty_assertions::assert_eq;

use droid_journey::context::RunContext;
use droid_journey::journey::{Action, EngineSettings, Journey, JourneyEngine, JourneyStep};
use droid_journey::profile::{AppProfile, builtin_journeys};
use droid_journey::runner::SmartRunner;
use droid_journey::session::Session;
use droid_journey::store::{StrategyKind, TestResultStore};
use droid_journey::device::ScriptedGateway;

const PKG: &str = "com.example.capture";

/// Full demo-app UI: main screen, navigation host, capture sheet with the
/// quick-scan button, and a processing row.
fn full_ui() -> String {
    format!(
        r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node class="android.widget.FrameLayout" resource-id="{p}:id/main_container" text="" content-desc="" bounds="[0,0][1080,1920]" clickable="false" enabled="true" />
  <node class="android.view.View" resource-id="{p}:id/nav_host" text="" content-desc="" bounds="[0,60][1080,1920]" clickable="false" enabled="true" />
  <node class="android.widget.LinearLayout" resource-id="{p}:id/capture_sheet" text="" content-desc="Capture sheet" bounds="[0,900][1080,1920]" clickable="false" enabled="true" />
  <node class="android.widget.Button" resource-id="{p}:id/quick_scan" text="Quick Scan" content-desc="" bounds="[100,1000][500,1100]" clickable="true" enabled="true" />
  <node class="android.widget.TextView" resource-id="{p}:id/processing_status" text="Processing" content-desc="" bounds="[0,1200][1080,1260]" clickable="false" enabled="true" />
</hierarchy>"#,
        p = PKG
    )
}

/// Bare UI: only the main screen and navigation host.
fn bare_ui() -> String {
    format!(
        r#"<?xml version='1.0'?>
<hierarchy>
  <node class="android.widget.FrameLayout" resource-id="{p}:id/main_container" text="" content-desc="" bounds="[0,0][1080,1920]" clickable="false" enabled="true" />
  <node class="android.view.View" resource-id="{p}:id/nav_host" text="" content-desc="" bounds="[0,60][1080,1920]" clickable="false" enabled="true" />
</hierarchy>"#,
        p = PKG
    )
}

fn fast_settings() -> EngineSettings {
    EngineSettings {
        backoff: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
        focus_timeout: Duration::from_millis(100),
        settle_timeout: Duration::from_millis(30),
        forensic_log_lines: 50,
    }
}

fn scripted_device(ui: String) -> ScriptedGateway {
    ScriptedGateway::new()
        .stub("uiautomator dump", ui)
        .stub(
            "dumpsys window windows",
            format!("  mCurrentFocus=Window{{1 u0 {p}/{p}.MainActivity}}", p = PKG),
        )
        .stub("logcat -d", "06-01 10:00:00.000 I/CaptureService: REQUEST_SUBMITTED id=7")
}

fn test_context(dir: &std::path::Path) -> RunContext {
    let session = Session::in_dir(dir.join("artifacts"));
    session.init().unwrap();
    RunContext::new(session)
}

#[test]
fn test_full_suite_passes_against_healthy_device() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = scripted_device(full_ui());
    let profile = AppProfile::demo(PKG);
    let journeys = builtin_journeys(&profile, "https://example.com/v/1");

    let mut ctx = test_context(dir.path());
    let store = TestResultStore::new(dir.path().join("history.json"), ctx.run_id.clone());

    let report = SmartRunner::new(&gateway, &profile, store)
        .engine_settings(fast_settings())
        .run(&mut ctx, &journeys)
        .unwrap();

    assert!(report.success, "report: {:?}", report.results);
    assert_eq!(report.strategy.kind, StrategyKind::Full);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.success));
    assert!(report.critical_errors.is_empty());

    // The suite actually drove the device.
    assert!(gateway.saw("am start -W -n com.example.capture/.MainActivity"));
    assert!(gateway.saw("android.intent.action.SEND"));
    assert!(gateway.saw("input tap"));

    // History was persisted for the next run.
    assert!(dir.path().join("history.json").exists());
}

#[test]
fn test_resume_from_failed_runs_suffix_only() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");

    // Previous run: C failed among A..E.
    let mut seed = TestResultStore::new(&history, "run_0");
    seed.load_history();
    for name in ["A", "B", "D", "E"] {
        seed.record_result(name, true, None, Duration::from_millis(5));
    }
    seed.record_result("C", false, Some("boom"), Duration::from_millis(5));
    seed.persist().unwrap();

    // Journeys with no steps pass vacuously; this test is about ordering.
    let journeys: Vec<Journey> = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|n| Journey::new(*n, ""))
        .collect();

    let gateway = ScriptedGateway::new();
    let profile = AppProfile::demo(PKG);
    let mut ctx = test_context(dir.path());
    let store = TestResultStore::new(&history, ctx.run_id.clone());

    let report = SmartRunner::new(&gateway, &profile, store)
        .engine_settings(fast_settings())
        .run(&mut ctx, &journeys)
        .unwrap();

    assert_eq!(report.strategy.kind, StrategyKind::ResumeFromFailed);
    assert_eq!(
        report.strategy.tests_to_run,
        vec!["C".to_string(), "D".to_string(), "E".to_string()]
    );
    let ran: Vec<&str> = report.results.iter().map(|r| r.test_name.as_str()).collect();
    assert_eq!(ran, vec!["C", "D", "E"]);
    assert!(report.success);
}

#[test]
fn test_force_full_bypasses_resumption() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");

    let mut seed = TestResultStore::new(&history, "run_0");
    seed.load_history();
    seed.record_result("B", false, Some("boom"), Duration::from_millis(5));
    seed.persist().unwrap();

    let journeys: Vec<Journey> = ["A", "B"].iter().map(|n| Journey::new(*n, "")).collect();
    let gateway = ScriptedGateway::new();
    let profile = AppProfile::demo(PKG);
    let mut ctx = test_context(dir.path());
    let store = TestResultStore::new(&history, ctx.run_id.clone());

    let report = SmartRunner::new(&gateway, &profile, store)
        .engine_settings(fast_settings())
        .force_full(true)
        .run(&mut ctx, &journeys)
        .unwrap();

    assert_eq!(report.strategy.kind, StrategyKind::Full);
    assert_eq!(report.results.len(), 2);
}

#[test]
fn test_first_failure_terminates_run_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");

    // "Blocked" needs the capture sheet, which the bare UI never shows;
    // its tap action must never run.
    let journeys = vec![
        Journey::new("Healthy", ""),
        Journey::new("Blocked", "").step(
            JourneyStep::new(
                "open-sheet",
                Action::Tap {
                    selector: droid_journey::Selector::new().text("Quick Scan"),
                },
            )
            .precondition(AppProfile::demo(PKG).expectation("CaptureSheet")),
        ),
        Journey::new("NeverReached", ""),
    ];

    let gateway = scripted_device(bare_ui());
    let profile = AppProfile::demo(PKG);
    let mut ctx = test_context(dir.path());
    let store = TestResultStore::new(&history, ctx.run_id.clone());

    let report = SmartRunner::new(&gateway, &profile, store)
        .engine_settings(fast_settings())
        .run(&mut ctx, &journeys)
        .unwrap();

    assert!(!report.success);
    let ran: Vec<&str> = report.results.iter().map(|r| r.test_name.as_str()).collect();
    assert_eq!(ran, vec!["Healthy", "Blocked"], "fail-fast skips NeverReached");

    // The blocked journey aborted before its action.
    assert!(!gateway.saw("input tap"));
    assert!(ctx.has_critical_errors());

    // History reflects the aborted run.
    let mut reloaded = TestResultStore::new(&history, "run_next");
    let summary = reloaded.load_history();
    assert!(summary.has_previous);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(reloaded.failed_from_previous(), vec!["Blocked".to_string()]);

    // A forensic bundle landed in the ui/ artifact directory.
    let ui_files = std::fs::read_dir(ctx.session.ui_dir()).unwrap().count();
    assert!(ui_files > 0, "expected forensic artifacts under ui/");
}

#[test]
fn test_precondition_recovers_on_single_recheck() {
    let dir = tempfile::tempdir().unwrap();

    // First dump misses the capture sheet; the recheck after one backoff
    // sees it.
    let gateway = ScriptedGateway::new()
        .stub("uiautomator dump", bare_ui())
        .stub("uiautomator dump", full_ui());
    let profile = AppProfile::demo(PKG);

    let journey = Journey::new("SheetAppears", "").step(
        JourneyStep::new("wait-for-sheet", Action::Sleep { millis: 1 })
            .precondition(profile.expectation("CaptureSheet")),
    );

    let mut ctx = test_context(dir.path());
    let engine = JourneyEngine::new(&gateway, &profile).with_settings(fast_settings());
    let outcome = engine.run_journey(&mut ctx, &journey);

    assert!(outcome.passed);
    assert!(!outcome.aborted);
    assert!(!ctx.has_critical_errors());
}

#[test]
fn test_unresolvable_precondition_aborts_without_action() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = scripted_device(bare_ui());
    let profile = AppProfile::demo(PKG);

    let journey = Journey::new("Stuck", "")
        .step(
            JourneyStep::new(
                "needs-sheet",
                Action::Tap {
                    selector: droid_journey::Selector::new().text("Quick Scan"),
                },
            )
            .precondition(profile.expectation("CaptureSheet")),
        )
        .step(JourneyStep::new("later", Action::Sleep { millis: 1 }));

    let mut ctx = test_context(dir.path());
    let engine = JourneyEngine::new(&gateway, &profile).with_settings(fast_settings());
    let outcome = engine.run_journey(&mut ctx, &journey);

    assert!(!outcome.passed);
    assert!(outcome.aborted);
    // Only the first step appears; the journey never reached "later".
    assert_eq!(outcome.steps.len(), 1);
    assert!(ctx.has_critical_errors());
    assert!(!gateway.saw("input tap"));
}

#[test]
fn test_postcondition_failure_is_nonfatal_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = scripted_device(bare_ui());
    let profile = AppProfile::demo(PKG);

    let journey = Journey::new("SoftMiss", "")
        .step(
            JourneyStep::new("hope-for-sheet", Action::Sleep { millis: 1 })
                .postcondition(profile.expectation("CaptureSheet")),
        )
        .step(JourneyStep::new("still-runs", Action::Sleep { millis: 1 }));

    let mut ctx = test_context(dir.path());
    let engine = JourneyEngine::new(&gateway, &profile).with_settings(fast_settings());
    let outcome = engine.run_journey(&mut ctx, &journey);

    // Both steps executed; the journey folds the miss into its result.
    assert_eq!(outcome.steps.len(), 2);
    assert!(!outcome.passed);
    assert!(!outcome.aborted);
    assert!(!ctx.has_critical_errors());
    assert_eq!(ctx.step_failures().len(), 1);
    assert_eq!(ctx.step_failures()[0].step, "SoftMiss:hope-for-sheet");
}

#[test]
fn test_tap_any_stops_at_first_resolving_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = scripted_device(full_ui());
    let profile = AppProfile::demo(PKG);

    let journey = Journey::new("PickButton", "").step(JourneyStep::new(
        "tap-variant",
        Action::TapAny {
            candidates: vec![
                droid_journey::Selector::new().resource_id("com.example.capture:id/missing"),
                droid_journey::Selector::new().text("Quick Scan"),
                droid_journey::Selector::new().first_clickable(),
            ],
        },
    ));

    let mut ctx = test_context(dir.path());
    let engine = JourneyEngine::new(&gateway, &profile).with_settings(fast_settings());
    let outcome = engine.run_journey(&mut ctx, &journey);

    assert!(outcome.passed);
    // The quick-scan button's center, not the first clickable's.
    assert!(gateway.saw("input tap 300 1050"));
}

//! Droid Journey - Android UI journey testing over adb.
//!
//! This crate provides:
//! - Typed parsing of uiautomator accessibility-tree dumps
//! - Multi-strategy element resolution with computed tap points
//! - UI change detection with bounded, cancellable waits
//! - A journey state machine with step-level pre/post validation and
//!   forensic capture on failure
//! - A smart runner that resumes from the previous run's earliest failure
//!   and persists per-test history across runs
//!
//! # Example
//!
//! ```rust,no_run
//! use droid_journey::context::RunContext;
//! use droid_journey::device::AdbGateway;
//! use droid_journey::profile::{AppProfile, builtin_journeys};
//! use droid_journey::runner::SmartRunner;
//! use droid_journey::session::Session;
//! use droid_journey::store::TestResultStore;
//!
//! let gateway = AdbGateway::new("adb");
//! let profile = AppProfile::demo("com.example.capture");
//! let journeys = builtin_journeys(&profile, "https://example.com/v/1");
//!
//! let session = Session::in_dir("./artifacts");
//! session.init().unwrap();
//! let mut ctx = RunContext::new(session);
//! let store = TestResultStore::new("./artifacts/history.json", ctx.run_id.clone());
//!
//! let report = SmartRunner::new(&gateway, &profile, store)
//!     .run(&mut ctx, &journeys)
//!     .unwrap();
//! assert!(report.success);
//! ```

pub mod config;
pub mod context;
pub mod device;
pub mod journey;
pub mod profile;
pub mod runner;
pub mod session;
pub mod store;
pub mod ui;
pub mod wait;

// Re-export context types
pub use context::{CriticalError, RunContext, StepFailure};

// Re-export device access
pub use device::{AdbGateway, CommandOutput, Device, DeviceGateway, LiveTail, Logcat, ScriptedGateway};

// Re-export journey types and engine
pub use journey::{
    Action, EngineSettings, Expectation, Journey, JourneyEngine, JourneyOutcome, JourneyStep,
};

// Re-export UI snapshot types and resolution
pub use ui::{
    BadgeRule, Bounds, ChangeSet, Match, Node, ResolveError, Selector, Snapshot, Strategy,
    UiObservation, parse, resolve,
};

// Re-export planning and execution
pub use profile::{AppProfile, builtin_journeys};
pub use runner::{HarnessError, HarnessResult, RunReport, SmartRunner};
pub use store::{ExecutionStrategy, StrategyKind, TestResultRecord, TestResultStore};

// Re-export session management and waits
pub use session::Session;
pub use wait::{CancelToken, WaitOutcome, poll_until};

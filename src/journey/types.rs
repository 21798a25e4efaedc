//! Journey and step definitions.
//!
//! Journeys are data: a named sequence of steps, each with a precondition
//! selector set, one device action, and a postcondition selector set.
//! Step definitions are owned by the application profile and never mutated
//! at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ui::Selector;

/// Default per-step deadline.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(15);

/// A named selector: the component name makes diagnostics readable when a
/// selector stops matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub component: String,
    pub selector: Selector,
}

impl Expectation {
    pub fn new(component: impl Into<String>, selector: Selector) -> Self {
        Self {
            component: component.into(),
            selector,
        }
    }
}

/// One device interaction performed by a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum Action {
    /// Launch the application's main activity
    LaunchApp,

    /// Deliver a text share intent to the app's share entry point
    ShareText { text: String },

    /// Resolve a selector and tap its center
    Tap { selector: Selector },

    /// Try several candidate selectors in order, tapping the first one
    /// that resolves. An explicit retry loop across action variants.
    TapAny { candidates: Vec<Selector> },

    /// Type text into the focused field
    TypeText { text: String },

    /// Send a key event
    KeyEvent { code: u16 },

    /// Block until the device log matches a pattern
    WaitForLogPattern {
        pattern: String,
        timeout_ms: u64,
    },

    /// Fixed settle delay
    Sleep { millis: u64 },
}

/// One step of a journey.
#[derive(Debug, Clone)]
pub struct JourneyStep {
    pub name: String,
    pub preconditions: Vec<Expectation>,
    pub action: Action,
    pub postconditions: Vec<Expectation>,
    pub timeout: Duration,
}

impl JourneyStep {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            preconditions: Vec::new(),
            action,
            postconditions: Vec::new(),
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn precondition(mut self, expectation: Expectation) -> Self {
        self.preconditions.push(expectation);
        self
    }

    pub fn postcondition(mut self, expectation: Expectation) -> Self {
        self.postconditions.push(expectation);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A named, ordered sequence of steps exercising one user-visible flow.
#[derive(Debug, Clone)]
pub struct Journey {
    pub name: String,
    pub description: String,
    pub steps: Vec<JourneyStep>,
}

impl Journey {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: JourneyStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Progress of one step through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    NotStarted,
    PreconditionChecked,
    ActionPerformed,
    PostconditionChecked,
    Passed,
    Failed,
}

/// Which phase of a step an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Precondition,
    Action,
    Postcondition,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepPhase::Precondition => write!(f, "pre"),
            StepPhase::Action => write!(f, "action"),
            StepPhase::Postcondition => write!(f, "post"),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: String,
    pub state: StepState,
    pub precondition_ok: bool,
    pub action_ok: bool,
    pub postcondition_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub(crate) fn not_started(step: &str) -> Self {
        Self {
            step: step.to_string(),
            state: StepState::NotStarted,
            precondition_ok: false,
            action_ok: false,
            postcondition_ok: false,
            error: None,
        }
    }
}

/// Outcome of one journey.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyOutcome {
    pub journey: String,

    /// Logical AND of all steps' results
    pub passed: bool,

    /// Whether a critical error stopped the journey before its last step
    pub aborted: bool,

    pub steps: Vec<StepOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub mod engine;
pub mod types;

pub use engine::{EngineSettings, JourneyEngine};
pub use types::{
    Action, Expectation, Journey, JourneyOutcome, JourneyStep, StepOutcome, StepPhase, StepState,
};

mod config;
mod controller;
mod events;
mod recognition;
mod recording;
mod sign_engine;
mod test_session;
mod timers;

pub use config::{
    validate_threshold, EngineConfig, MAX_CONFIDENCE_THRESHOLD, MIN_CONFIDENCE_THRESHOLD,
};
pub use controller::EngineController;
pub use events::EngineEvent;
pub use recognition::{classify, MatchOutcome, RecognitionLoop, RecognitionStep};
pub use recording::{ActiveRecording, RecordingSession};
pub use sign_engine::{EngineSnapshot, SignEngine};
pub use test_session::{
    ResolvedTest, TestOutcome, TestSession, TestSessionMachine, TestSessionState,
};
pub use timers::{TimerSet, TimerTag, TimerTicket};

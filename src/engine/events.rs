use serde::Serialize;

use crate::models::TestRecord;

use super::test_session::TestOutcome;

/// Everything the engine reports back to its driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Per recognized frame: best template under the threshold.
    #[serde(rename_all = "camelCase")]
    MatchFound { name: String, score: f32 },
    /// Per recognized frame: nothing under the threshold.
    NoMatch,
    /// Grace period elapsed without a hand.
    HandLost,
    Announcement { text: String },

    #[serde(rename_all = "camelCase")]
    TestStarted { session_id: String, target: String },
    #[serde(rename_all = "camelCase")]
    TestResolved {
        session_id: String,
        target: String,
        outcome: TestOutcome,
        record: TestRecord,
    },
    #[serde(rename_all = "camelCase")]
    TestCancelled { session_id: String, target: String },
    /// Cooldown over; a new test may start.
    TestIdle,

    #[serde(rename_all = "camelCase")]
    RecordingStarted { recording_id: String, name: String },
    TemplateSaved { name: String, replaced: bool },
    RecordingFailed { name: String, reason: String },
    RecordingCancelled { name: String },
    RecognitionResumed,

    TemplateDeleted { name: String },
    CatalogCleared { removed: usize },
    ResultsReset,

    TrackerFailed { message: String },
    TrackerReady,
}

impl EngineEvent {
    pub fn announcement(text: impl Into<String>) -> Self {
        EngineEvent::Announcement { text: text.into() }
    }
}

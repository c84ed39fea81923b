use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecording {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Capturing(ActiveRecording),
    /// Capture finished or cancelled; recognition stays off until settled.
    Settling,
}

/// Tracks a capture window for minting a new template. Recognition is
/// suspended from `begin` until `settle`.
#[derive(Debug)]
pub struct RecordingSession {
    phase: Phase,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveRecording> {
        match &self.phase {
            Phase::Capturing(recording) => Some(recording),
            _ => None,
        }
    }

    pub fn suspends_recognition(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Validates and starts a capture. Nothing changes on error.
    pub fn begin(
        &mut self,
        name: &str,
        hand_present: bool,
        now: DateTime<Utc>,
    ) -> Result<ActiveRecording> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Please enter a sign name before recording");
        }
        if !hand_present {
            bail!("No hand detected. Please show your hand to the camera first.");
        }
        if let Phase::Capturing(current) = &self.phase {
            bail!("already recording '{}'", current.name);
        }

        let recording = ActiveRecording {
            id: Uuid::new_v4(),
            name: name.to_string(),
            started_at: now,
        };
        self.phase = Phase::Capturing(recording.clone());
        Ok(recording)
    }

    /// Ends the capture window; the caller commits the returned recording.
    pub fn finish(&mut self) -> Option<ActiveRecording> {
        self.leave_capture()
    }

    pub fn cancel(&mut self) -> Option<ActiveRecording> {
        self.leave_capture()
    }

    pub fn settle(&mut self) -> bool {
        if self.phase == Phase::Settling {
            self.phase = Phase::Idle;
            true
        } else {
            false
        }
    }

    fn leave_capture(&mut self) -> Option<ActiveRecording> {
        match std::mem::replace(&mut self.phase, Phase::Settling) {
            Phase::Capturing(recording) => Some(recording),
            other => {
                self.phase = other;
                None
            }
        }
    }
}

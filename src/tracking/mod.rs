//! Hand-tracking collaborator adapter.
//!
//! The engine never talks to a camera. Whatever produces landmarks feeds
//! `TrackerUpdate`s into an `EngineController`; the bundled source replays
//! a recorded JSON-lines capture.

mod replay;

use anyhow::Result;

use crate::engine::EngineController;
use crate::models::HandFrame;

pub use replay::{load_replay, parse_line, replay};

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// One tick's detections; empty when no hand was seen.
    Hands(Vec<HandFrame>),
    Failed(String),
    Ready,
}

impl TrackerUpdate {
    pub async fn deliver(self, controller: &EngineController) -> Result<()> {
        match self {
            TrackerUpdate::Hands(hands) => controller.submit_frame(hands).await,
            TrackerUpdate::Failed(message) => controller.tracker_failed(message).await,
            TrackerUpdate::Ready => controller.tracker_ready().await,
        }
    }
}

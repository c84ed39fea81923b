use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::EngineController;
use crate::models::{HandFrame, HAND_LANDMARK_COUNT};
use crate::{log_info, log_warn};

use super::TrackerUpdate;

const ENABLE_LOGS: bool = true;

/// One line of a capture file:
/// `{"hands": [[{"x":..,"y":..,"z":..} x21], ...]}`, `{"error": "..."}`
/// or `{"ready": true}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Hands { hands: Vec<HandFrame> },
    Error { error: String },
    Ready { ready: bool },
}

/// Parses one capture line. Blank lines, `#` comments and `{"ready": false}`
/// produce nothing. A hand without exactly 21 landmarks is an error.
pub fn parse_line(line: &str) -> Result<Option<TrackerUpdate>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let parsed: ReplayLine = serde_json::from_str(line)?;
    Ok(match parsed {
        ReplayLine::Hands { hands } => {
            if let Some(bad) = hands.iter().find(|hand| !hand.is_complete()) {
                bail!(
                    "hand has {} landmarks, expected {}",
                    bad.len(),
                    HAND_LANDMARK_COUNT
                );
            }
            Some(TrackerUpdate::Hands(hands))
        }
        ReplayLine::Error { error } => Some(TrackerUpdate::Failed(error)),
        ReplayLine::Ready { ready: true } => Some(TrackerUpdate::Ready),
        ReplayLine::Ready { ready: false } => None,
    })
}

pub fn load_replay(path: &Path) -> Result<Vec<TrackerUpdate>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture {}", path.display()))?;

    let mut updates = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let update = parse_line(line)
            .with_context(|| format!("{}:{}: invalid capture line", path.display(), number + 1))?;
        updates.extend(update);
    }

    log_info!("Loaded {} tracker updates from {}", updates.len(), path.display());
    Ok(updates)
}

/// Feeds `updates` to the engine at `fps`, one per tick. Returns how many
/// were delivered before the capture ended or `cancel_token` fired.
pub async fn replay(
    updates: Vec<TrackerUpdate>,
    fps: f64,
    controller: &EngineController,
    cancel_token: CancellationToken,
) -> Result<usize> {
    if !fps.is_finite() || fps <= 0.0 {
        bail!("frame rate must be positive (got {fps})");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut delivered = 0;
    for update in updates {
        tokio::select! {
            _ = ticker.tick() => {
                update.deliver(controller).await?;
                delivered += 1;
            }
            _ = cancel_token.cancelled() => {
                log_warn!("replay cancelled after {} updates", delivered);
                break;
            }
        }
    }
    Ok(delivered)
}

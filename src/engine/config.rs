use std::time::Duration;

use anyhow::{bail, Result};

use crate::matching::MatchConfig;

/// Accepted range for the user-tunable confidence threshold.
pub const MIN_CONFIDENCE_THRESHOLD: f32 = 0.05;
pub const MAX_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Timing and matching parameters for the recognition engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub matching: MatchConfig,

    /// Best score must be strictly below this to count as a match.
    pub confidence_threshold: f32,

    /// Minimum time between two match-name announcements.
    pub announce_debounce: Duration,

    /// Time without any detected hand before the last landmarks are dropped.
    pub hand_grace: Duration,

    /// Test session: time allowed to show the sign, consecutive matching
    /// frames required, and how long the result stays up.
    pub test_timeout: Duration,
    pub required_streak: u32,
    pub test_cooldown: Duration,

    /// Recording: how long the pose is held before capture, and the pause
    /// before recognition resumes.
    pub capture_window: Duration,
    pub settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            confidence_threshold: 0.2,
            announce_debounce: Duration::from_millis(1500),
            hand_grace: Duration::from_millis(150),
            test_timeout: Duration::from_secs(7),
            required_streak: 5,
            test_cooldown: Duration::from_secs(2),
            capture_window: Duration::from_secs(3),
            settle_delay: Duration::from_millis(500),
        }
    }
}

pub fn validate_threshold(value: f32) -> Result<f32> {
    if !(MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&value) {
        bail!(
            "confidence threshold must be between {} and {} (got {})",
            MIN_CONFIDENCE_THRESHOLD,
            MAX_CONFIDENCE_THRESHOLD,
            value
        );
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds_are_inclusive() {
        assert!(validate_threshold(0.05).is_ok());
        assert!(validate_threshold(0.5).is_ok());
        assert!(validate_threshold(0.04).is_err());
        assert!(validate_threshold(0.51).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn default_threshold_is_in_range() {
        assert!(validate_threshold(EngineConfig::default().confidence_threshold).is_ok());
    }
}

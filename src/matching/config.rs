use serde::{Deserialize, Serialize};

/// Reference distance used to remove hand size from landmark sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScaleReference {
    /// Largest wrist-to-point distance in the frame.
    MaxWristDistance,
    /// Wrist to middle finger MCP (index 9).
    MiddleFingerBase,
}

/// Tunable weights for template scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub scale_reference: ScaleReference,

    /// Multiplier on depth differences; tracker depth is noisier than x/y.
    pub z_weight: f32,

    /// Per-point weights for fingertips and the wrist. Other joints weigh 1.
    pub fingertip_weight: f32,
    pub wrist_weight: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            scale_reference: ScaleReference::MiddleFingerBase,
            z_weight: 0.3,
            fingertip_weight: 1.5,
            wrist_weight: 0.5,
        }
    }
}

impl MatchConfig {
    /// Unweighted variant: every joint counts equally, scale by max wrist distance.
    pub fn uniform() -> Self {
        Self {
            scale_reference: ScaleReference::MaxWristDistance,
            z_weight: 0.5,
            fingertip_weight: 1.0,
            wrist_weight: 1.0,
        }
    }
}

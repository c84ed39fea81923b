//! Hand landmark data as delivered by the hand-tracking collaborator.
//!
//! Coordinates follow the tracker convention: `x`/`y` are normalized image
//! coordinates (0.0 to 1.0), `z` is a relative depth estimate.

use serde::{Deserialize, Serialize};

/// Number of tracked points on one hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Maximum number of hands considered in one sensor tick.
pub const MAX_HANDS: usize = 2;

/// Anatomical landmark indices.
#[allow(dead_code)]
pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
}

/// Bones drawn between landmarks (fingers, then the palm arch).
pub const HAND_CONNECTIONS: [(usize, usize); 20] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (7, 8),
    (9, 10),
    (10, 11),
    (11, 12),
    (13, 14),
    (14, 15),
    (15, 16),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 5),
    (5, 9),
    (9, 13),
    (13, 17),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(&self, other: &LandmarkPoint) -> LandmarkPoint {
        LandmarkPoint::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f32) -> LandmarkPoint {
        LandmarkPoint::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One hand's landmarks in anatomical order (index 0 = wrist).
///
/// A well-formed frame holds exactly [`HAND_LANDMARK_COUNT`] points.
/// [`HandSet::from_detected`] enforces this for live frames. Frames read back
/// from storage are not re-validated; scoring treats any point-count
/// mismatch as "no match".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandFrame {
    pub points: Vec<LandmarkPoint>,
}

impl HandFrame {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() == HAND_LANDMARK_COUNT
    }

    pub fn wrist(&self) -> Option<&LandmarkPoint> {
        self.points.get(index::WRIST)
    }

    pub fn map_points<F>(&self, f: F) -> HandFrame
    where
        F: Fn(&LandmarkPoint) -> LandmarkPoint,
    {
        HandFrame::new(self.points.iter().map(f).collect())
    }
}

/// Hands observed in a single sensor tick, in detection order.
///
/// Order is not a stable hand identity: pairing between two sets is by
/// position only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandSet {
    pub hands: Vec<HandFrame>,
}

impl HandSet {
    /// Builds a set from a tracker tick. Hands without exactly
    /// [`HAND_LANDMARK_COUNT`] points are discarded, and `None` means no
    /// complete hand was left. Extra hands beyond [`MAX_HANDS`] are dropped.
    pub fn from_detected(mut hands: Vec<HandFrame>) -> Option<Self> {
        let detected = hands.len();
        hands.retain(HandFrame::is_complete);
        if hands.len() < detected {
            log::debug!(
                "dropped {} incomplete hand(s) from tracker tick",
                detected - hands.len()
            );
        }
        if hands.is_empty() {
            return None;
        }
        hands.truncate(MAX_HANDS);
        Some(Self { hands })
    }

    pub fn single(frame: HandFrame) -> Self {
        Self { hands: vec![frame] }
    }

    pub fn len(&self) -> usize {
        self.hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandFrame> {
        self.hands.iter()
    }

    pub fn map_points<F>(&self, f: F) -> HandSet
    where
        F: Fn(&LandmarkPoint) -> LandmarkPoint,
    {
        HandSet {
            hands: self.hands.iter().map(|hand| hand.map_points(&f)).collect(),
        }
    }
}

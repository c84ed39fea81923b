//! Translation and scale normalization of one hand.
//!
//! The output is independent of where the hand sits in the image and of how
//! large it appears. It is NOT rotation invariant: a sign recorded with the
//! palm upright will not match the same shape tilted sideways, and a change
//! of camera viewing angle changes the projected geometry.

use crate::models::{index, HandFrame, LandmarkPoint};

use super::config::ScaleReference;

/// Moves the wrist to the origin and divides every coordinate by the chosen
/// reference distance. A zero reference leaves the scale untouched.
pub fn normalize(frame: &HandFrame, reference: ScaleReference) -> HandFrame {
    let Some(wrist) = frame.wrist().copied() else {
        return HandFrame::default();
    };

    let translated: Vec<LandmarkPoint> = frame.points.iter().map(|p| p.sub(&wrist)).collect();
    let reference_distance = reference_distance(&translated, reference);
    let scale_factor = if reference_distance > 0.0 {
        1.0 / reference_distance
    } else {
        1.0
    };

    HandFrame::new(translated.iter().map(|p| p.scale(scale_factor)).collect())
}

fn reference_distance(translated: &[LandmarkPoint], reference: ScaleReference) -> f32 {
    match reference {
        ScaleReference::MaxWristDistance => translated
            .iter()
            .map(LandmarkPoint::length)
            .fold(0.0_f32, f32::max),
        ScaleReference::MiddleFingerBase => translated
            .get(index::MIDDLE_MCP)
            .map(LandmarkPoint::length)
            .unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HAND_LANDMARK_COUNT;

    fn sample_frame() -> HandFrame {
        HandFrame::new(
            (0..HAND_LANDMARK_COUNT)
                .map(|i| {
                    let t = i as f32;
                    LandmarkPoint::new(0.4 + 0.01 * t, 0.6 - 0.015 * t, 0.002 * t)
                })
                .collect(),
        )
    }

    #[test]
    fn wrist_becomes_origin() {
        for reference in [ScaleReference::MaxWristDistance, ScaleReference::MiddleFingerBase] {
            let normalized = normalize(&sample_frame(), reference);
            assert_eq!(normalized.points[0], LandmarkPoint::default());
            assert_eq!(normalized.len(), HAND_LANDMARK_COUNT);
        }
    }

    #[test]
    fn reference_distance_becomes_unit() {
        let normalized = normalize(&sample_frame(), ScaleReference::MiddleFingerBase);
        assert!((normalized.points[index::MIDDLE_MCP].length() - 1.0).abs() < 1e-5);

        let normalized = normalize(&sample_frame(), ScaleReference::MaxWristDistance);
        let max = normalized
            .points
            .iter()
            .map(LandmarkPoint::length)
            .fold(0.0_f32, f32::max);
        assert!((max - 1.0).abs() < 1e-5);
    }

    #[test]
    fn collapsed_hand_keeps_scale_one() {
        let frame = HandFrame::new(vec![LandmarkPoint::new(0.3, 0.3, 0.0); HAND_LANDMARK_COUNT]);
        let normalized = normalize(&frame, ScaleReference::MiddleFingerBase);
        assert!(normalized.points.iter().all(|p| *p == LandmarkPoint::default()));
    }

    #[test]
    fn short_frame_without_middle_base_is_not_scaled() {
        let frame = HandFrame::new(vec![
            LandmarkPoint::new(0.5, 0.5, 0.0),
            LandmarkPoint::new(0.7, 0.5, 0.0),
        ]);
        let normalized = normalize(&frame, ScaleReference::MiddleFingerBase);
        assert!((normalized.points[1].x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn empty_frame_stays_empty() {
        assert!(normalize(&HandFrame::default(), ScaleReference::MaxWristDistance).is_empty());
    }
}

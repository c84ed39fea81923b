//! Per-frame template recognition with transition tracking and announcement
//! debounce.

use std::time::{Duration, Instant};

use crate::catalog::TemplateStore;
use crate::matching::{best_match, MatchConfig};
use crate::models::HandSet;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    MatchFound { name: String, score: f32 },
    NoMatch,
}

impl MatchOutcome {
    pub fn matched_name(&self) -> Option<&str> {
        match self {
            MatchOutcome::MatchFound { name, .. } => Some(name),
            MatchOutcome::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionStep {
    pub outcome: MatchOutcome,
    /// The matched template differs from the previous frame's.
    pub transition: bool,
    /// A transition that also cleared the debounce interval.
    pub announce: bool,
}

/// Best template under `threshold`, or `NoMatch`.
pub fn classify(
    templates: &TemplateStore,
    current: &HandSet,
    threshold: f32,
    config: &MatchConfig,
) -> MatchOutcome {
    match best_match(templates.iter(), current, config) {
        Some((template, score)) if score < threshold => MatchOutcome::MatchFound {
            name: template.name.clone(),
            score,
        },
        _ => MatchOutcome::NoMatch,
    }
}

#[derive(Debug, Default)]
pub struct RecognitionLoop {
    last_match: Option<String>,
    last_announced_at: Option<Instant>,
}

impl RecognitionLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_match(&self) -> Option<&str> {
        self.last_match.as_deref()
    }

    /// Scores `current` and updates the match state.
    ///
    /// The debounce clock only advances when an announcement is due and
    /// `announcements_enabled` is set; it is measured from the last
    /// announcement, not the last frame.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        templates: &TemplateStore,
        current: &HandSet,
        threshold: f32,
        config: &MatchConfig,
        debounce: Duration,
        announcements_enabled: bool,
        now: Instant,
    ) -> RecognitionStep {
        if templates.is_empty() {
            return RecognitionStep {
                outcome: MatchOutcome::NoMatch,
                transition: false,
                announce: false,
            };
        }

        let outcome = classify(templates, current, threshold, config);
        let matched = outcome.matched_name().map(str::to_owned);

        let transition = matched.is_some() && matched != self.last_match;
        let debounce_clear = self
            .last_announced_at
            .map_or(true, |at| now.saturating_duration_since(at) >= debounce);
        let announce = transition && debounce_clear && announcements_enabled;
        if announce {
            self.last_announced_at = Some(now);
        }

        self.last_match = matched;
        RecognitionStep {
            outcome,
            transition,
            announce,
        }
    }

    pub fn clear(&mut self) {
        self.last_match = None;
    }

    /// Drops the current match if it refers to `name`.
    pub fn forget_template(&mut self, name: &str) {
        if self.last_match.as_deref() == Some(name) {
            self.last_match = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{GestureTemplate, HandFrame, LandmarkPoint, HAND_LANDMARK_COUNT};

    fn hand(curl: f32) -> HandSet {
        HandSet::single(HandFrame::new(
            (0..HAND_LANDMARK_COUNT)
                .map(|i| {
                    let t = i as f32;
                    LandmarkPoint::new(0.5 + 0.01 * t, 0.8 - 0.02 * t + curl * (t * 0.7).sin(), 0.0)
                })
                .collect(),
        ))
    }

    fn store_with(templates: &[(&str, HandSet)]) -> TemplateStore {
        let mut store = TemplateStore::load(Arc::new(MemoryStore::new())).unwrap();
        for (name, landmarks) in templates {
            store.insert(GestureTemplate::new(*name, landmarks.clone(), Utc::now()));
        }
        store
    }

    fn step(
        recognition: &mut RecognitionLoop,
        store: &TemplateStore,
        frame: &HandSet,
        now: Instant,
    ) -> RecognitionStep {
        recognition.process(
            store,
            frame,
            0.2,
            &MatchConfig::default(),
            Duration::from_millis(1500),
            true,
            now,
        )
    }

    #[test]
    fn empty_catalog_yields_no_match() {
        let store = store_with(&[]);
        let mut recognition = RecognitionLoop::new();
        let result = step(&mut recognition, &store, &hand(0.0), Instant::now());
        assert_eq!(result.outcome, MatchOutcome::NoMatch);
        assert!(!result.announce);
    }

    #[test]
    fn exact_frame_matches_with_zero_score() {
        let store = store_with(&[("A", hand(0.0)), ("B", hand(0.3))]);
        let outcome = classify(&store, &hand(0.0), 0.05, &MatchConfig::default());
        assert_eq!(
            outcome,
            MatchOutcome::MatchFound {
                name: "A".into(),
                score: 0.0
            }
        );
    }

    #[test]
    fn raising_threshold_never_removes_a_match() {
        let store = store_with(&[("A", hand(0.0))]);
        let probe = hand(0.02);
        let mut previously_matched = false;
        for step in 1..=10 {
            let threshold = step as f32 * 0.05;
            let matched = classify(&store, &probe, threshold, &MatchConfig::default())
                .matched_name()
                .is_some();
            assert!(matched || !previously_matched, "lost match at {threshold}");
            previously_matched = matched;
        }
        assert!(previously_matched);
    }

    #[test]
    fn sustained_match_announces_once() {
        let store = store_with(&[("A", hand(0.0))]);
        let mut recognition = RecognitionLoop::new();
        let t0 = Instant::now();

        let announcements = (0..30)
            .map(|i| step(&mut recognition, &store, &hand(0.0), t0 + Duration::from_millis(33 * i)))
            .filter(|s| s.announce)
            .count();
        assert_eq!(announcements, 1);
        assert_eq!(recognition.current_match(), Some("A"));
    }

    #[test]
    fn transitions_inside_debounce_are_not_announced() {
        let store = store_with(&[("A", hand(0.0)), ("B", hand(0.3))]);
        let mut recognition = RecognitionLoop::new();
        let t0 = Instant::now();

        assert!(step(&mut recognition, &store, &hand(0.0), t0).announce);
        let quick = step(&mut recognition, &store, &hand(0.3), t0 + Duration::from_millis(500));
        assert!(quick.transition);
        assert!(!quick.announce);

        let back = step(&mut recognition, &store, &hand(0.0), t0 + Duration::from_millis(1600));
        assert!(back.announce);
    }

    #[test]
    fn no_match_clears_current_match() {
        let store = store_with(&[("A", hand(0.0))]);
        let mut recognition = RecognitionLoop::new();
        let t0 = Instant::now();
        step(&mut recognition, &store, &hand(0.0), t0);
        let miss = step(&mut recognition, &store, &hand(0.6), t0);
        assert_eq!(miss.outcome, MatchOutcome::NoMatch);
        assert_eq!(recognition.current_match(), None);
    }

    #[test]
    fn forget_template_only_clears_that_name() {
        let store = store_with(&[("A", hand(0.0))]);
        let mut recognition = RecognitionLoop::new();
        step(&mut recognition, &store, &hand(0.0), Instant::now());
        recognition.forget_template("B");
        assert_eq!(recognition.current_match(), Some("A"));
        recognition.forget_template("A");
        assert_eq!(recognition.current_match(), None);
    }
}

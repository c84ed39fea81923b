//! Gesture template and per-sign test result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HandSet;

/// A named reference landmark configuration.
///
/// Templates are never edited in place: re-recording a name replaces the
/// whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureTemplate {
    pub name: String,
    pub landmarks: HandSet,
    pub created_at: DateTime<Utc>,
}

impl GestureTemplate {
    pub fn new(name: impl Into<String>, landmarks: HandSet, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            landmarks,
            created_at,
        }
    }
}

/// Recall statistics for one sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub name: String,
    pub tested: u32,
    pub correct: u32,
    /// Percentage in `[0, 100]`; 0 when never tested.
    pub accuracy: f64,
    pub last_tested: Option<DateTime<Utc>>,
}

impl TestRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tested: 0,
            correct: 0,
            accuracy: 0.0,
            last_tested: None,
        }
    }

    pub fn record(&mut self, correct: bool, at: DateTime<Utc>) {
        self.tested = self.tested.saturating_add(1);
        if correct {
            self.correct = self.correct.saturating_add(1);
        }
        self.accuracy = compute_accuracy(self.correct, self.tested);
        self.last_tested = Some(at);
    }

    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.name));
    }
}

fn compute_accuracy(correct: u32, tested: u32) -> f64 {
    if tested == 0 {
        0.0
    } else {
        correct as f64 / tested as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_tracks_outcomes() {
        let now = Utc::now();
        let mut record = TestRecord::new("A");
        record.record(true, now);
        assert_eq!(record.accuracy, 100.0);
        record.record(false, now);
        assert_eq!(record.tested, 2);
        assert_eq!(record.correct, 1);
        assert_eq!(record.accuracy, 50.0);
        assert_eq!(record.last_tested, Some(now));
    }

    #[test]
    fn reset_keeps_name() {
        let mut record = TestRecord::new("hello");
        record.record(true, Utc::now());
        record.reset();
        assert_eq!(record, TestRecord::new("hello"));
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let json = serde_json::to_value(TestRecord::new("A")).unwrap();
        assert!(json.get("lastTested").is_some());
        assert_eq!(json["accuracy"], 0.0);
    }
}

//! The composed recognition and quiz engine.
//!
//! `SignEngine` holds every piece of mutable state and is advanced only by
//! discrete calls: `on_frame` for tracker ticks, `on_timer`/`poll_timers`
//! for expired deadlines, and the user commands. Time is always passed in,
//! so the whole engine runs deterministically under synthetic clocks.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::catalog::{ResultsLedger, TemplateStore};
use crate::db::KeyValueStore;
use crate::models::{GestureTemplate, HandFrame, HandSet};
use crate::settings::EngineSettings;
use crate::{log_error, log_info, log_warn};

use super::config::{validate_threshold, EngineConfig};
use super::events::EngineEvent;
use super::recognition::{MatchOutcome, RecognitionLoop};
use super::recording::{ActiveRecording, RecordingSession};
use super::test_session::{
    ResolvedTest, TestOutcome, TestSession, TestSessionMachine, TestSessionState,
};
use super::timers::{TimerSet, TimerTag, TimerTicket};

const ENABLE_LOGS: bool = true;

/// Serializable view of the engine for callers and UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub test_state: TestSessionState,
    pub test_session: Option<TestSession>,
    pub current_match: Option<String>,
    pub hand_present: bool,
    pub hand_count: usize,
    pub recording: Option<ActiveRecording>,
    pub recognition_active: bool,
    pub recognition_enabled: bool,
    pub announcements_enabled: bool,
    pub test_mode: bool,
    pub confidence_threshold: f32,
    pub tracker_error: Option<String>,
    pub template_count: usize,
}

pub struct SignEngine {
    config: EngineConfig,
    templates: TemplateStore,
    ledger: ResultsLedger,
    timers: TimerSet,
    recognition: RecognitionLoop,
    test: TestSessionMachine,
    recording: RecordingSession,
    last_hands: Option<HandSet>,
    hand_present: bool,
    recognition_enabled: bool,
    announcements_enabled: bool,
    test_mode: bool,
    tracker_error: Option<String>,
}

impl SignEngine {
    pub fn new(config: EngineConfig, templates: TemplateStore, ledger: ResultsLedger) -> Self {
        Self {
            config,
            templates,
            ledger,
            timers: TimerSet::new(),
            recognition: RecognitionLoop::new(),
            test: TestSessionMachine::new(),
            recording: RecordingSession::new(),
            last_hands: None,
            hand_present: false,
            recognition_enabled: true,
            announcements_enabled: true,
            test_mode: true,
            tracker_error: None,
        }
    }

    /// Loads the catalog and ledger from `backend`.
    pub fn open(config: EngineConfig, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        validate_threshold(config.confidence_threshold)?;
        let templates = TemplateStore::load(Arc::clone(&backend))?;
        let ledger = ResultsLedger::load(backend, templates.names())?;
        Ok(Self::new(config, templates, ledger))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn ledger(&self) -> &ResultsLedger {
        &self.ledger
    }

    pub fn current_match(&self) -> Option<&str> {
        self.recognition.current_match()
    }

    pub fn test_state(&self) -> TestSessionState {
        self.test.state()
    }

    pub fn test_session(&self) -> Option<&TestSession> {
        self.test.session()
    }

    pub fn is_hand_present(&self) -> bool {
        self.hand_present
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_due()
    }

    /// Ticket of the deadline armed under `tag`, if any. Passing it to
    /// [`SignEngine::on_timer`] after that deadline was cancelled or
    /// re-armed does nothing.
    pub fn armed_timer(&self, tag: TimerTag) -> Option<TimerTicket> {
        self.timers.ticket(tag)
    }

    /// Recognition runs only when switched on, outside a recording and its
    /// settle delay, and while the tracker is healthy.
    pub fn recognition_active(&self) -> bool {
        self.recognition_enabled
            && !self.recording.suspends_recognition()
            && self.tracker_error.is_none()
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            confidence_threshold: self.config.confidence_threshold,
            announcements_enabled: self.announcements_enabled,
            test_mode: self.test_mode,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            test_state: self.test.state(),
            test_session: self.test.session().cloned(),
            current_match: self.current_match().map(str::to_owned),
            hand_present: self.hand_present,
            hand_count: self.last_hands.as_ref().map_or(0, HandSet::len),
            recording: self.recording.active().cloned(),
            recognition_active: self.recognition_active(),
            recognition_enabled: self.recognition_enabled,
            announcements_enabled: self.announcements_enabled,
            test_mode: self.test_mode,
            confidence_threshold: self.config.confidence_threshold,
            tracker_error: self.tracker_error.clone(),
            template_count: self.templates.len(),
        }
    }

    pub fn apply_settings(
        &mut self,
        settings: &EngineSettings,
        now: Instant,
    ) -> Result<Vec<EngineEvent>> {
        let mut events = self.set_confidence_threshold(settings.confidence_threshold, now)?;
        self.set_announcements_enabled(settings.announcements_enabled);
        events.extend(self.set_test_mode(settings.test_mode));
        Ok(events)
    }

    /// One tracker tick. An empty tick starts the hand-loss grace period
    /// instead of clearing state right away.
    pub fn on_frame(&mut self, hands: Vec<HandFrame>, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let Some(hand_set) = HandSet::from_detected(hands) else {
            if self.hand_present && !self.timers.is_armed(TimerTag::HandGrace) {
                self.timers
                    .arm(TimerTag::HandGrace, now + self.config.hand_grace);
            }
            return events;
        };

        self.timers.cancel(TimerTag::HandGrace);
        self.hand_present = true;
        self.last_hands = Some(hand_set);
        self.evaluate(now, true, &mut events);
        events
    }

    /// Handles one expired deadline. Tickets for cancelled or re-armed
    /// timers are dropped.
    pub fn on_timer(&mut self, ticket: TimerTicket, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.timers.claim(ticket) {
            log::debug!(
                "Dropping stale {:?} timer (generation {})",
                ticket.tag,
                ticket.generation
            );
            return events;
        }

        match ticket.tag {
            TimerTag::HandGrace => self.drop_hand(&mut events),
            TimerTag::TestTimeout => {
                if let Some(resolved) = self.test.time_out() {
                    self.resolve(resolved, now, &mut events);
                }
            }
            TimerTag::TestCooldown => {
                if self.test.finish_cooldown() {
                    events.push(EngineEvent::TestIdle);
                }
            }
            TimerTag::RecordingCapture => self.commit_recording(now, &mut events),
            TimerTag::RecognitionSettle => {
                if self.recording.settle() {
                    events.push(EngineEvent::RecognitionResumed);
                }
            }
        }
        events
    }

    /// Fires every deadline at or before `now`, earliest first.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(ticket) = self.timers.next_expired(now) {
            events.extend(self.on_timer(ticket, now));
        }
        events
    }

    pub fn start_test(&mut self, target: &str, now: Instant) -> Result<Vec<EngineEvent>> {
        if !self.test_mode {
            bail!("Practice mode is on; switch to test mode to start a quiz");
        }
        if !self.templates.contains(target) {
            bail!("No sign named \"{target}\"");
        }

        let (session, preempted) = self.test.start(target, Utc::now())?;
        let mut events = Vec::new();
        if let Some(previous) = preempted {
            log_info!("Test for '{}' preempted", previous.target_name);
            events.push(cancelled(&previous));
        }

        self.timers
            .arm(TimerTag::TestTimeout, now + self.config.test_timeout);
        self.recognition.clear();

        log_info!("Test {} started for '{}'", session.id, session.target_name);
        events.push(EngineEvent::TestStarted {
            session_id: session.id.to_string(),
            target: session.target_name.clone(),
        });
        self.announce(
            format!("Show me the sign for \"{}\"", session.target_name),
            &mut events,
        );
        Ok(events)
    }

    /// Starts a test on a random sign among the least-tested ones.
    pub fn start_quiz<R>(&mut self, rng: &mut R, now: Instant) -> Result<Vec<EngineEvent>>
    where
        R: Rng + ?Sized,
    {
        let target = self
            .pick_quiz_target(rng)
            .ok_or_else(|| anyhow!("No signs saved yet; record one first"))?;
        self.start_test(&target, now)
    }

    pub fn pick_quiz_target<R>(&self, rng: &mut R) -> Option<String>
    where
        R: Rng + ?Sized,
    {
        let tested = |name: &str| self.ledger.get(name).map_or(0, |record| record.tested);
        let fewest = self.templates.names().map(tested).min()?;
        let candidates: Vec<&str> = self
            .templates
            .names()
            .filter(|name| tested(*name) == fewest)
            .collect();
        candidates.choose(rng).map(|name| name.to_string())
    }

    /// Abandons a pending test or its cooldown without touching the ledger.
    pub fn cancel_test(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.cancel_session(|test| test.cancel(), &mut events);
        events
    }

    pub fn begin_recording(&mut self, name: &str, now: Instant) -> Result<Vec<EngineEvent>> {
        let recording = self.recording.begin(name, self.hand_present, Utc::now())?;

        self.timers.cancel(TimerTag::RecognitionSettle);
        self.timers
            .arm(TimerTag::RecordingCapture, now + self.config.capture_window);
        self.recognition.clear();
        self.test.reset_streak();

        log_info!("Recording '{}' for {:?}", recording.name, self.config.capture_window);
        Ok(vec![EngineEvent::RecordingStarted {
            recording_id: recording.id.to_string(),
            name: recording.name,
        }])
    }

    pub fn cancel_recording(&mut self, now: Instant) -> Vec<EngineEvent> {
        let Some(recording) = self.recording.cancel() else {
            return Vec::new();
        };

        self.timers.cancel(TimerTag::RecordingCapture);
        self.timers
            .arm(TimerTag::RecognitionSettle, now + self.config.settle_delay);
        log_info!("Recording '{}' cancelled", recording.name);
        vec![EngineEvent::RecordingCancelled {
            name: recording.name,
        }]
    }

    pub fn delete_template(&mut self, name: &str) -> Result<Vec<EngineEvent>> {
        if self.templates.remove(name).is_none() {
            bail!("No sign named \"{name}\"");
        }
        self.ledger.sync_with_catalog(self.templates.names());

        let mut events = Vec::new();
        self.cancel_session(|test| test.cancel_if_targeting(name), &mut events);
        self.recognition.forget_template(name);

        log_info!("Deleted sign '{}'", name);
        events.push(EngineEvent::TemplateDeleted {
            name: name.to_string(),
        });
        Ok(events)
    }

    pub fn clear_templates(&mut self) -> Vec<EngineEvent> {
        let removed = self.templates.clear();
        self.ledger.sync_with_catalog(self.templates.names());

        let mut events = Vec::new();
        self.cancel_session(|test| test.cancel(), &mut events);
        self.recognition.clear();

        log_info!("Cleared {} signs", removed);
        events.push(EngineEvent::CatalogCleared { removed });
        events
    }

    pub fn reset_results(&mut self) -> Vec<EngineEvent> {
        self.ledger.reset();
        log_info!("Test results reset");
        vec![EngineEvent::ResultsReset]
    }

    /// Validates and applies a new threshold, then re-scores the last
    /// observed hands against it.
    pub fn set_confidence_threshold(&mut self, value: f32, now: Instant) -> Result<Vec<EngineEvent>> {
        self.config.confidence_threshold = validate_threshold(value)?;
        let mut events = Vec::new();
        self.evaluate(now, false, &mut events);
        Ok(events)
    }

    pub fn set_recognition_enabled(&mut self, enabled: bool, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.recognition_enabled == enabled {
            return events;
        }

        self.recognition_enabled = enabled;
        if enabled {
            self.evaluate(now, false, &mut events);
        } else {
            self.recognition.clear();
            self.test.reset_streak();
        }
        events
    }

    pub fn set_announcements_enabled(&mut self, enabled: bool) {
        self.announcements_enabled = enabled;
    }

    /// Switching between test and practice mode drops any session and the
    /// current match.
    pub fn set_test_mode(&mut self, enabled: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.test_mode == enabled {
            return events;
        }

        self.test_mode = enabled;
        self.cancel_session(|test| test.cancel(), &mut events);
        self.recognition.clear();
        events
    }

    /// Tracker went down: recognition stays off until `on_tracker_ready`.
    pub fn on_tracker_failed(&mut self, message: impl Into<String>) -> Vec<EngineEvent> {
        let message = message.into();
        log_error!("Hand tracker failed: {}", message);
        self.tracker_error = Some(message.clone());
        self.recognition.clear();
        self.test.reset_streak();
        vec![EngineEvent::TrackerFailed { message }]
    }

    pub fn on_tracker_ready(&mut self) -> Vec<EngineEvent> {
        if self.tracker_error.take().is_some() {
            log_info!("Hand tracker recovered");
        }
        vec![EngineEvent::TrackerReady]
    }

    fn evaluate(&mut self, now: Instant, feed_test: bool, events: &mut Vec<EngineEvent>) {
        if !self.recognition_active() {
            return;
        }
        let Some(current) = self.last_hands.as_ref() else {
            return;
        };

        let step = self.recognition.process(
            &self.templates,
            current,
            self.config.confidence_threshold,
            &self.config.matching,
            self.config.announce_debounce,
            self.announcements_enabled,
            now,
        );

        match &step.outcome {
            MatchOutcome::MatchFound { name, score } => events.push(EngineEvent::MatchFound {
                name: name.clone(),
                score: *score,
            }),
            MatchOutcome::NoMatch => events.push(EngineEvent::NoMatch),
        }

        // Name announcements would talk over the quiz prompt.
        if step.announce && !self.test.is_live() {
            if let Some(name) = step.outcome.matched_name() {
                self.announce(name, events);
            }
        }

        if feed_test {
            if let Some(resolved) = self.test.observe(&step.outcome, self.config.required_streak) {
                self.resolve(resolved, now, events);
            }
        }
    }

    fn resolve(&mut self, resolved: ResolvedTest, now: Instant, events: &mut Vec<EngineEvent>) {
        self.timers.cancel(TimerTag::TestTimeout);
        self.timers
            .arm(TimerTag::TestCooldown, now + self.config.test_cooldown);

        let ResolvedTest { session, outcome } = resolved;
        let correct = outcome == TestOutcome::Correct;
        let record = self
            .ledger
            .record_outcome(&session.target_name, correct, Utc::now());

        log_info!(
            "Test {} for '{}' resolved {:?} ({}/{} correct)",
            session.id,
            session.target_name,
            outcome,
            record.correct,
            record.tested
        );
        events.push(EngineEvent::TestResolved {
            session_id: session.id.to_string(),
            target: session.target_name,
            outcome,
            record,
        });
        let prompt = if correct { "Correct!" } else { "Time's up. Try again." };
        self.announce(prompt, events);
    }

    fn commit_recording(&mut self, now: Instant, events: &mut Vec<EngineEvent>) {
        let Some(recording) = self.recording.finish() else {
            return;
        };
        self.timers
            .arm(TimerTag::RecognitionSettle, now + self.config.settle_delay);

        let Some(landmarks) = self.last_hands.clone() else {
            log_warn!("Recording '{}' ended without a hand in view", recording.name);
            events.push(EngineEvent::RecordingFailed {
                name: recording.name,
                reason: "No hand detected when the recording ended. Nothing was saved.".into(),
            });
            return;
        };

        let name = recording.name;
        let replaced = self
            .templates
            .insert(GestureTemplate::new(name.clone(), landmarks, Utc::now()))
            .is_some();
        self.ledger.sync_with_catalog(self.templates.names());

        log_info!("Saved sign '{}' (replaced: {})", name, replaced);
        events.push(EngineEvent::TemplateSaved {
            name: name.clone(),
            replaced,
        });
        self.announce(format!("Sign \"{name}\" has been saved"), events);
    }

    fn drop_hand(&mut self, events: &mut Vec<EngineEvent>) {
        self.hand_present = false;
        self.last_hands = None;
        self.recognition.clear();
        self.test.reset_streak();
        events.push(EngineEvent::HandLost);
    }

    fn cancel_session<F>(&mut self, cancel: F, events: &mut Vec<EngineEvent>)
    where
        F: FnOnce(&mut TestSessionMachine) -> Option<TestSession>,
    {
        if let Some(session) = cancel(&mut self.test) {
            self.timers.cancel(TimerTag::TestTimeout);
            self.timers.cancel(TimerTag::TestCooldown);
            log_info!("Test {} for '{}' cancelled", session.id, session.target_name);
            events.push(cancelled(&session));
        }
    }

    fn announce(&self, text: impl Into<String>, events: &mut Vec<EngineEvent>) {
        if self.announcements_enabled {
            events.push(EngineEvent::announcement(text));
        }
    }
}

fn cancelled(session: &TestSession) -> EngineEvent {
    EngineEvent::TestCancelled {
        session_id: session.id.to_string(),
        target: session.target_name.clone(),
    }
}

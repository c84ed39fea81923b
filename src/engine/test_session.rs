//! "Show me this sign" challenge state.
//!
//! Idle -> AwaitingMatch -> Cooldown(Correct | TimedOut) -> Idle. The
//! machine only tracks state; the engine owns the timeout and cooldown
//! timers and writes resolutions to the ledger.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::recognition::MatchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestOutcome {
    Correct,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestSessionState {
    Idle,
    AwaitingMatch,
    Cooldown(TestOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub id: Uuid,
    pub target_name: String,
    pub consecutive_match_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Awaiting(TestSession),
    Cooldown {
        session: TestSession,
        outcome: TestOutcome,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTest {
    pub session: TestSession,
    pub outcome: TestOutcome,
}

#[derive(Debug)]
pub struct TestSessionMachine {
    phase: Phase,
}

impl Default for TestSessionMachine {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl TestSessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TestSessionState {
        match &self.phase {
            Phase::Idle => TestSessionState::Idle,
            Phase::Awaiting(_) => TestSessionState::AwaitingMatch,
            Phase::Cooldown { outcome, .. } => TestSessionState::Cooldown(*outcome),
        }
    }

    pub fn session(&self) -> Option<&TestSession> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Awaiting(session) | Phase::Cooldown { session, .. } => Some(session),
        }
    }

    /// True while a challenge is pending or its result is on display.
    pub fn is_live(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase, Phase::Awaiting(_))
    }

    /// Starts a challenge for `target`. A pending challenge is preempted and
    /// returned; starting during cooldown is refused.
    pub fn start(
        &mut self,
        target: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(TestSession, Option<TestSession>)> {
        let preempted = match &self.phase {
            Phase::Cooldown { .. } => {
                bail!("previous test result is still showing; try again shortly")
            }
            Phase::Awaiting(previous) => Some(previous.clone()),
            Phase::Idle => None,
        };

        let session = TestSession {
            id: Uuid::new_v4(),
            target_name: target.to_string(),
            consecutive_match_count: 0,
            started_at,
        };
        self.phase = Phase::Awaiting(session.clone());
        Ok((session, preempted))
    }

    /// Feeds one recognition result. Returns the resolution when the streak
    /// requirement is met.
    pub fn observe(
        &mut self,
        outcome: &MatchOutcome,
        required_streak: u32,
    ) -> Option<ResolvedTest> {
        let Phase::Awaiting(session) = &mut self.phase else {
            return None;
        };

        if outcome.matched_name() == Some(session.target_name.as_str()) {
            session.consecutive_match_count += 1;
        } else {
            session.consecutive_match_count = 0;
        }

        if session.consecutive_match_count >= required_streak {
            let session = session.clone();
            return Some(self.enter_cooldown(session, TestOutcome::Correct));
        }
        None
    }

    pub fn reset_streak(&mut self) {
        if let Phase::Awaiting(session) = &mut self.phase {
            session.consecutive_match_count = 0;
        }
    }

    /// Resolves a pending challenge as timed out. No-op in any other state.
    pub fn time_out(&mut self) -> Option<ResolvedTest> {
        match &self.phase {
            Phase::Awaiting(session) => {
                let session = session.clone();
                Some(self.enter_cooldown(session, TestOutcome::TimedOut))
            }
            _ => None,
        }
    }

    /// Cooldown over. Returns false if there was no cooldown to finish.
    pub fn finish_cooldown(&mut self) -> bool {
        if matches!(self.phase, Phase::Cooldown { .. }) {
            self.phase = Phase::Idle;
            true
        } else {
            false
        }
    }

    /// Drops any pending challenge or cooldown without a resolution.
    pub fn cancel(&mut self) -> Option<TestSession> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => None,
            Phase::Awaiting(session) | Phase::Cooldown { session, .. } => Some(session),
        }
    }

    pub fn cancel_if_targeting(&mut self, name: &str) -> Option<TestSession> {
        let targeted = self
            .session()
            .is_some_and(|session| session.target_name == name);
        if targeted {
            self.cancel()
        } else {
            None
        }
    }

    fn enter_cooldown(&mut self, session: TestSession, outcome: TestOutcome) -> ResolvedTest {
        self.phase = Phase::Cooldown {
            session: session.clone(),
            outcome,
        };
        ResolvedTest { session, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(name: &str) -> MatchOutcome {
        MatchOutcome::MatchFound {
            name: name.to_string(),
            score: 0.0,
        }
    }

    fn awaiting(target: &str) -> TestSessionMachine {
        let mut machine = TestSessionMachine::new();
        machine.start(target, Utc::now()).unwrap();
        machine
    }

    #[test]
    fn streak_resolves_correct() {
        let mut machine = awaiting("A");
        for _ in 0..4 {
            assert!(machine.observe(&found("A"), 5).is_none());
        }
        let resolved = machine.observe(&found("A"), 5).unwrap();
        assert_eq!(resolved.outcome, TestOutcome::Correct);
        assert_eq!(resolved.session.consecutive_match_count, 5);
        assert_eq!(machine.state(), TestSessionState::Cooldown(TestOutcome::Correct));
    }

    #[test]
    fn other_match_or_no_match_resets_streak() {
        let mut machine = awaiting("A");
        for interruption in [found("B"), MatchOutcome::NoMatch] {
            for _ in 0..4 {
                machine.observe(&found("A"), 5);
            }
            machine.observe(&interruption, 5);
            assert_eq!(machine.session().unwrap().consecutive_match_count, 0);
        }
        assert_eq!(machine.state(), TestSessionState::AwaitingMatch);
    }

    #[test]
    fn timeout_only_applies_while_awaiting() {
        let mut machine = awaiting("A");
        assert_eq!(machine.time_out().unwrap().outcome, TestOutcome::TimedOut);
        assert!(machine.time_out().is_none());
        assert!(machine.observe(&found("A"), 1).is_none());

        assert!(machine.finish_cooldown());
        assert_eq!(machine.state(), TestSessionState::Idle);
        assert!(machine.time_out().is_none());
    }

    #[test]
    fn start_preempts_pending_but_not_cooldown() {
        let mut machine = awaiting("A");
        let (session, preempted) = machine.start("B", Utc::now()).unwrap();
        assert_eq!(preempted.unwrap().target_name, "A");
        assert_eq!(session.target_name, "B");

        machine.time_out();
        assert!(machine.start("C", Utc::now()).is_err());
        assert_eq!(machine.session().unwrap().target_name, "B");
    }

    #[test]
    fn cancel_if_targeting_matches_name() {
        let mut machine = awaiting("A");
        assert!(machine.cancel_if_targeting("B").is_none());
        assert_eq!(machine.cancel_if_targeting("A").unwrap().target_name, "A");
        assert!(!machine.is_live());
    }
}

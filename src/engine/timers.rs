//! Cancellable one-shot deadlines keyed by purpose.
//!
//! Each tag has at most one armed deadline. Arming a tag again replaces the
//! previous deadline and bumps the generation, so a ticket handed out for
//! the old deadline can no longer be claimed.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerTag {
    HandGrace,
    TestTimeout,
    TestCooldown,
    RecordingCapture,
    RecognitionSettle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub tag: TimerTag,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    generation: u64,
    due: Instant,
}

#[derive(Debug, Default)]
pub struct TimerSet {
    armed: HashMap<TimerTag, ArmedTimer>,
    next_generation: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, tag: TimerTag, due: Instant) -> TimerTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed.insert(tag, ArmedTimer { generation, due });
        TimerTicket { tag, generation }
    }

    pub fn cancel(&mut self, tag: TimerTag) -> bool {
        self.armed.remove(&tag).is_some()
    }

    pub fn is_armed(&self, tag: TimerTag) -> bool {
        self.armed.contains_key(&tag)
    }

    /// Ticket for the deadline currently armed under `tag`.
    pub fn ticket(&self, tag: TimerTag) -> Option<TimerTicket> {
        self.armed.get(&tag).map(|armed| TimerTicket {
            tag,
            generation: armed.generation,
        })
    }

    /// Disarms the timer if `ticket` still refers to the armed deadline.
    /// Returns false for stale or cancelled tickets.
    pub fn claim(&mut self, ticket: TimerTicket) -> bool {
        match self.armed.get(&ticket.tag) {
            Some(armed) if armed.generation == ticket.generation => {
                self.armed.remove(&ticket.tag);
                true
            }
            _ => false,
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.armed.values().map(|armed| armed.due).min()
    }

    /// Earliest deadline at or before `now`; ties go to the timer armed first.
    pub fn next_expired(&self, now: Instant) -> Option<TimerTicket> {
        self.armed
            .iter()
            .filter(|(_, armed)| armed.due <= now)
            .min_by_key(|(_, armed)| (armed.due, armed.generation))
            .map(|(tag, armed)| TimerTicket {
                tag: *tag,
                generation: armed.generation,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rearming_invalidates_old_ticket() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        let stale = timers.arm(TimerTag::TestTimeout, now + Duration::from_secs(7));
        let fresh = timers.arm(TimerTag::TestTimeout, now + Duration::from_secs(7));

        assert!(!timers.claim(stale));
        assert!(timers.claim(fresh));
        assert!(!timers.claim(fresh));
    }

    #[test]
    fn ticket_tracks_the_latest_arming() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        assert!(timers.ticket(TimerTag::TestTimeout).is_none());

        let first = timers.arm(TimerTag::TestTimeout, now);
        assert_eq!(timers.ticket(TimerTag::TestTimeout), Some(first));
        let second = timers.arm(TimerTag::TestTimeout, now);
        assert_eq!(timers.ticket(TimerTag::TestTimeout), Some(second));
        assert_ne!(first, second);
    }

    #[test]
    fn cancelled_ticket_cannot_be_claimed() {
        let mut timers = TimerSet::new();
        let ticket = timers.arm(TimerTag::HandGrace, Instant::now());
        assert!(timers.cancel(TimerTag::HandGrace));
        assert!(!timers.claim(ticket));
        assert!(!timers.cancel(TimerTag::HandGrace));
    }

    #[test]
    fn expired_timers_come_out_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerTag::TestCooldown, now + Duration::from_millis(20));
        timers.arm(TimerTag::HandGrace, now + Duration::from_millis(10));
        timers.arm(TimerTag::TestTimeout, now + Duration::from_secs(5));

        assert_eq!(timers.next_due(), Some(now + Duration::from_millis(10)));
        assert!(timers.next_expired(now).is_none());

        let later = now + Duration::from_millis(30);
        let first = timers.next_expired(later).unwrap();
        assert_eq!(first.tag, TimerTag::HandGrace);
        assert!(timers.claim(first));
        assert_eq!(timers.next_expired(later).unwrap().tag, TimerTag::TestCooldown);
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let due = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerTag::RecordingCapture, due);
        timers.arm(TimerTag::TestTimeout, due);
        assert_eq!(timers.next_expired(due).unwrap().tag, TimerTag::RecordingCapture);
    }
}

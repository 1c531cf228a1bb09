//! Engine Timers
//!
//! Keyed one-shot timers with explicit fire times in milliseconds.
//! Each key holds at most one deadline; scheduling a key again replaces it.
//! Due timers pop in (deadline, key) order, so firing is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::game::catalog::{Buff, Target};

/// Milliseconds on the engine clock.
pub type Millis = u64;

/// What a timer is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "timer", rename_all = "snake_case")]
pub enum TimerKey {
    /// Pre-fight countdown.
    Countdown,
    /// Next mana regeneration.
    ManaRegen,
    /// Next tick of a buff on one side (local frame).
    BuffTick {
        /// Whose buff.
        side: Target,
        /// Which buff.
        buff: Buff,
    },
}

/// Pending timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    by_key: BTreeMap<TimerKey, Millis>,
    by_deadline: BTreeSet<(Millis, TimerKey)>,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` at `at`, replacing any earlier deadline for it.
    pub fn schedule(&mut self, key: TimerKey, at: Millis) {
        if let Some(old) = self.by_key.insert(key, at) {
            self.by_deadline.remove(&(old, key));
        }
        self.by_deadline.insert((at, key));
    }

    /// Cancel `key`. Returns whether it was pending.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.by_key.remove(&key) {
            Some(at) => {
                self.by_deadline.remove(&(at, key));
                true
            }
            None => false,
        }
    }

    /// Cancel everything.
    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_deadline.clear();
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.by_deadline.first().map(|(at, _)| *at)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<TimerKey> {
        let (at, key) = *self.by_deadline.first()?;
        if at > now {
            return None;
        }
        self.by_deadline.remove(&(at, key));
        self.by_key.remove(&key);
        Some(key)
    }

    /// Deadline of `key`, if pending.
    pub fn deadline(&self, key: TimerKey) -> Option<Millis> {
        self.by_key.get(&key).copied()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule(TimerKey::ManaRegen, 2000);
        q.schedule(TimerKey::Countdown, 500);

        assert_eq!(q.next_deadline(), Some(500));
        assert_eq!(q.pop_due(100), None);
        assert_eq!(q.pop_due(2500), Some(TimerKey::Countdown));
        assert_eq!(q.pop_due(2500), Some(TimerKey::ManaRegen));
        assert!(q.is_empty());
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut q = TimerQueue::new();
        let key = TimerKey::BuffTick { side: Target::Me, buff: Buff::Weakness };
        q.schedule(key, 1000);
        q.schedule(key, 3000);

        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(1500), None);
        assert_eq!(q.deadline(key), Some(3000));
    }

    #[test]
    fn test_cancel_and_clear() {
        let mut q = TimerQueue::new();
        q.schedule(TimerKey::ManaRegen, 10);
        assert!(q.cancel(TimerKey::ManaRegen));
        assert!(!q.cancel(TimerKey::ManaRegen));
        assert_eq!(q.pop_due(100), None);

        q.schedule(TimerKey::Countdown, 10);
        q.schedule(TimerKey::ManaRegen, 20);
        q.clear();
        assert_eq!(q.next_deadline(), None);
    }

    #[test]
    fn test_same_deadline_tie_break_by_key() {
        let mut q = TimerQueue::new();
        q.schedule(TimerKey::ManaRegen, 100);
        q.schedule(TimerKey::Countdown, 100);
        assert_eq!(q.pop_due(100), Some(TimerKey::Countdown));
        assert_eq!(q.pop_due(100), Some(TimerKey::ManaRegen));
    }
}

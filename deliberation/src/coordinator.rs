//! Decision coordinator: per-subject mutual exclusion with cooldown.
//!
//! A subject is either idle, in flight, or cooling down until an expiry
//! instant. `try_start` is an atomic check-and-set under one mutex. Expired
//! cooldowns are pruned lazily on access. State lives for the process only.
//!
//! The `*_at` variants take the current instant explicitly so tests can drive
//! the clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Cooldown applied by [`DecisionCoordinator::finish`] when none is given.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectState {
    InFlight,
    Cooling { until: Instant },
}

#[derive(Debug, Default)]
pub struct DecisionCoordinator {
    subjects: Mutex<HashMap<String, SubjectState>>,
}

impl DecisionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SubjectState>> {
        match self.subjects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim `subject_id`. False when it is in flight or cooling down.
    pub fn try_start(&self, subject_id: &str) -> bool {
        self.try_start_at(subject_id, Instant::now())
    }

    pub fn try_start_at(&self, subject_id: &str, now: Instant) -> bool {
        let mut subjects = self.lock();
        prune(&mut subjects, now);
        match subjects.get(subject_id) {
            Some(SubjectState::InFlight) => {
                debug!(subject_id, "Rejected: already in flight");
                false
            }
            Some(SubjectState::Cooling { until }) => {
                debug!(
                    subject_id,
                    remaining_ms = until.saturating_duration_since(now).as_millis() as u64,
                    "Rejected: cooling down"
                );
                false
            }
            None => {
                subjects.insert(subject_id.to_string(), SubjectState::InFlight);
                true
            }
        }
    }

    /// Release `subject_id` into a cooldown (default 15 s when `None`).
    pub fn finish(&self, subject_id: &str, cooldown: Option<Duration>) {
        self.finish_at(subject_id, cooldown, Instant::now());
    }

    pub fn finish_at(&self, subject_id: &str, cooldown: Option<Duration>, now: Instant) {
        let cooldown = cooldown.unwrap_or(DEFAULT_COOLDOWN);
        self.set_cooldown_at(subject_id, cooldown, now);
        debug!(subject_id, cooldown_ms = cooldown.as_millis() as u64, "Subject finished");
    }

    /// Put `subject_id` into cooldown, clearing any in-flight flag.
    pub fn set_cooldown(&self, subject_id: &str, duration: Duration) {
        self.set_cooldown_at(subject_id, duration, Instant::now());
    }

    pub fn set_cooldown_at(&self, subject_id: &str, duration: Duration, now: Instant) {
        let mut subjects = self.lock();
        if duration.is_zero() {
            subjects.remove(subject_id);
            return;
        }
        subjects.insert(
            subject_id.to_string(),
            SubjectState::Cooling {
                until: now + duration,
            },
        );
        info!(
            subject_id,
            cooldown_ms = duration.as_millis() as u64,
            "Subject cooling down"
        );
    }

    pub fn is_busy(&self, subject_id: &str) -> bool {
        self.is_busy_at(subject_id, Instant::now())
    }

    /// In flight or cooling down.
    pub fn is_busy_at(&self, subject_id: &str, now: Instant) -> bool {
        let mut subjects = self.lock();
        prune(&mut subjects, now);
        subjects.contains_key(subject_id)
    }

    pub fn cooldown_remaining(&self, subject_id: &str) -> Option<Duration> {
        self.cooldown_remaining_at(subject_id, Instant::now())
    }

    /// Time left in the cooldown. `None` when idle or in flight.
    pub fn cooldown_remaining_at(&self, subject_id: &str, now: Instant) -> Option<Duration> {
        let mut subjects = self.lock();
        prune(&mut subjects, now);
        match subjects.get(subject_id) {
            Some(SubjectState::Cooling { until }) => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Subjects currently tracked (in flight or cooling).
    pub fn tracked(&self) -> usize {
        let mut subjects = self.lock();
        prune(&mut subjects, Instant::now());
        subjects.len()
    }
}

fn prune(subjects: &mut HashMap<String, SubjectState>, now: Instant) {
    subjects.retain(|_, state| match state {
        SubjectState::InFlight => true,
        SubjectState::Cooling { until } => *until > now,
    });
}

// SPDX-License-Identifier: MIT

//! Cooldown shared by all triggers flagged `enforce_special_timeout`

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Active,
    Expired,
}

/// Remembers when a special trigger last produced a reply.
///
/// Starts expired. Goes active only when a special trigger actually sends
/// something; drops back to expired once `now - last_fired >= window`.
/// Never reset except by building a new tracker.
#[derive(Debug, Clone)]
pub struct SpecialTimeoutTracker {
    window: Duration,
    last_fired: Option<DateTime<Utc>>,
}

impl SpecialTimeoutTracker {
    pub fn new(window_secs: u64) -> Self {
        let secs = i64::try_from(window_secs).unwrap_or(i64::MAX);
        Self {
            window: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
            last_fired: None,
        }
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    pub fn state(&self, now: DateTime<Utc>) -> CooldownState {
        match self.last_fired {
            Some(fired) if now.signed_duration_since(fired) < self.window => {
                CooldownState::Active
            }
            _ => CooldownState::Expired,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == CooldownState::Active
    }

    pub fn record_fire(&mut self, now: DateTime<Utc>) {
        self.last_fired = Some(now);
    }
}

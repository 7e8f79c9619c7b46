// SPDX-License-Identifier: MIT

//! Trigger router
//!
//! Walks the trigger list in file order for each message. Every trigger that
//! matches and draws a response produces one outcome; a failing trigger is
//! logged and skipped without affecting the others.

use super::condition::{self, Expression};
use super::context::{MessageContext, Platform};
use super::loader::TriggerSet;
use super::selector::{DrawSource, RandomDraw, ResponseTable};
use super::template::Template;
use super::timeout::SpecialTimeoutTracker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Compiled trigger, ready for evaluation
#[derive(Debug, Clone)]
pub struct TriggerRule {
    /// Position in the trigger file
    pub index: usize,
    pub test: Expression,
    pub legacy_instance: Template,
    pub responses: ResponseTable<Template>,
    pub enforce_special_timeout: bool,
    pub send_cubes_count: u32,
}

/// A reply the platform adapter should send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseOutcome {
    pub text: String,
    /// Rendered `legacy_instance`: the topic or thread label for the reply
    pub instance: String,
    pub send_cubes_count: u32,
}

/// Evaluates triggers against incoming messages.
///
/// The tracker lock is held for the whole evaluation of one message, so
/// concurrent deliveries are processed one after another.
#[derive(Debug)]
pub struct TriggerRouter {
    rules: Vec<TriggerRule>,
    tracker: Mutex<SpecialTimeoutTracker>,
    exempt: Vec<Platform>,
}

impl TriggerRouter {
    pub fn new(rules: Vec<TriggerRule>, trigger_timeout_s: u64) -> Self {
        Self {
            rules,
            tracker: Mutex::new(SpecialTimeoutTracker::new(trigger_timeout_s)),
            exempt: Vec::new(),
        }
    }

    pub fn from_set(set: TriggerSet) -> Self {
        let timeout = set.timeout_s();
        Self::new(set.into_rules(), timeout)
    }

    /// Platforms on which `enforce_special_timeout` is ignored
    pub fn with_exempt_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.exempt = platforms.into_iter().collect();
        self
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    pub fn enforces_special_timeout(&self, platform: Platform) -> bool {
        !self.exempt.contains(&platform)
    }

    /// Copy of the cooldown state
    pub fn tracker(&self) -> SpecialTimeoutTracker {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Evaluate a message using the wall clock and the thread RNG
    pub fn route(&self, ctx: &MessageContext, platform: Platform) -> Vec<ResponseOutcome> {
        self.route_with(ctx, platform, Utc::now(), &mut RandomDraw)
    }

    /// Evaluate a message with an explicit clock and draw source
    pub fn route_with(
        &self,
        ctx: &MessageContext,
        platform: Platform,
        now: DateTime<Utc>,
        draw: &mut dyn DrawSource,
    ) -> Vec<ResponseOutcome> {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let enforce = self.enforces_special_timeout(platform);
        let mut outcomes = Vec::new();

        for rule in &self.rules {
            let special = enforce && rule.enforce_special_timeout;
            if special && tracker.is_active(now) {
                log::debug!("Trigger {} skipped: special timeout active", rule.index);
                continue;
            }

            match condition::matches(&rule.test, ctx) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    log::warn!("Trigger {} test failed, treating as no match: {}", rule.index, e);
                    continue;
                }
            }

            let roll = draw.draw();
            let Some(template) = rule.responses.select(roll) else {
                log::debug!("Trigger {} matched but draw {} chose no response", rule.index, roll);
                continue;
            };

            let rendered = template.render(ctx).and_then(|text| {
                rule.legacy_instance
                    .render(ctx)
                    .map(|instance| (text, instance))
            });
            let (text, instance) = match rendered {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("Trigger {} response failed to render: {}", rule.index, e);
                    continue;
                }
            };

            log::info!(
                "Trigger {} fired on {} for {} (draw {})",
                rule.index,
                platform,
                ctx.sender,
                roll
            );
            if special {
                tracker.record_fire(now);
            }
            outcomes.push(ResponseOutcome {
                text,
                instance,
                send_cubes_count: rule.send_cubes_count,
            });
        }

        outcomes
    }
}

// SPDX-License-Identifier: MIT

//! Platform adapters
//!
//! Each adapter turns a platform payload into a [`MessageContext`], and
//! supplies a [`Responder`] that knows where replies for that message go.

pub mod slack;
pub mod zulip;

use crate::engine::{DispatchError, MessageContext, Platform, ResponseOutcome, TriggerRouter};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Pause before each cube
pub const CUBE_PAUSE: Duration = Duration::from_secs(1);

/// Sends output for one incoming message
#[async_trait]
pub trait Responder: Send + Sync {
    fn platform(&self) -> Platform;

    /// Send `text` to the topic/thread named by `instance`
    async fn reply(&self, instance: &str, text: &str) -> Result<(), DispatchError>;

    /// Post one cube next to the original message
    async fn send_cube(&self) -> Result<(), DispatchError>;
}

/// What happened while dispatching one message's outcomes
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub replies_sent: usize,
    pub cubes_sent: usize,
    pub errors: Vec<DispatchError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Deliver outcomes in order. A failed reply or cube is logged and recorded;
/// the rest still go out. Nothing is retried.
pub async fn dispatch(
    outcomes: &[ResponseOutcome],
    responder: &dyn Responder,
    cube_pause: Duration,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for outcome in outcomes {
        match responder.reply(&outcome.instance, &outcome.text).await {
            Ok(()) => report.replies_sent += 1,
            Err(e) => {
                log::error!("{} reply to {} failed: {}", responder.platform(), outcome.instance, e);
                report.errors.push(e);
            }
        }

        for _ in 0..outcome.send_cubes_count {
            if !cube_pause.is_zero() {
                tokio::time::sleep(cube_pause).await;
            }
            match responder.send_cube().await {
                Ok(()) => report.cubes_sent += 1,
                Err(e) => {
                    log::error!("{} cube failed: {}", responder.platform(), e);
                    report.errors.push(e);
                }
            }
        }
    }

    report
}

/// Run the triggers for one message and deliver whatever they produce
pub async fn handle_message(
    router: &TriggerRouter,
    ctx: &MessageContext,
    responder: &dyn Responder,
) -> DispatchReport {
    let outcomes = router.route(ctx, responder.platform());
    if outcomes.is_empty() {
        return DispatchReport::default();
    }
    dispatch(&outcomes, responder, CUBE_PAUSE).await
}

static ABTECH_REALM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)@ABTECH\.ORG").unwrap());
static ANDREW_REALM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)@ANDREW\.CMU\.EDU").unwrap());
static HAS_REALM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+@\w+").unwrap());

/// Canonical form of a user id across realms: known realms are stripped,
/// and ids left without a realm are lowercased.
pub fn real_id(id: &str) -> String {
    let name = id.trim_end();
    let name = ABTECH_REALM
        .captures(name)
        .or_else(|| ANDREW_REALM.captures(name))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(name);

    if HAS_REALM.is_match(name) {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Local part of an email address, canonicalized
pub fn sender_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    real_id(local)
}

// SPDX-License-Identifier: MIT

//! Slack adapter
//!
//! Events API payloads are classified first (route, refuse, ignore); only
//! routed messages reach the trigger engine. Replies go out through
//! `chat.postMessage` in the thread of the triggering message.

use super::{sender_from_email, Responder};
use crate::daemon::config::SlackConfig;
use crate::daemon::cube::{CubeCommand, CubeTarget};
use crate::engine::{DispatchError, MessageContext, Platform};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DM_REFUSAL: &str = "Sorry, I don't respond to DMs.  Talk to me in a channel!";
pub const NOT_WHITELISTED: &str = "I'm sorry, but I'm only allowed to play in specific channels.\n\
If you think I should be in this channel, please talk to a HoT and one of my handlers.\n\
I will continue to respond with this message until I am removed from this channel.";

/// Sender name used for messages relayed by the Zulip bridge
pub const BRIDGE_SENDER: &str = "bridge-bot";

const ROUTED_SUBTYPES: [&str; 3] = ["thread_broadcast", "message_replied", "file_share"];

static BRIDGE_PREAMBLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*.+\*: ([\s\S]*)").unwrap());

/// Top-level Events API request body
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackPayload {
    UrlVerification {
        challenge: String,
        #[serde(default)]
        token: Option<String>,
    },
    EventCallback {
        #[serde(default)]
        token: Option<String>,
        event: SlackEvent,
    },
    #[serde(other)]
    Other,
}

impl SlackPayload {
    pub fn token(&self) -> Option<&str> {
        match self {
            SlackPayload::UrlVerification { token, .. } | SlackPayload::EventCallback { token, .. } => {
                token.as_deref()
            }
            SlackPayload::Other => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// A channel message that should be run through the triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackMessage {
    pub channel: String,
    /// User id; the bridge app's user id for bridged messages
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub from_bridge: bool,
}

impl SlackMessage {
    /// Thread replies belong in: the parent thread, or the message itself
    pub fn thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn display_sender(&self) -> String {
        format!("<@{}>", self.user)
    }

    pub fn to_context(&self, sender: impl Into<String>) -> MessageContext {
        MessageContext::new("slack", sender, self.text.clone())
            .with_channel(self.channel.clone())
            .with_display_sender(self.display_sender())
    }
}

/// What to do with an incoming event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    Route(SlackMessage),
    RefuseDm { channel: String },
    NotWhitelisted { channel: String },
    Ignore,
}

/// Decide how an event is handled. Subtype filtering comes first so other
/// bots never get the refusal notices.
pub fn classify(event: &SlackEvent, config: &SlackConfig) -> Routing {
    if event.kind != "message" {
        return Routing::Ignore;
    }
    // our own replies, and any other app's, carry a bot_id
    if event.bot_id.is_some() && event.bot_id != config.bridge_bot_id {
        return Routing::Ignore;
    }

    let from_bridge = match event.subtype.as_deref() {
        None => false,
        Some(s) if ROUTED_SUBTYPES.contains(&s) => false,
        Some("bot_message") => {
            let is_bridge = event.bot_id.is_some() && event.bot_id == config.bridge_bot_id;
            if !is_bridge {
                return Routing::Ignore;
            }
            true
        }
        Some(other) => {
            log::debug!("Ignoring Slack message subtype {}", other);
            return Routing::Ignore;
        }
    };

    let Some(channel) = event.channel.clone() else {
        return Routing::Ignore;
    };

    if event.channel_type.as_deref() == Some("im") {
        return Routing::RefuseDm { channel };
    }

    if !config.channel_whitelist.contains(&channel) {
        if config.silent_channels.contains(&channel) {
            return Routing::Ignore;
        }
        return Routing::NotWhitelisted { channel };
    }

    let text = if from_bridge {
        match strip_bridge_preamble(&event.text) {
            Some(text) => text.to_string(),
            None => {
                log::error!("Could not strip preamble from bridge message: {:?}", event.text);
                return Routing::Ignore;
            }
        }
    } else {
        event.text.clone()
    };

    let user = if from_bridge {
        config
            .bridge_bot_user_id
            .clone()
            .or_else(|| event.user.clone())
    } else {
        event.user.clone()
    };
    let Some(user) = user else {
        return Routing::Ignore;
    };

    Routing::Route(SlackMessage {
        channel,
        user,
        text,
        ts: event.ts.clone(),
        thread_ts: event.thread_ts.clone(),
        from_bridge,
    })
}

/// Body of a bridged message, without the `*name*: ` prefix
pub fn strip_bridge_preamble(text: &str) -> Option<&str> {
    BRIDGE_PREAMBLE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    email: Option<String>,
}

/// Web API client for the two calls the trigger path needs
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: Client::new(),
            token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), DispatchError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let resp: ApiResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PostMessage {
                channel,
                text,
                thread_ts,
            })
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(DispatchError::api(
                "slack",
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(())
    }

    /// Profile email of a user
    pub async fn user_email(&self, user: &str) -> Result<String, DispatchError> {
        let url = format!("{}/users.profile.get", self.api_base);
        let resp: ProfileResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user", user)])
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(DispatchError::api(
                "slack",
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        resp.profile
            .and_then(|p| p.email)
            .ok_or_else(|| DispatchError::api("slack", format!("no email for {}", user)))
    }

    /// Trigger `sender` for a routed message. Lookup failures fall back to
    /// the raw user id.
    pub async fn resolve_sender(&self, message: &SlackMessage) -> String {
        if message.from_bridge {
            return BRIDGE_SENDER.to_string();
        }
        match self.user_email(&message.user).await {
            Ok(email) => sender_from_email(&email),
            Err(e) => {
                log::warn!("Cannot look up email for {}: {}", message.user, e);
                message.user.clone()
            }
        }
    }
}

/// Replies into the thread of the triggering message
pub struct SlackResponder {
    client: Arc<SlackClient>,
    channel: String,
    thread_ts: String,
    cube: Option<Arc<CubeCommand>>,
}

impl SlackResponder {
    pub fn new(
        client: Arc<SlackClient>,
        message: &SlackMessage,
        cube: Option<Arc<CubeCommand>>,
    ) -> Self {
        Self {
            client,
            channel: message.channel.clone(),
            thread_ts: message.thread().to_string(),
            cube,
        }
    }
}

#[async_trait]
impl Responder for SlackResponder {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    async fn reply(&self, _instance: &str, text: &str) -> Result<(), DispatchError> {
        self.client
            .post_message(&self.channel, text, Some(&self.thread_ts))
            .await
    }

    async fn send_cube(&self) -> Result<(), DispatchError> {
        match &self.cube {
            Some(cube) => {
                cube.send(&CubeTarget {
                    platform: Platform::Slack,
                    channel: self.channel.clone(),
                    thread: self.thread_ts.clone(),
                })
                .await
            }
            None => {
                log::info!("Cube requested in {} but no cube command configured", self.channel);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> SlackConfig {
        SlackConfig {
            bot_token: "xoxb-test".to_string(),
            channel_whitelist: vec!["C01".to_string()],
            silent_channels: vec!["CGENERAL".to_string()],
            bridge_bot_id: Some("B99".to_string()),
            bridge_bot_user_id: Some("U99".to_string()),
            api_base: "https://slack.com/api/".to_string(),
        }
    }

    fn event(value: serde_json::Value) -> SlackEvent {
        serde_json::from_value(value).unwrap()
    }

    fn channel_message() -> serde_json::Value {
        json!({
            "type": "message",
            "channel": "C01",
            "channel_type": "channel",
            "user": "U123",
            "text": "anyone want a drink",
            "ts": "1700000000.000100"
        })
    }

    #[test]
    fn test_url_verification_payload() {
        let payload: SlackPayload = serde_json::from_value(json!({
            "type": "url_verification",
            "token": "tok",
            "challenge": "abc"
        }))
        .unwrap();
        assert_eq!(payload.token(), Some("tok"));
        assert!(matches!(payload, SlackPayload::UrlVerification { ref challenge, .. } if challenge == "abc"));
    }

    #[test]
    fn test_unknown_payload_type() {
        let payload: SlackPayload =
            serde_json::from_value(json!({"type": "app_rate_limited"})).unwrap();
        assert!(matches!(payload, SlackPayload::Other));
    }

    #[test]
    fn test_plain_message_routed() {
        let routing = classify(&event(channel_message()), &config());
        let Routing::Route(msg) = routing else {
            panic!("expected route, got {:?}", routing);
        };
        assert_eq!(msg.channel, "C01");
        assert_eq!(msg.thread(), "1700000000.000100");
        assert!(!msg.from_bridge);

        let ctx = msg.to_context("adamp");
        assert_eq!(ctx.instance, "slack");
        assert_eq!(ctx.channel, "C01");
        assert_eq!(ctx.display_sender, "<@U123>");
        assert_eq!(ctx.message, "anyone want a drink");
    }

    #[test]
    fn test_thread_reply_uses_parent_thread() {
        let mut value = channel_message();
        value["subtype"] = json!("thread_broadcast");
        value["thread_ts"] = json!("1699999999.000001");
        let Routing::Route(msg) = classify(&event(value), &config()) else {
            panic!("expected route");
        };
        assert_eq!(msg.thread(), "1699999999.000001");
    }

    #[test]
    fn test_edits_and_other_bots_ignored() {
        let mut edited = channel_message();
        edited["subtype"] = json!("message_changed");
        assert_eq!(classify(&event(edited), &config()), Routing::Ignore);

        let mut bot = channel_message();
        bot["subtype"] = json!("bot_message");
        bot["bot_id"] = json!("B01");
        assert_eq!(classify(&event(bot), &config()), Routing::Ignore);
    }

    #[test]
    fn test_own_bot_messages_ignored() {
        let own = event(json!({
            "type": "message",
            "channel": "C01",
            "user": "UBOT",
            "bot_id": "BSELF",
            "text": "DRINK!"
        }));
        assert_eq!(classify(&own, &config()), Routing::Ignore);
    }

    #[test]
    fn test_bridge_message_preamble_stripped() {
        let mut bridge = channel_message();
        bridge["subtype"] = json!("bot_message");
        bridge["bot_id"] = json!("B99");
        bridge["text"] = json!("*adamp*: time to\ndrink");
        let Routing::Route(msg) = classify(&event(bridge), &config()) else {
            panic!("expected route");
        };
        assert!(msg.from_bridge);
        assert_eq!(msg.user, "U99");
        assert_eq!(msg.display_sender(), "<@U99>");
        assert_eq!(msg.text, "time to\ndrink");
    }

    #[test]
    fn test_bridge_message_without_preamble_dropped() {
        let mut bridge = channel_message();
        bridge["subtype"] = json!("bot_message");
        bridge["bot_id"] = json!("B99");
        bridge["text"] = json!("no preamble");
        assert_eq!(classify(&event(bridge), &config()), Routing::Ignore);
    }

    #[test]
    fn test_dm_refused() {
        let mut dm = channel_message();
        dm["channel"] = json!("D01");
        dm["channel_type"] = json!("im");
        assert_eq!(
            classify(&event(dm), &config()),
            Routing::RefuseDm {
                channel: "D01".to_string()
            }
        );
    }

    #[test]
    fn test_channel_outside_whitelist() {
        let mut other = channel_message();
        other["channel"] = json!("C77");
        assert_eq!(
            classify(&event(other), &config()),
            Routing::NotWhitelisted {
                channel: "C77".to_string()
            }
        );

        let mut general = channel_message();
        general["channel"] = json!("CGENERAL");
        assert_eq!(classify(&event(general), &config()), Routing::Ignore);
    }

    #[test]
    fn test_non_message_events_ignored() {
        let reaction = event(json!({"type": "reaction_added", "user": "U1"}));
        assert_eq!(classify(&reaction, &config()), Routing::Ignore);
    }

    #[test]
    fn test_post_message_body_omits_missing_thread() {
        let body = serde_json::to_value(PostMessage {
            channel: "C01",
            text: "hi",
            thread_ts: None,
        })
        .unwrap();
        assert_eq!(body, json!({"channel": "C01", "text": "hi"}));
    }

    #[test]
    fn test_client_trims_api_base() {
        let client = SlackClient::new(&config());
        assert_eq!(client.api_base, "https://slack.com/api");
    }
}

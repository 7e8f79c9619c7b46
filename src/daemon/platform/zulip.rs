// SPDX-License-Identifier: MIT

//! Zulip adapter: outgoing-webhook payloads in, REST messages out

use super::{sender_from_email, Responder};
use crate::daemon::config::ZulipConfig;
use crate::daemon::cube::{CubeCommand, CubeTarget};
use crate::engine::{DispatchError, MessageContext, Platform};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Body of a Zulip outgoing webhook request
#[derive(Debug, Clone, Deserialize)]
pub struct ZulipWebhook {
    #[serde(default)]
    pub token: Option<String>,
    pub message: ZulipMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZulipMessage {
    /// `stream` or `private`
    #[serde(rename = "type")]
    pub kind: String,
    /// Stream name for stream messages, recipient list for private ones
    pub display_recipient: Value,
    #[serde(default)]
    pub subject: String,
    pub sender_email: String,
    pub content: String,
}

impl ZulipMessage {
    pub fn stream(&self) -> Option<&str> {
        if self.kind != "stream" {
            return None;
        }
        self.display_recipient.as_str()
    }

    /// Normalize into the trigger context, or `None` when the message is
    /// not in one of the trigger streams.
    pub fn to_context(&self, config: &ZulipConfig) -> Option<(String, MessageContext)> {
        let stream = self.stream()?;
        if !config.trigger_streams.iter().any(|s| s == stream) {
            log::debug!("Ignoring Zulip message in stream {}", stream);
            return None;
        }
        let ctx = MessageContext::new(
            self.subject.clone(),
            sender_from_email(&self.sender_email),
            self.content.clone(),
        );
        Some((stream.to_string(), ctx))
    }
}

#[derive(Debug, Deserialize)]
struct ZulipApiResponse {
    result: String,
    #[serde(default)]
    msg: String,
}

/// Minimal Zulip REST client
#[derive(Clone)]
pub struct ZulipClient {
    client: Client,
    site: String,
    email: String,
    api_key: String,
}

impl ZulipClient {
    pub fn new(config: &ZulipConfig) -> Self {
        Self {
            client: Client::new(),
            site: config.site.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Post to a stream topic
    pub async fn send_stream_message(
        &self,
        stream: &str,
        topic: &str,
        content: &str,
    ) -> Result<(), DispatchError> {
        let url = format!("{}/api/v1/messages", self.site);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.email, Some(&self.api_key))
            .form(&[
                ("type", "stream"),
                ("to", stream),
                ("topic", topic),
                ("content", content),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: ZulipApiResponse = resp.json().await?;
        if !status.is_success() || body.result != "success" {
            return Err(DispatchError::api("zulip", body.msg));
        }
        Ok(())
    }
}

/// Replies into the stream the message came from
pub struct ZulipResponder {
    client: Arc<ZulipClient>,
    stream: String,
    topic: String,
    cube: Option<Arc<CubeCommand>>,
}

impl ZulipResponder {
    pub fn new(
        client: Arc<ZulipClient>,
        stream: impl Into<String>,
        topic: impl Into<String>,
        cube: Option<Arc<CubeCommand>>,
    ) -> Self {
        Self {
            client,
            stream: stream.into(),
            topic: topic.into(),
            cube,
        }
    }
}

#[async_trait]
impl Responder for ZulipResponder {
    fn platform(&self) -> Platform {
        Platform::Zulip
    }

    async fn reply(&self, instance: &str, text: &str) -> Result<(), DispatchError> {
        self.client
            .send_stream_message(&self.stream, instance, text)
            .await
    }

    async fn send_cube(&self) -> Result<(), DispatchError> {
        match &self.cube {
            Some(cube) => {
                cube.send(&CubeTarget {
                    platform: Platform::Zulip,
                    channel: self.stream.clone(),
                    thread: self.topic.clone(),
                })
                .await
            }
            None => {
                log::info!("Cube requested in {} but no cube command configured", self.stream);
                Ok(())
            }
        }
    }
}

// SPDX-License-Identifier: MIT

//! Daemon configuration
//!
//! Read from a YAML (or JSON) file; secrets can be supplied through the
//! environment instead, which `.env` files feed via dotenv.

use crate::engine::error::ConfigError;
use crate::engine::Platform;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_ZULIP_API_KEY: &str = "ZULIP_API_KEY";
pub const ENV_SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_VERIFICATION_TOKEN: &str = "ZDAEMON_VERIFICATION_TOKEN";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DaemonConfig {
    #[serde(default = "default_triggers_file")]
    pub triggers_file: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Platforms where `enforce_special_timeout` has no effect
    #[serde(default = "default_exempt")]
    pub special_timeout_exempt: Vec<Platform>,
    /// Shared secret expected in webhook payloads, if set
    #[serde(default)]
    pub verification_token: Option<String>,
    #[serde(default)]
    pub zulip: Option<ZulipConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub cube: Option<CubeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ZulipConfig {
    /// Base URL, e.g. `https://abtech.zulipchat.com`
    pub site: String,
    /// Bot account email
    pub email: String,
    #[serde(default)]
    pub api_key: String,
    /// Streams whose messages are checked against triggers
    #[serde(default = "default_trigger_streams")]
    pub trigger_streams: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Channel ids the bot may talk in
    #[serde(default)]
    pub channel_whitelist: Vec<String>,
    /// Channels outside the whitelist where the bot stays quiet instead of complaining
    #[serde(default)]
    pub silent_channels: Vec<String>,
    /// Bot id of the Zulip bridge; its messages are routed like a user's
    #[serde(default)]
    pub bridge_bot_id: Option<String>,
    /// User id of the bridge app, mentioned as the sender of bridged messages
    #[serde(default)]
    pub bridge_bot_user_id: Option<String>,
    #[serde(default = "default_slack_api")]
    pub api_base: String,
}

/// External program that posts a cube
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CubeConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_triggers_file() -> PathBuf {
    PathBuf::from("triggers.yaml")
}

fn default_port() -> u16 {
    8080
}

fn default_exempt() -> Vec<Platform> {
    vec![Platform::Zulip]
}

fn default_trigger_streams() -> Vec<String> {
    vec!["abtech".to_string(), "zdaemon".to_string()]
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            triggers_file: default_triggers_file(),
            port: default_port(),
            special_timeout_exempt: default_exempt(),
            verification_token: None,
            zulip: None,
            slack: None,
            cube: None,
        }
    }
}

impl DaemonConfig {
    /// Load from a file, falling back to defaults when it does not exist,
    /// then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.is_file() {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Self::parse(&content)?
        } else {
            log::warn!(
                "Cannot find config file {}, using default values",
                path.display()
            );
            Self::default()
        };
        config.apply_env(|key| env::var(key).ok().filter(|v| !v.is_empty()));
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overlay secrets from the environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(zulip) = self.zulip.as_mut() {
            if let Some(key) = lookup(ENV_ZULIP_API_KEY) {
                zulip.api_key = key;
            }
        }
        if let Some(slack) = self.slack.as_mut() {
            if let Some(token) = lookup(ENV_SLACK_BOT_TOKEN) {
                slack.bot_token = token;
            }
        }
        if let Some(token) = lookup(ENV_VERIFICATION_TOKEN) {
            self.verification_token = Some(token);
        }
    }

    /// Check that the daemon has enough to serve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zulip.is_none() && self.slack.is_none() {
            return Err(ConfigError::invalid(
                "no platform configured: add a `zulip` or `slack` section",
            ));
        }
        if let Some(zulip) = &self.zulip {
            if zulip.api_key.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "zulip.api_key is empty (set it in the config or {})",
                    ENV_ZULIP_API_KEY
                )));
            }
            if zulip.trigger_streams.is_empty() {
                log::warn!("zulip.trigger_streams is empty; no Zulip message will reach triggers");
            }
        }
        if let Some(slack) = &self.slack {
            if slack.bot_token.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "slack.bot_token is empty (set it in the config or {})",
                    ENV_SLACK_BOT_TOKEN
                )));
            }
            if slack.bridge_bot_id.is_some() && slack.bridge_bot_user_id.is_none() {
                return Err(ConfigError::invalid(
                    "slack.bridge_bot_user_id is required when slack.bridge_bot_id is set",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
triggers_file: /etc/zdaemon/triggers.yaml
port: 9000
special_timeout_exempt: [zulip, slack]
zulip:
  site: https://abtech.zulipchat.com
  email: cube-bot@abtech.zulipchat.com
  api_key: secret
slack:
  bot_token: xoxb-1
  channel_whitelist: [C01, C02]
  bridge_bot_id: B99
  bridge_bot_user_id: U99
cube:
  command: sendcube
  args: ["--random"]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = DaemonConfig::parse(FULL).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.special_timeout_exempt,
            vec![Platform::Zulip, Platform::Slack]
        );
        let zulip = config.zulip.as_ref().unwrap();
        assert_eq!(zulip.trigger_streams, vec!["abtech", "zdaemon"]);
        let slack = config.slack.as_ref().unwrap();
        assert_eq!(slack.api_base, "https://slack.com/api");
        assert_eq!(slack.bridge_bot_id.as_deref(), Some("B99"));
        assert_eq!(slack.bridge_bot_user_id.as_deref(), Some("U99"));
        assert_eq!(config.cube.as_ref().unwrap().args, vec!["--random"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::parse("{}").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.special_timeout_exempt, vec![Platform::Zulip]);
        assert_eq!(config.triggers_file, PathBuf::from("triggers.yaml"));
    }

    #[test]
    fn test_json_config_accepted() {
        let config = DaemonConfig::parse(r#"{"port": 7000, "verification_token": "t"}"#).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.verification_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = DaemonConfig::parse(FULL).unwrap();
        let vars: HashMap<&str, &str> = [
            (ENV_ZULIP_API_KEY, "from-env"),
            (ENV_SLACK_BOT_TOKEN, "xoxb-env"),
            (ENV_VERIFICATION_TOKEN, "shh"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.zulip.unwrap().api_key, "from-env");
        assert_eq!(config.slack.unwrap().bot_token, "xoxb-env");
        assert_eq!(config.verification_token.as_deref(), Some("shh"));
    }

    #[test]
    fn test_validate_requires_platform_and_secrets() {
        assert!(DaemonConfig::default().validate().is_err());

        let mut config = DaemonConfig::parse(FULL).unwrap();
        config.slack.as_mut().unwrap().bot_token.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(ENV_SLACK_BOT_TOKEN));
    }

    #[test]
    fn test_validate_requires_bridge_user_id() {
        let mut config = DaemonConfig::parse(FULL).unwrap();
        config.slack.as_mut().unwrap().bridge_bot_user_id = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bridge_bot_user_id"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DaemonConfig::load("/nonexistent/zdaemon.yaml").unwrap();
        assert_eq!(config.port, 8080);
    }
}

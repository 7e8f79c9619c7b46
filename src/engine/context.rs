// SPDX-License-Identifier: MIT

//! Per-message variables visible to trigger templates

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five values a trigger template can reference.
///
/// Built fresh by a platform adapter for every incoming message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    /// Zulip topic, or the literal `slack` for Slack messages
    pub instance: String,
    /// Platform channel id; empty where the platform has none
    pub channel: String,
    /// Canonical username of the author
    pub sender: String,
    /// Mention-formatted author, used in replies
    pub display_sender: String,
    /// Raw message text
    pub message: String,
}

impl MessageContext {
    /// Build a context whose display name is the sender itself
    pub fn new(
        instance: impl Into<String>,
        sender: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let sender = sender.into();
        Self {
            instance: instance.into(),
            channel: String::new(),
            display_sender: sender.clone(),
            sender,
            message: message.into(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_display_sender(mut self, display_sender: impl Into<String>) -> Self {
        self.display_sender = display_sender.into();
        self
    }

    /// Look up a variable by its template name
    pub fn get(&self, var: Variable) -> &str {
        match var {
            Variable::Instance => &self.instance,
            Variable::Channel => &self.channel,
            Variable::Sender => &self.sender,
            Variable::DisplaySender => &self.display_sender,
            Variable::Message => &self.message,
        }
    }
}

/// Chat platform a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Zulip,
    Slack,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Zulip => write!(f, "zulip"),
            Platform::Slack => write!(f, "slack"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zulip" => Ok(Platform::Zulip),
            "slack" => Ok(Platform::Slack),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Template variable names, resolved at parse time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Instance,
    Channel,
    Sender,
    DisplaySender,
    Message,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::Instance,
        Variable::Channel,
        Variable::Sender,
        Variable::DisplaySender,
        Variable::Message,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::Instance => "instance",
            Variable::Channel => "channel",
            Variable::Sender => "sender",
            Variable::DisplaySender => "display_sender",
            Variable::Message => "message",
        }
    }
}

/// Runtime value produced while evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bool(bool),
    None,
}

impl Value {
    /// Jinja truthiness: empty strings, `False` and `None` are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::None => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::None => "none",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_display_sender() {
        let ctx = MessageContext::new("drink", "adamp", "hello");
        assert_eq!(ctx.display_sender, "adamp");
        assert_eq!(ctx.channel, "");
        assert_eq!(ctx.get(Variable::Instance), "drink");
    }

    #[test]
    fn test_variable_names_round_trip() {
        for var in Variable::ALL {
            assert_eq!(Variable::from_name(var.name()), Some(var));
        }
        assert_eq!(Variable::from_name("zclass"), None);
    }

    #[test]
    fn test_value_rendering_matches_jinja() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Bool(false).to_string(), "False");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Str("x".into()).to_string(), "x");
    }

    #[test]
    fn test_platform_parse_and_display() {
        assert_eq!("Slack".parse::<Platform>().unwrap(), Platform::Slack);
        assert_eq!(Platform::Zulip.to_string(), "zulip");
        assert!("zephyr".parse::<Platform>().is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("a".into()).is_truthy());
        assert!(!Value::None.is_truthy());
    }
}

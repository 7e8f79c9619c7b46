// SPDX-License-Identifier: MIT

//! Typed error handling for zdaemon-rs
//!
//! Only configuration faults are fatal. Template faults are per-rule and
//! dispatch faults are per-reply; callers log and move on.

use thiserror::Error;

/// Top-level error type for zdaemon-rs
#[derive(Debug, Error)]
pub enum ZdaemonError {
    /// Trigger file or daemon configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A trigger template failed while evaluating a message
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// A platform adapter failed to deliver a reply or cube
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Load-time configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File missing or unreadable
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid YAML for the expected schema
    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A template in a trigger failed to compile
    #[error("Trigger {index}: syntax error in {field} template `{template}`: {message}")]
    Syntax {
        index: usize,
        field: String,
        template: String,
        message: String,
    },

    /// A response weight table is malformed
    #[error("Trigger {index}: {message}")]
    Weights { index: usize, message: String },

    /// Several triggers are invalid; every problem is reported
    #[error("{} invalid trigger definition(s):\n{}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),

    /// Missing or inconsistent daemon settings
    #[error("{0}")]
    Invalid(String),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised while evaluating or rendering a compiled template
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Ordering comparison between values of different kinds
    #[error("Cannot compare {left} with {right} using `{op}`")]
    TypeMismatch {
        left: &'static str,
        op: String,
        right: &'static str,
    },

    /// `in` used with a non-string container
    #[error("`in` requires a string on the right-hand side, got {0}")]
    NotAContainer(&'static str),
}

/// Errors raised by platform adapters while delivering output
#[derive(Debug, Error)]
pub enum DispatchError {
    /// HTTP transport failure
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The platform API answered with an error
    #[error("API error from {platform}: {message}")]
    Api { platform: String, message: String },

    /// The cube command could not be run or exited unsuccessfully
    #[error("Cube command failed: {0}")]
    Cube(String),
}

impl ConfigError {
    /// Create a weight table error for the given trigger
    pub fn weights(index: usize, message: impl Into<String>) -> Self {
        Self::Weights {
            index,
            message: message.into(),
        }
    }

    /// Create a free-form configuration error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl DispatchError {
    /// Create an API error
    pub fn api(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_lists_every_error() {
        let err = ConfigError::Multiple(vec![
            ConfigError::weights(0, "weights sum to 120, more than 100"),
            ConfigError::weights(3, "negative weight -5"),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 invalid trigger definition(s)"));
        assert!(text.contains("Trigger 0: weights sum to 120"));
        assert!(text.contains("Trigger 3: negative weight -5"));
    }

    #[test]
    fn test_config_error_converts_to_top_level() {
        let err: ZdaemonError = ConfigError::invalid("no platforms enabled").into();
        assert_eq!(err.to_string(), "Configuration error: no platforms enabled");
    }
}

// SPDX-License-Identifier: MIT

//! Cube delivery through an external command
//!
//! The cube database lives outside this daemon. A configured program does
//! the sending; it learns where to post from environment variables.

use crate::daemon::config::CubeConfig;
use crate::engine::{DispatchError, Platform};
use tokio::process::Command;

pub const ENV_PLATFORM: &str = "ZDAEMON_PLATFORM";
pub const ENV_CHANNEL: &str = "ZDAEMON_CHANNEL";
pub const ENV_THREAD: &str = "ZDAEMON_THREAD";

/// Where a cube should be posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeTarget {
    pub platform: Platform,
    /// Zulip stream or Slack channel id
    pub channel: String,
    /// Zulip topic or Slack thread timestamp
    pub thread: String,
}

#[derive(Debug, Clone)]
pub struct CubeCommand {
    command: String,
    args: Vec<String>,
}

impl CubeCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &CubeConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    /// Run the command once and wait for it
    pub async fn send(&self, target: &CubeTarget) -> Result<(), DispatchError> {
        log::info!(
            "Sending cube via {} to {} {}",
            self.command,
            target.platform,
            target.channel
        );

        let output = Command::new(&self.command)
            .args(&self.args)
            .env(ENV_PLATFORM, target.platform.to_string())
            .env(ENV_CHANNEL, &target.channel)
            .env(ENV_THREAD, &target.thread)
            .output()
            .await
            .map_err(|e| DispatchError::Cube(format!("cannot run {}: {}", self.command, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DispatchError::Cube(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

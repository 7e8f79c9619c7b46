// SPDX-License-Identifier: MIT

//! Daemon glue: configuration, platform adapters, cube command, webhook server

pub mod config;
pub mod cube;
pub mod platform;
pub mod server;

pub use config::DaemonConfig;
pub use platform::{dispatch, handle_message, DispatchReport, Responder};

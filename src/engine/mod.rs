// SPDX-License-Identifier: MIT

//! Trigger engine: templates, weighted responses, special cooldown, routing.
//! No network I/O lives here.

pub mod condition;
pub mod context;
pub mod error;
pub mod loader;
pub mod router;
pub mod selector;
pub mod template;
pub mod timeout;
pub mod types;

pub use context::{MessageContext, Platform};
pub use error::{ConfigError, DispatchError, TemplateError, ZdaemonError};
pub use loader::{TriggerLoader, TriggerSet};
pub use router::{ResponseOutcome, TriggerRouter, TriggerRule};

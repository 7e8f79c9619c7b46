// SPDX-License-Identifier: MIT

//! Trigger test expressions
//!
//! A small typed predicate language compiled once when the trigger file is
//! loaded. Expressions look like Jinja tests:
//! - `instance == 'drink'`
//! - `message | regex_search('\bduh\b', ignorecase=True)`
//! - `{{ sender != 'zdaemon' and message | regex_match('^!ping') }}`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Filter, Pattern};
pub use evaluator::{evaluate, matches};
pub use parser::{parse, parse_expression, ParseError};

// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for trigger expressions

use crate::engine::context::{Value, Variable};
use regex::{Regex, RegexBuilder};
use std::fmt;

/// A compiled trigger expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// String, boolean or none literal
    Literal(Value),
    /// Reference to a message context field
    Var(Variable),
    /// `input | filter`
    Filter {
        input: Box<Expression>,
        filter: Filter,
    },
    /// Comparison expression: left op right
    Compare {
        left: Box<Expression>,
        op: CompareOp,
        right: Box<Expression>,
    },
    /// Logical AND (returns an operand, like Jinja)
    And(Box<Expression>, Box<Expression>),
    /// Logical OR (returns an operand, like Jinja)
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// substring test
    In,
    NotIn,
}

/// Filters applied with `|`
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// True iff the pattern matches at the start of the value
    RegexMatch(Pattern),
    /// True iff the pattern matches anywhere in the value
    RegexSearch(Pattern),
    Lower,
    Upper,
    Trim,
}

/// A regex compiled at load time, compared by its source
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    ignore_case: bool,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, ignore_case: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self {
            source: source.to_string(),
            ignore_case,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Leftmost-first search, so a hit at offset 0 is found whenever one exists.
    pub fn matches_start(&self, value: &str) -> bool {
        self.regex.find(value).is_some_and(|m| m.start() == 0)
    }

    pub fn matches_anywhere(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.ignore_case == other.ignore_case
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
        }
    }
}

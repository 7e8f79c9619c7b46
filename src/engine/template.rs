// SPDX-License-Identifier: MIT

//! Text templates for reply bodies and reply instances
//!
//! Literal text with `{{ expr }}` interpolations, e.g.
//! `"{{ display_sender }}: drink!"`.

use crate::engine::condition::{self, Expression, ParseError};
use crate::engine::context::MessageContext;
use crate::engine::error::TemplateError;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expression),
}

/// A compiled text template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, ParseError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(literal(&rest[..open])?);
            }
            let body = &rest[open + 2..];
            let close = find_close(body).ok_or_else(|| ParseError::new("unclosed `{{`"))?;
            segments.push(Segment::Expr(condition::parse_expression(&body[..close])?));
            rest = &body[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(literal(rest)?);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, ctx: &MessageContext) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&condition::evaluate(expr, ctx)?.to_string()),
            }
        }
        Ok(out)
    }
}

/// Literal text; statement and comment blocks are not supported
fn literal(text: &str) -> Result<Segment, ParseError> {
    if text.contains("{%") {
        return Err(ParseError::new("`{% %}` statements are not supported"));
    }
    if text.contains("{#") {
        return Err(ParseError::new("`{# #}` comments are not supported"));
    }
    Ok(Segment::Text(text.to_string()))
}

/// Byte offset of the `}}` closing an interpolation, skipping quoted text
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

// SPDX-License-Identifier: MIT

//! Trigger expression evaluator

use super::ast::{CompareOp, Expression, Filter};
use crate::engine::context::{MessageContext, Value};
use crate::engine::error::TemplateError;
use std::cmp::Ordering;

/// Evaluate an expression to a value against one message
pub fn evaluate(expr: &Expression, ctx: &MessageContext) -> Result<Value, TemplateError> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Var(var) => Ok(Value::Str(ctx.get(*var).to_string())),
        Expression::Filter { input, filter } => {
            let value = evaluate(input, ctx)?;
            Ok(apply_filter(filter, value))
        }
        Expression::Compare { left, op, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            compare(&left, *op, &right).map(Value::Bool)
        }
        Expression::And(left, right) => {
            let left = evaluate(left, ctx)?;
            if left.is_truthy() {
                evaluate(right, ctx)
            } else {
                Ok(left)
            }
        }
        Expression::Or(left, right) => {
            let left = evaluate(left, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                evaluate(right, ctx)
            }
        }
        Expression::Not(inner) => Ok(Value::Bool(!evaluate(inner, ctx)?.is_truthy())),
    }
}

/// A test matches only when it yields exactly boolean `True`.
pub fn matches(expr: &Expression, ctx: &MessageContext) -> Result<bool, TemplateError> {
    Ok(evaluate(expr, ctx)? == Value::Bool(true))
}

fn apply_filter(filter: &Filter, value: Value) -> Value {
    let text = match value {
        Value::Str(s) => s,
        other => other.to_string(),
    };
    match filter {
        Filter::RegexMatch(pattern) => Value::Bool(pattern.matches_start(&text)),
        Filter::RegexSearch(pattern) => Value::Bool(pattern.matches_anywhere(&text)),
        Filter::Lower => Value::Str(text.to_lowercase()),
        Filter::Upper => Value::Str(text.to_uppercase()),
        Filter::Trim => Value::Str(text.trim().to_string()),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, TemplateError> {
    match op {
        CompareOp::Eq => Ok(left == right),
        CompareOp::NotEq => Ok(left != right),
        CompareOp::In | CompareOp::NotIn => {
            let haystack = match right {
                Value::Str(s) => s,
                other => return Err(TemplateError::NotAContainer(other.kind())),
            };
            let needle = match left {
                Value::Str(s) => s,
                other => {
                    return Err(TemplateError::TypeMismatch {
                        left: other.kind(),
                        op: op.to_string(),
                        right: right.kind(),
                    })
                }
            };
            let found = haystack.contains(needle.as_str());
            Ok(if op == CompareOp::In { found } else { !found })
        }
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            let ordering = order(left, op, right)?;
            Ok(match op {
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Gte => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

fn order(left: &Value, op: CompareOp, right: &Value) -> Result<Ordering, TemplateError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(TemplateError::TypeMismatch {
            left: left.kind(),
            op: op.to_string(),
            right: right.kind(),
        }),
    }
}

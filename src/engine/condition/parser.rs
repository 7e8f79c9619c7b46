//! Trigger expression parser
//!
//! Parses expressions like:
//! - `instance == 'drink'`
//! - `message | regex_search('\bduh\b', ignorecase=True)`
//! - `{{ sender != 'zdaemon' and message | regex_match('^!ping') }}`

use super::ast::{CompareOp, Expression, Filter, Pattern};
use crate::engine::context::{Value, Variable};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Parse a test expression, either bare or wrapped in a single `{{ ... }}`
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    let input = input.trim();
    let inner = match input
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        Some(inner) => inner,
        None => input,
    };
    parse_expression(inner)
}

/// Parse the body of one interpolation (no surrounding braces)
pub fn parse_expression(input: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::new(format!("unexpected {}", tok.describe()))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Ident(String),
    Op(CompareOp),
    LParen,
    RParen,
    Pipe,
    Comma,
    Assign,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Str(s) => format!("string '{}'", s),
            Token::Ident(s) => format!("`{}`", s),
            Token::Op(op) => format!("`{}`", op),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::Pipe => "`|`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Assign => "`=`".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Op(CompareOp::Eq), 2),
                    ('!', Some('=')) => (Token::Op(CompareOp::NotEq), 2),
                    ('<', Some('=')) => (Token::Op(CompareOp::Lte), 2),
                    ('>', Some('=')) => (Token::Op(CompareOp::Gte), 2),
                    ('<', _) => (Token::Op(CompareOp::Lt), 1),
                    ('>', _) => (Token::Op(CompareOp::Gt), 1),
                    ('=', _) => (Token::Assign, 1),
                    _ => return Err(ParseError::new("unexpected `!`")),
                };
                tokens.push(token);
                i += width;
            }
            '\'' | '"' => {
                let (s, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() => {
                return Err(ParseError::new("numeric literals are not supported"));
            }
            other => return Err(ParseError::new(format!("unexpected character `{}`", other))),
        }
    }

    Ok(tokens)
}

/// Reads a quoted literal starting at `start`. Escapes other than quotes,
/// backslash, `\n` and `\t` are kept verbatim so regex classes survive.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                match chars.get(i + 1) {
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => {
                        out.push('\\');
                        out.push(*other);
                    }
                    None => break,
                }
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(ParseError::new("unterminated string literal"))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

enum Arg {
    Positional(Expression),
    Keyword(String, Expression),
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == word)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(ParseError::new(format!(
                "expected {}, found {}",
                expected.describe(),
                tok.describe()
            ))),
            None => Err(ParseError::new(format!(
                "expected {}, found end of expression",
                expected.describe()
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_not()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if self.at_keyword("not") {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_filtered()?;

        let op = match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                op
            }
            Some(Token::Ident(s)) if s == "in" => {
                self.pos += 1;
                CompareOp::In
            }
            Some(Token::Ident(s))
                if s == "not" && matches!(self.peek_at(1), Some(Token::Ident(n)) if n == "in") =>
            {
                self.pos += 2;
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };

        let right = self.parse_filtered()?;
        Ok(Expression::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_filtered(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.pos += 1;
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(tok) => {
                    return Err(ParseError::new(format!(
                        "expected filter name, found {}",
                        tok.describe()
                    )))
                }
                None => return Err(ParseError::new("expected filter name after `|`")),
            };
            let args = if matches!(self.peek(), Some(Token::LParen)) {
                self.parse_args()?
            } else {
                Vec::new()
            };
            expr = Expression::Filter {
                input: Box::new(expr),
                filter: build_filter(&name, args)?,
            };
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            let arg = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(name)), Some(Token::Assign)) => {
                    let name = name.clone();
                    self.pos += 2;
                    Arg::Keyword(name, self.parse_or()?)
                }
                _ => Arg::Positional(self.parse_or()?),
            };
            args.push(arg);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(tok) => {
                    return Err(ParseError::new(format!(
                        "expected `,` or `)`, found {}",
                        tok.describe()
                    )))
                }
                None => return Err(ParseError::new("unclosed filter arguments")),
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expression::Literal(Value::Str(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "True" | "true" => Ok(Expression::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expression::Literal(Value::Bool(false))),
                "None" | "none" => Ok(Expression::Literal(Value::None)),
                _ => Variable::from_name(&name)
                    .map(Expression::Var)
                    .ok_or_else(|| ParseError::new(format!("unknown variable `{}`", name))),
            },
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ParseError::new(format!("unexpected {}", tok.describe()))),
            None => Err(ParseError::new("unexpected end of expression")),
        }
    }
}

fn build_filter(name: &str, args: Vec<Arg>) -> Result<Filter, ParseError> {
    match name {
        "regex_match" | "regex_search" => {
            let (find, ignore_case) = regex_args(name, args)?;
            let pattern = Pattern::new(&find, ignore_case)
                .map_err(|e| ParseError::new(format!("invalid regex '{}': {}", find, e)))?;
            Ok(if name == "regex_match" {
                Filter::RegexMatch(pattern)
            } else {
                Filter::RegexSearch(pattern)
            })
        }
        "lower" | "upper" | "trim" => {
            if !args.is_empty() {
                return Err(ParseError::new(format!("filter `{}` takes no arguments", name)));
            }
            Ok(match name {
                "lower" => Filter::Lower,
                "upper" => Filter::Upper,
                _ => Filter::Trim,
            })
        }
        other => Err(ParseError::new(format!("unknown filter `{}`", other))),
    }
}

/// Resolves `(find="", ignorecase=False)` in positional or keyword form
fn regex_args(name: &str, args: Vec<Arg>) -> Result<(String, bool), ParseError> {
    let mut find: Option<Expression> = None;
    let mut ignorecase: Option<Expression> = None;
    let mut positional = 0;

    for arg in args {
        let (slot, expr) = match arg {
            Arg::Positional(expr) => {
                positional += 1;
                match positional {
                    1 => (&mut find, expr),
                    2 => (&mut ignorecase, expr),
                    _ => {
                        return Err(ParseError::new(format!(
                            "`{}` takes at most 2 arguments",
                            name
                        )))
                    }
                }
            }
            Arg::Keyword(key, expr) => match key.as_str() {
                "find" => (&mut find, expr),
                "ignorecase" => (&mut ignorecase, expr),
                other => {
                    return Err(ParseError::new(format!(
                        "unknown argument `{}` for `{}`",
                        other, name
                    )))
                }
            },
        };
        if slot.is_some() {
            return Err(ParseError::new(format!("duplicate argument for `{}`", name)));
        }
        *slot = Some(expr);
    }

    let find = match find {
        None => String::new(),
        Some(Expression::Literal(Value::Str(s))) => s,
        Some(_) => {
            return Err(ParseError::new(format!(
                "`{}` pattern must be a string literal",
                name
            )))
        }
    };
    let ignore_case = match ignorecase {
        None => false,
        Some(Expression::Literal(Value::Bool(b))) => b,
        Some(_) => {
            return Err(ParseError::new(format!(
                "`{}` ignorecase must be True or False",
                name
            )))
        }
    };

    Ok((find, ignore_case))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(v: Variable) -> Box<Expression> {
        Box::new(Expression::Var(v))
    }

    fn lit(s: &str) -> Box<Expression> {
        Box::new(Expression::Literal(Value::Str(s.to_string())))
    }

    #[test]
    fn test_parse_simple_equality() {
        let expr = parse("instance == 'drink'").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                left: var(Variable::Instance),
                op: CompareOp::Eq,
                right: lit("drink"),
            }
        );
    }

    #[test]
    fn test_parse_braced_expression() {
        assert_eq!(
            parse("{{ sender != 'zdaemon' }}").unwrap(),
            parse("sender != 'zdaemon'").unwrap()
        );
    }

    #[test]
    fn test_parse_regex_filter_keyword_args() {
        let expr = parse("message | regex_search('duh', ignorecase=True)").unwrap();
        assert_eq!(
            expr,
            Expression::Filter {
                input: var(Variable::Message),
                filter: Filter::RegexSearch(Pattern::new("duh", true).unwrap()),
            }
        );
    }

    #[test]
    fn test_parse_regex_filter_positional_args() {
        let expr = parse("message | regex_match('^!ping', False)").unwrap();
        assert_eq!(
            expr,
            Expression::Filter {
                input: var(Variable::Message),
                filter: Filter::RegexMatch(Pattern::new("^!ping", false).unwrap()),
            }
        );
    }

    #[test]
    fn test_parse_regex_escapes_survive() {
        let expr = parse(r"message | regex_search('\bdrink\b')").unwrap();
        match expr {
            Expression::Filter {
                filter: Filter::RegexSearch(p),
                ..
            } => assert_eq!(p.source(), r"\bdrink\b"),
            other => panic!("Expected regex filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let expr = parse("instance == 'a' or instance == 'b' and sender == 'c'").unwrap();
        match expr {
            Expression::Or(_, right) => assert!(matches!(*right, Expression::And(_, _))),
            other => panic!("Expected Or expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parentheses() {
        let expr = parse("(instance == 'a' or instance == 'b') and sender == 'c'").unwrap();
        match expr {
            Expression::And(left, _) => assert!(matches!(*left, Expression::Or(_, _))),
            other => panic!("Expected And expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_and_not_in() {
        assert!(matches!(
            parse("not instance == 'x'").unwrap(),
            Expression::Not(_)
        ));
        assert!(matches!(
            parse("'beer' not in message").unwrap(),
            Expression::Compare {
                op: CompareOp::NotIn,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_chained_filters() {
        let expr = parse("message | lower | trim == 'hi'").unwrap();
        match expr {
            Expression::Compare { left, .. } => match *left {
                Expression::Filter {
                    filter: Filter::Trim,
                    input,
                } => assert!(matches!(
                    *input,
                    Expression::Filter {
                        filter: Filter::Lower,
                        ..
                    }
                )),
                other => panic!("Expected trim filter, got {:?}", other),
            },
            other => panic!("Expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            parse("True").unwrap(),
            Expression::Literal(Value::Bool(true))
        );
        assert_eq!(
            parse("false").unwrap(),
            Expression::Literal(Value::Bool(false))
        );
        assert_eq!(parse(r#""x""#).unwrap(), *lit("x"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("zclass == 'abtech'").is_err());
        assert!(parse("message | shout").is_err());
        assert!(parse("message | regex_search('(unclosed')").is_err());
        assert!(parse("message | regex_search(sender)").is_err());
        assert!(parse("message | regex_search('a', ignorecase='yes')").is_err());
        assert!(parse("message == 'unterminated").is_err());
        assert!(parse("instance == 'a' instance").is_err());
        assert!(parse("count > 3").is_err());
        assert!(parse("{{ a }} and {{ b }}").is_err());
    }
}

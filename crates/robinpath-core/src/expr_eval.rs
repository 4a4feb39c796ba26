//! Evaluator for the small expression language used in `if`/`elseif`
//! condition text and a `for`'s iterable expression. These are stored as
//! raw source slices by the parser and only tokenized/evaluated here, at
//! run time, against the current frame.
//!
//! Precedence, loosest to tightest: `or` < `and` < comparisons
//! (`==`/`!=`/`</<=`/`>`/`>=`) < `in`/`contains` < `not` < atom/`(...)`.

use crate::ast::PathSeg;
use crate::error::{ControlFlow, RuntimeErrorKind};
use crate::lexer::Lexer;
use crate::pos::Point;
use crate::token::{Token, TokenKind, TokenValue};
use crate::value::Value;

pub type ExprFlow<T> = Result<T, ControlFlow>;

/// Resolves a `$name[.path]*` reference (or the bare `$` last-value form)
/// to a value. Implemented by the executor's frame stack; kept as a
/// callback here so this module has no dependency on frame/environment
/// internals.
pub trait VarResolver {
    fn resolve(&mut self, name: &str, path: Option<&[PathSeg]>) -> ExprFlow<Value>;
    fn last_value(&self) -> Value;
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    point: Point,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn is_word(&self, word: &str) -> bool {
        let t = self.peek();
        t.kind == TokenKind::Identifier && t.text == word
    }

    fn err(&self, msg: impl Into<String>) -> ControlFlow {
        ControlFlow::Error(crate::error::RuntimeError::new(
            self.point,
            RuntimeErrorKind::Other(msg.into()),
            "",
        ))
    }
}

/// Evaluate `expr` against `ctx`, returning the resulting value. Callers
/// decide how to interpret it: `if`/`elseif` apply [`Value::is_truthy`];
/// `for` expects an `Array`/`Object`/`String` back.
pub fn evaluate(expr: &str, point: Point, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let tokens = Lexer::tokenize(expr).map_err(|e| {
        ControlFlow::Error(crate::error::RuntimeError::new(
            point,
            RuntimeErrorKind::Other(format!("invalid expression: {e}")),
            expr,
        ))
    })?;
    let content: Vec<Token> =
        tokens.into_iter().filter(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Eof | TokenKind::Comment)).collect();
    if content.is_empty() {
        return Ok(Value::Null);
    }
    let mut cur = Cursor { tokens: &content, pos: 0, point };
    let value = parse_or(&mut cur, ctx)?;
    if cur.pos < cur.tokens.len() {
        return Err(cur.err(format!("unexpected trailing token '{}'", cur.peek().text)));
    }
    Ok(value)
}

fn parse_or(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let mut left = parse_and(cur, ctx)?;
    while cur.is_word("or") {
        cur.advance();
        if left.is_truthy() {
            // Short-circuit: still must skip the right-hand tokens.
            skip_and(cur)?;
            continue;
        }
        left = parse_and(cur, ctx)?;
    }
    Ok(left)
}

fn parse_and(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let mut left = parse_comparison(cur, ctx)?;
    while cur.is_word("and") {
        cur.advance();
        if !left.is_truthy() {
            skip_comparison(cur)?;
            continue;
        }
        left = parse_comparison(cur, ctx)?;
    }
    Ok(left)
}

fn parse_comparison(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let left = parse_containment(cur, ctx)?;
    let op = match cur.peek().text.as_str() {
        "==" | "!=" | "<" | "<=" | ">" | ">=" if cur.peek().kind == TokenKind::Identifier => {
            Some(cur.advance().text)
        }
        _ => None,
    };
    let Some(op) = op else { return Ok(left) };
    let right = parse_containment(cur, ctx)?;
    let result = match op.as_str() {
        "==" => left.deep_eq(&right),
        "!=" => !left.deep_eq(&right),
        _ => {
            let ord = left
                .partial_cmp_scripted(&right)
                .ok_or_else(|| cur.err(format!("cannot compare {} and {}", left.type_tag(), right.type_tag())))?;
            match op.as_str() {
                "<" => ord.is_lt(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                ">=" => ord.is_ge(),
                _ => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn parse_containment(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let left = parse_unary(cur, ctx)?;
    if cur.is_word("contains") {
        cur.advance();
        let right = parse_unary(cur, ctx)?;
        return Ok(Value::Bool(value_contains(&left, &right)));
    }
    if cur.is_word("in") {
        cur.advance();
        let right = parse_unary(cur, ctx)?;
        return Ok(Value::Bool(value_contains(&right, &left)));
    }
    Ok(left)
}

fn value_contains(container: &Value, needle: &Value) -> bool {
    match container {
        Value::Array(a) => a.borrow().iter().any(|v| v.deep_eq(needle)),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Object(o) => needle.as_str().map(|k| o.borrow().contains_key(k)).unwrap_or(false),
        _ => false,
    }
}

fn parse_unary(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    if cur.is_word("not") {
        cur.advance();
        let v = parse_unary(cur, ctx)?;
        return Ok(Value::Bool(!v.is_truthy()));
    }
    parse_atom(cur, ctx)
}

fn parse_atom(cur: &mut Cursor, ctx: &mut dyn VarResolver) -> ExprFlow<Value> {
    let tok = cur.advance();
    match tok.kind {
        TokenKind::LParen => {
            let inner = parse_or(cur, ctx)?;
            if cur.peek().kind != TokenKind::RParen {
                return Err(cur.err("expected ')'"));
            }
            cur.advance();
            Ok(inner)
        }
        TokenKind::Number => match tok.value {
            TokenValue::Number(n) => Ok(Value::Number(n)),
            _ => Ok(Value::Number(0.0)),
        },
        TokenKind::String => match tok.value {
            TokenValue::Str(s) => Ok(Value::string(s)),
            _ => Ok(Value::string("")),
        },
        TokenKind::Boolean => match tok.value {
            TokenValue::Bool(b) => Ok(Value::Bool(b)),
            _ => Ok(Value::Bool(false)),
        },
        TokenKind::Null => Ok(Value::Null),
        TokenKind::Variable if tok.text == "$" => Ok(ctx.last_value()),
        TokenKind::Variable => {
            let (name, path) = crate::parser::args::parse_var_text(&tok.text);
            ctx.resolve(&name, path.as_deref())
        }
        _ => Err(cur.err(format!("unexpected token '{}' in expression", tok.text))),
    }
}

/// Consume (without evaluating) the right-hand `and`-chain so a
/// short-circuited `or` still lands the cursor past it.
fn skip_and(cur: &mut Cursor) -> ExprFlow<()> {
    skip_comparison(cur)?;
    while cur.is_word("and") {
        cur.advance();
        skip_comparison(cur)?;
    }
    Ok(())
}

fn skip_comparison(cur: &mut Cursor) -> ExprFlow<()> {
    skip_containment(cur)?;
    if matches!(cur.peek().text.as_str(), "==" | "!=" | "<" | "<=" | ">" | ">=")
        && cur.peek().kind == TokenKind::Identifier
    {
        cur.advance();
        skip_containment(cur)?;
    }
    Ok(())
}

fn skip_containment(cur: &mut Cursor) -> ExprFlow<()> {
    skip_unary(cur)?;
    if cur.is_word("contains") || cur.is_word("in") {
        cur.advance();
        skip_unary(cur)?;
    }
    Ok(())
}

fn skip_unary(cur: &mut Cursor) -> ExprFlow<()> {
    if cur.is_word("not") {
        cur.advance();
        return skip_unary(cur);
    }
    skip_atom(cur)
}

fn skip_atom(cur: &mut Cursor) -> ExprFlow<()> {
    let tok = cur.advance();
    if tok.kind == TokenKind::LParen {
        let mut depth = 1i32;
        while depth > 0 && cur.pos < cur.tokens.len() {
            match cur.advance().kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestCtx(HashMap<String, Value>);
    impl VarResolver for TestCtx {
        fn resolve(&mut self, name: &str, _path: Option<&[PathSeg]>) -> ExprFlow<Value> {
            Ok(self.0.get(name).cloned().unwrap_or(Value::Null))
        }
        fn last_value(&self) -> Value {
            Value::Null
        }
    }

    fn ctx() -> TestCtx {
        let mut m = HashMap::new();
        m.insert("x".to_string(), Value::Number(5.0));
        m.insert("name".to_string(), Value::string("robin"));
        TestCtx(m)
    }

    #[test]
    fn evaluates_numeric_comparison() {
        let v = evaluate("$x > 3", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(v.is_truthy());
    }

    #[test]
    fn evaluates_and_or_short_circuit() {
        let v = evaluate("$x > 10 and $x < 0", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(!v.is_truthy());
        let v2 = evaluate("$x > 10 or $x > 0", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(v2.is_truthy());
    }

    #[test]
    fn evaluates_not_and_contains() {
        let v = evaluate("not $x == 5", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(!v.is_truthy());
        let v2 = evaluate("\"rob\" in $name", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(v2.is_truthy());
    }

    #[test]
    fn evaluates_grouping() {
        let v = evaluate("($x > 1) and ($x < 10)", Point::new(0, 0), &mut ctx()).unwrap();
        assert!(v.is_truthy());
    }
}

//! Space-form command argument parsing.

use crate::ast::{Arg, PathSeg};
use crate::error::{ParseError, ParseErrorKind};
use crate::token::{Token, TokenKind, TokenValue};
use indexmap::IndexMap;

/// Split a `$name`, `$name.prop`, `$name[2]`, `$.prop`, `$1` token's text
/// into its base name and path segments.
pub fn parse_var_text(text: &str) -> (String, Option<Vec<PathSeg>>) {
    debug_assert!(text.starts_with('$'));
    let rest = &text[1..];
    let mut chars = rest.char_indices().peekable();
    let name_end = loop {
        match chars.peek() {
            Some(&(i, c)) if c != '.' && c != '[' => {
                chars.next();
                let _ = i;
            }
            Some(&(i, _)) => break i,
            None => break rest.len(),
        }
    };
    let name = rest[..name_end].to_string();
    let tail = &rest[name_end..];
    if tail.is_empty() {
        return (name, None);
    }
    let mut segs = Vec::new();
    let bytes = tail.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && (bytes[j] as char).is_alphanumeric() || (j < bytes.len() && bytes[j] == b'_') {
                    j += 1;
                }
                segs.push(PathSeg::Property { name: tail[start..j].to_string() });
                i = j;
            }
            b'[' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                let idx: u64 = tail[start..j].parse().unwrap_or(0);
                segs.push(PathSeg::Index { index: idx });
                i = if j < bytes.len() && bytes[j] == b']' { j + 1 } else { j };
            }
            _ => break,
        }
    }
    (name, if segs.is_empty() { None } else { Some(segs) })
}

fn is_adjacent(a: &Token, b: &Token) -> bool {
    a.end_offset == b.start_offset
}

/// Find the token index of the bracket matching the opener at `open_idx`.
fn find_matching(tokens: &[Token], open_idx: usize, open: TokenKind, close: TokenKind) -> Option<usize> {
    let mut depth = 0i32;
    for (k, t) in tokens.iter().enumerate().skip(open_idx) {
        if t.kind == open {
            depth += 1;
        } else if t.kind == close {
            depth -= 1;
            if depth == 0 {
                return Some(k);
            }
        }
    }
    None
}

/// Parse a single argument value starting at `tokens[i]`. Returns the arg
/// and the index just past it.
pub fn parse_one<'t>(tokens: &'t [Token], i: usize, source: &str) -> Result<(Arg, usize), ParseError> {
    let tok = &tokens[i];
    match tok.kind {
        TokenKind::Variable if tok.text == "$" => Ok((Arg::LastValue, i + 1)),
        TokenKind::Variable => {
            let (name, path) = parse_var_text(&tok.text);
            Ok((Arg::Var { name, path }, i + 1))
        }
        TokenKind::String => {
            let text = match &tok.value {
                TokenValue::Str(s) => s.clone(),
                _ => String::new(),
            };
            Ok((Arg::String(text), i + 1))
        }
        TokenKind::Number => {
            let n = match tok.value {
                TokenValue::Number(n) => n,
                _ => 0.0,
            };
            Ok((Arg::Number(n), i + 1))
        }
        TokenKind::Boolean | TokenKind::Null | TokenKind::Keyword | TokenKind::Identifier => {
            // Fold an unspaced `-` immediately before a number into a
            // negative numeric literal.
            if tok.kind == TokenKind::Identifier && tok.text == "-" {
                if let Some(next) = tokens.get(i + 1) {
                    if next.kind == TokenKind::Number && is_adjacent(tok, next) {
                        let n = match next.value {
                            TokenValue::Number(n) => n,
                            _ => 0.0,
                        };
                        return Ok((Arg::Number(-n), i + 2));
                    }
                }
            }
            // Fold a dotted bareword (`module.fn`) written with no spaces
            // into a single literal.
            let mut end = i + 1;
            let mut text = tok.text.clone();
            while end + 1 < tokens.len()
                && tokens[end].kind == TokenKind::Dot
                && is_adjacent(&tokens[end - 1], &tokens[end])
                && tokens.get(end + 1).map(|t| t.kind == TokenKind::Identifier).unwrap_or(false)
                && is_adjacent(&tokens[end], &tokens[end + 1])
            {
                text.push('.');
                text.push_str(&tokens[end + 1].text);
                end += 2;
            }
            Ok((Arg::Literal(text), end))
        }
        TokenKind::LParen => {
            // `$(` subexpression is only valid after a `$` variable token
            // with empty name; callers route that case separately. A bare
            // `(` in argument position is a parenthesized grouping handed
            // to the condition evaluator elsewhere, not a plain Arg.
            Err(parse_err_src(tok, ParseErrorKind::UnexpectedToken(tok.text.clone()), source))
        }
        TokenKind::LBrace => {
            let close = find_matching(tokens, i, TokenKind::LBrace, TokenKind::RBrace)
                .ok_or_else(|| parse_err_src(tok, ParseErrorKind::UnterminatedBracket('{'), source))?;
            let code = source[tok.end_offset as usize..tokens[close].start_offset as usize].to_string();
            Ok((Arg::Object { code }, close + 1))
        }
        TokenKind::LBracket => {
            let close = find_matching(tokens, i, TokenKind::LBracket, TokenKind::RBracket)
                .ok_or_else(|| parse_err_src(tok, ParseErrorKind::UnterminatedBracket('['), source))?;
            let code = source[tok.end_offset as usize..tokens[close].start_offset as usize].to_string();
            Ok((Arg::Array { code }, close + 1))
        }
        _ => Err(parse_err_src(tok, ParseErrorKind::UnexpectedToken(tok.text.clone()), source)),
    }
}

/// Parse a `$( ... )` subexpression starting at the `$` token.
fn parse_subexpr(tokens: &[Token], i: usize, source: &str) -> Result<(Arg, usize), ParseError> {
    let dollar = &tokens[i];
    let open = i + 1;
    if tokens.get(open).map(|t| t.kind) != Some(TokenKind::LParen) {
        return Err(parse_err_src(dollar, ParseErrorKind::UnexpectedToken(dollar.text.clone()), source));
    }
    let close = find_matching(tokens, open, TokenKind::LParen, TokenKind::RParen)
        .ok_or_else(|| parse_err_src(dollar, ParseErrorKind::UnterminatedBracket('('), source))?;
    let code = source[tokens[open].end_offset as usize..tokens[close].start_offset as usize].to_string();
    Ok((Arg::Subexpr { code }, close + 1))
}

fn parse_err_src(tok: &Token, kind: ParseErrorKind, source: &str) -> ParseError {
    let line_text = source.lines().nth((tok.line.saturating_sub(1)) as usize).unwrap_or_default().to_string();
    ParseError { line: tok.line, col: tok.column, kind, line_text }
}

/// Parse a full space-separated argument list. `tokens` is the
/// remainder of the statement's content tokens after the command name.
pub fn parse_args(tokens: &[Token], source: &str) -> Result<Vec<Arg>, ParseError> {
    let mut positional = Vec::new();
    let mut named: IndexMap<String, Arg> = IndexMap::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        // `$(` subexpression.
        if tok.kind == TokenKind::Variable && tok.text == "$" && tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::LParen) {
            let (arg, next) = parse_subexpr(tokens, i, source)?;
            positional.push(arg);
            i = next;
            continue;
        }
        // `key=value` / `$key=value` named argument.
        let key = match tok.kind {
            TokenKind::Identifier => Some(tok.text.clone()),
            TokenKind::Variable => {
                let (name, path) = parse_var_text(&tok.text);
                if path.is_none() {
                    Some(name)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(key) = key {
            if tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::Assign) {
                let value_idx = i + 2;
                if value_idx >= tokens.len() {
                    return Err(parse_err_src(tok, ParseErrorKind::UnexpectedToken("=".into()), source));
                }
                let (arg, next) = if tokens[value_idx].kind == TokenKind::Variable
                    && tokens[value_idx].text == "$"
                    && tokens.get(value_idx + 1).map(|t| t.kind) == Some(TokenKind::LParen)
                {
                    parse_subexpr(tokens, value_idx, source)?
                } else {
                    parse_one(tokens, value_idx, source)?
                };
                named.insert(key, arg);
                i = next;
                continue;
            }
        }
        let (arg, next) = parse_one(tokens, i, source)?;
        positional.push(arg);
        i = next;
    }
    if !named.is_empty() {
        positional.push(Arg::NamedArgs { args: named });
    }
    Ok(positional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn args_of(src: &str, skip: usize) -> Vec<Arg> {
        let toks = Lexer::tokenize(src).unwrap();
        let content: Vec<Token> = toks.into_iter().filter(|t| t.kind != TokenKind::Newline && t.kind != TokenKind::Eof).collect();
        parse_args(&content[skip..], src).unwrap()
    }

    #[test]
    fn parses_var_path() {
        let (name, path) = parse_var_text("$name.prop[2]");
        assert_eq!(name, "name");
        assert_eq!(
            path.unwrap(),
            vec![PathSeg::Property { name: "prop".into() }, PathSeg::Index { index: 2 }]
        );
    }

    #[test]
    fn parses_mixed_args() {
        let args = args_of("log 1 \"two\" $three key=4\n", 1);
        assert_eq!(args.len(), 4);
        assert!(matches!(args[0], Arg::Number(n) if n == 1.0));
        assert!(matches!(&args[1], Arg::String(s) if s == "two"));
        assert!(matches!(&args[2], Arg::Var{name,..} if name == "three"));
        match &args[3] {
            Arg::NamedArgs { args } => assert!(matches!(args.get("key"), Some(Arg::Number(n)) if *n == 4.0)),
            _ => panic!("expected named args"),
        }
    }

    #[test]
    fn parses_negative_number_adjacent() {
        let args = args_of("log -5\n", 1);
        assert!(matches!(args[0], Arg::Number(n) if n == -5.0));
    }

    #[test]
    fn parses_subexpr_arg() {
        let args = args_of("log $(math.add 1 2)\n", 1);
        match &args[0] {
            Arg::Subexpr { code } => assert_eq!(code, "math.add 1 2"),
            _ => panic!("expected subexpr"),
        }
    }

    #[test]
    fn parses_object_literal_arg() {
        let args = args_of("log {a: 1}\n", 1);
        match &args[0] {
            Arg::Object { code } => assert_eq!(code, "a: 1"),
            _ => panic!("expected object"),
        }
    }
}

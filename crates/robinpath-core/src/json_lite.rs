//! Permissive JSON-ish literal parsing for `{…}` / `[…]` argument forms.
//!
//! This is not a general-purpose parser: it accepts the handful of
//! deviations from strict JSON that the grammar promises (unquoted object
//! keys, trailing commas, single-quoted/backtick-quoted strings) and then
//! delegates the rest to `serde_json` by rewriting into strict JSON text.

use crate::value::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("invalid literal at offset {offset}: {message}")]
pub struct JsonLiteError {
    pub offset: usize,
    pub message: String,
}

fn err(offset: usize, message: impl Into<String>) -> JsonLiteError {
    JsonLiteError {
        offset,
        message: message.into(),
    }
}

/// Parse `code` (the inner text of an `Object` arg, i.e. what was between
/// the outer `{` `}`) as a permissive object literal.
pub fn parse_object(code: &str) -> Result<Value, JsonLiteError> {
    let rewritten = rewrite(&format!("{{{code}}}"))?;
    let json: serde_json::Value = serde_json::from_str(&rewritten)
        .map_err(|e| err(0, format!("invalid object literal: {e}")))?;
    Ok(json_to_value(&json))
}

/// Parse `code` (inner text of an `Array` arg) as a permissive array
/// literal.
pub fn parse_array(code: &str) -> Result<Value, JsonLiteError> {
    let rewritten = rewrite(&format!("[{code}]"))?;
    let json: serde_json::Value = serde_json::from_str(&rewritten)
        .map_err(|e| err(0, format!("invalid array literal: {e}")))?;
    Ok(json_to_value(&json))
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, val) in map {
                out.insert(k.clone(), json_to_value(val));
            }
            Value::object(out)
        }
    }
}

/// Rewrite permissive syntax into strict JSON: quote bare identifier keys,
/// normalize `'`/`` ` `` strings to `"`, and drop trailing commas before a
/// closing bracket.
fn rewrite(src: &str) -> Result<String, JsonLiteError> {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len() + 8);
    let mut i = 0;
    let mut expecting_key = false;
    let mut brace_depth: Vec<u8> = Vec::new(); // b'{' or b'['

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '{' => {
                out.push('{');
                brace_depth.push(b'{');
                expecting_key = true;
                i += 1;
            }
            '[' => {
                out.push('[');
                brace_depth.push(b'[');
                expecting_key = false;
                i += 1;
            }
            '}' | ']' => {
                brace_depth.pop();
                // drop a trailing comma immediately before the close
                while out.ends_with(|ch: char| ch.is_whitespace()) {
                    out.pop();
                }
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(c);
                i += 1;
                expecting_key = false;
            }
            '\'' | '`' => {
                let (s, next) = read_quoted(bytes, i, c)?;
                out.push('"');
                out.push_str(&json_escape(&s));
                out.push('"');
                i = next;
                if expecting_key {
                    expecting_key = false;
                }
            }
            '"' => {
                let (s, next) = read_quoted(bytes, i, '"')?;
                out.push('"');
                out.push_str(&json_escape(&s));
                out.push('"');
                i = next;
                if expecting_key {
                    expecting_key = false;
                }
            }
            ':' => {
                out.push(':');
                i += 1;
                expecting_key = false;
            }
            ',' => {
                out.push(',');
                i += 1;
                expecting_key = matches!(brace_depth.last(), Some(b'{'));
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c if expecting_key && (c.is_alphabetic() || c == '_') => {
                let start = i;
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_alphanumeric() || ch == '_' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                out.push('"');
                out.push_str(&src[start..i]);
                out.push('"');
                expecting_key = false;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn read_quoted(bytes: &[u8], start: usize, quote: char) -> Result<(String, usize), JsonLiteError> {
    let mut i = start + 1;
    let mut s = String::new();
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == quote {
            return Ok((s, i + 1));
        }
        if c == '\\' && i + 1 < bytes.len() {
            let next = bytes[i + 1] as char;
            s.push(match next {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                '`' => '`',
                other => other,
            });
            i += 2;
            continue;
        }
        s.push(c);
        i += 1;
    }
    Err(err(start, "unterminated string in literal"))
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquoted_keys_and_trailing_comma() {
        let v = parse_object("a: 1, b: 'two',").unwrap();
        if let Value::Object(o) = v {
            let o = o.borrow();
            assert_eq!(o.get("a").unwrap().as_number(), Some(1.0));
            assert_eq!(o.get("b").unwrap().as_str(), Some("two"));
        } else {
            panic!("expected object");
        }
    }

    #[test]
    fn nested_array_literal() {
        let v = parse_array("1, 2, [3, 4],").unwrap();
        if let Value::Array(a) = v {
            assert_eq!(a.borrow().len(), 3);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn backtick_strings() {
        let v = parse_object("name: `hi`").unwrap();
        if let Value::Object(o) = v {
            assert_eq!(o.borrow().get("name").unwrap().as_str(), Some("hi"));
        } else {
            panic!("expected object");
        }
    }
}

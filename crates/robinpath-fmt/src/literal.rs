//! Canonical rendering of assignment literals, including the declared-type
//! coercion matrix a writer applies when a literal's stored value and its
//! declared type diverge (a consumer edited one but not the other).

use robinpath_core::ast::LiteralArg;
use robinpath_core::json_lite;
use robinpath_core::value::{LiteralValueType, Value};

use crate::error::FmtError;

/// The literal's own type, independent of what it's declared as. For
/// `Raw` (object/array source text) this is recovered by sniffing
/// whether the text parses as an object or falls back to an array, since
/// the AST doesn't separately record which bracket kind produced it.
fn current_type_and_value(lit: &LiteralArg) -> Result<(LiteralValueType, Value), FmtError> {
    Ok(match lit {
        LiteralArg::Null => (LiteralValueType::Null, Value::Null),
        LiteralArg::Bool(b) => (LiteralValueType::Bool, Value::Bool(*b)),
        LiteralArg::Number(n) => (LiteralValueType::Number, Value::Number(*n)),
        LiteralArg::String(s) => (LiteralValueType::String, Value::string(s.as_str())),
        LiteralArg::Raw(text) => match json_lite::parse_object(text) {
            Ok(v) => (LiteralValueType::Object, v),
            Err(_) => (LiteralValueType::Array, json_lite::parse_array(text)?),
        },
    })
}

/// Render `lit` as it should appear under `declared`, per the coercion
/// rules: if the literal's own type already matches, render it verbatim
/// in its native form (raw object/array text passes through unparsed);
/// otherwise coerce and render the coerced value. When coercion can't
/// represent the target type, the original value and its original type
/// are kept rather than collapsing to `null`.
pub fn render_literal(lit: &LiteralArg, declared: LiteralValueType) -> Result<String, FmtError> {
    if let LiteralArg::Raw(text) = lit {
        let (current, _) = current_type_and_value(lit)?;
        if current == declared {
            return Ok(render_native_bracket(current, text));
        }
    }
    let (current, value) = current_type_and_value(lit)?;
    if current == declared {
        return Ok(render_value(&value));
    }
    let coerced = declared.coerce(&value);
    Ok(render_value(&coerced))
}

fn render_native_bracket(kind: LiteralValueType, inner: &str) -> String {
    match kind {
        LiteralValueType::Object => format!("{{{inner}}}"),
        LiteralValueType::Array => format!("[{inner}]"),
        _ => inner.to_string(),
    }
}

/// Strict-JSON-ish rendering of a coerced value: double-quoted strings,
/// quoted object keys. Used whenever a literal's rendered form isn't just
/// its original source text passed through.
fn render_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => json_quote(s),
        Value::Array(items) => {
            let items = items.borrow();
            let body = items.iter().map(render_value).collect::<Vec<_>>().join(", ");
            format!("[{body}]")
        }
        Value::Object(map) => {
            let map = map.borrow();
            let body = map
                .iter()
                .map(|(k, v)| format!("{}: {}", json_quote(k), render_value(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{body}}}")
        }
    }
}

fn json_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
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
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_type_renders_natively() {
        let lit = LiteralArg::String("hi".into());
        assert_eq!(render_literal(&lit, LiteralValueType::String).unwrap(), "\"hi\"");
    }

    #[test]
    fn mismatched_number_coerces_from_string() {
        let lit = LiteralArg::String("42".into());
        assert_eq!(render_literal(&lit, LiteralValueType::Number).unwrap(), "42");
    }

    #[test]
    fn unrepresentable_coercion_keeps_original() {
        let lit = LiteralArg::Raw("a: 1".into());
        // Object -> Number has no sensible coercion; the original object
        // is kept, rendered in its own (object) form.
        let rendered = render_literal(&lit, LiteralValueType::Number).unwrap();
        assert_eq!(rendered, "{\"a\": 1}");
    }

    #[test]
    fn raw_array_passes_through_verbatim_when_type_matches() {
        let lit = LiteralArg::Raw("1, 2, 3".into());
        assert_eq!(render_literal(&lit, LiteralValueType::Array).unwrap(), "[1, 2, 3]");
    }
}

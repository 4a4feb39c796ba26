//! Argument and target rendering: the pieces shared by command calls,
//! decorators, and `into` targets.

use robinpath_core::ast::{Arg, PathSeg, Target};
use std::fmt::Write as _;

/// `$name.prop[2]`-style suffix rendering for an attribute path.
pub fn path_suffix(path: &[PathSeg]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            PathSeg::Property { name } => {
                let _ = write!(out, ".{name}");
            }
            PathSeg::Index { index } => {
                let _ = write!(out, "[{index}]");
            }
        }
    }
    out
}

pub fn target_text(t: &Target) -> String {
    match &t.path {
        Some(path) => format!("${}{}", t.name, path_suffix(path)),
        None => format!("${}", t.name),
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

/// Render a single call argument in its canonical text form. Object,
/// array and subexpr args carry their inner source verbatim, exactly as
/// the parser stored it.
pub fn arg_text(arg: &Arg) -> String {
    match arg {
        Arg::LastValue => "$".to_string(),
        Arg::Var { name, path } => match path {
            Some(path) => format!("${name}{}", path_suffix(path)),
            None => format!("${name}"),
        },
        Arg::Number(n) => n.to_string(),
        Arg::String(s) => json_quote(s),
        Arg::Literal(text) => text.clone(),
        Arg::Subexpr { code } => format!("$({code})"),
        Arg::Object { code } => format!("{{{code}}}"),
        Arg::Array { code } => format!("[{code}]"),
        Arg::NamedArgs { args } => args
            .iter()
            .map(|(k, v)| format!("${k}={}", arg_text(v)))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn var_with_path_renders_suffix() {
        let arg = Arg::Var { name: "x".into(), path: Some(vec![PathSeg::Property { name: "y".into() }]) };
        assert_eq!(arg_text(&arg), "$x.y");
    }

    #[test]
    fn named_args_join_with_space() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), Arg::Number(1.0));
        let arg = Arg::NamedArgs { args: m };
        assert_eq!(arg_text(&arg), "$a=1");
    }
}

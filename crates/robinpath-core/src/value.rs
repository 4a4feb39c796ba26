//! The dynamic value domain.
//!
//! Arrays and objects are reference types: cloning a [`Value::Array`] or
//! [`Value::Object`] clones the handle, not the contents, so `$a = $b`
//! aliases — objects and arrays are shared by reference.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartStr;

pub type RpArray = Rc<RefCell<Vec<Value>>>;
pub type RpObject = Rc<RefCell<IndexMap<String, Value>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(#[serde(with = "smart_str_serde")] SmartStr),
    #[serde(skip)]
    Array(RpArray),
    #[serde(skip)]
    Object(RpObject),
}

mod smart_str_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use smartstring::alias::String as SmartStr;

    pub fn serialize<S: Serializer>(s: &SmartStr, ser: S) -> Result<S::Ok, S::Error> {
        s.as_str().serialize(ser)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<SmartStr, D::Error> {
        Ok(SmartStr::from(String::deserialize(de)?))
    }
}

impl Value {
    pub fn string(s: impl Into<SmartStr>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn empty_array() -> Self {
        Value::array(Vec::new())
    }

    pub fn empty_object() -> Self {
        Value::object(IndexMap::new())
    }

    /// `null`, `false`, `0`, `""`, empty array, empty object are falsy;
    /// everything else truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Object(o) => !o.borrow().is_empty(),
        }
    }

    /// "Empty" as used by `set`/`fallback`/`empty`: null, the
    /// empty string, an empty array, or an empty object. Differs from
    /// [`Value::is_truthy`] only in that `0` and `false` are NOT empty.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(_) | Value::Number(_) => false,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.borrow().is_empty(),
            Value::Object(o) => o.borrow().is_empty(),
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Deep clone (new array/object handles), as opposed to `Clone::clone`
    /// which aliases. Used when a value must cross an isolated scope
    /// boundary without carrying shared mutability.
    pub fn deep_clone(&self) -> Value {
        let mut seen = HashSet::new();
        self.deep_clone_inner(&mut seen)
    }

    fn deep_clone_inner(&self, seen: &mut HashSet<usize>) -> Value {
        match self {
            Value::Array(a) => {
                let ptr = Rc::as_ptr(a) as usize;
                if !seen.insert(ptr) {
                    return Value::empty_array();
                }
                let cloned: Vec<Value> = a
                    .borrow()
                    .iter()
                    .map(|v| v.deep_clone_inner(seen))
                    .collect();
                seen.remove(&ptr);
                Value::array(cloned)
            }
            Value::Object(o) => {
                let ptr = Rc::as_ptr(o) as usize;
                if !seen.insert(ptr) {
                    return Value::empty_object();
                }
                let cloned: IndexMap<String, Value> = o
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone_inner(seen)))
                    .collect();
                seen.remove(&ptr);
                Value::object(cloned)
            }
            other => other.clone(),
        }
    }

    /// Deep equality: arrays/objects compare by contents, not handle.
    /// Cyclic structures compare equal on identity to avoid infinite
    /// recursion.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut seen = HashSet::new();
        Self::deep_eq_inner(self, other, &mut seen)
    }

    fn deep_eq_inner(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => {
                let (px, py) = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                if px == py {
                    return true;
                }
                if !seen.insert((px, py)) {
                    return true;
                }
                let xb = x.borrow();
                let yb = y.borrow();
                xb.len() == yb.len()
                    && xb
                        .iter()
                        .zip(yb.iter())
                        .all(|(l, r)| Self::deep_eq_inner(l, r, seen))
            }
            (Value::Object(x), Value::Object(y)) => {
                let (px, py) = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                if px == py {
                    return true;
                }
                if !seen.insert((px, py)) {
                    return true;
                }
                let xb = x.borrow();
                let yb = y.borrow();
                xb.len() == yb.len()
                    && xb.iter().all(|(k, v)| {
                        yb.get(k)
                            .map(|v2| Self::deep_eq_inner(v, v2, seen))
                            .unwrap_or(false)
                    })
            }
            _ => false,
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=`: numeric if both numbers,
    /// lexicographic if both strings, otherwise incomparable.
    pub fn partial_cmp_scripted(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = HashSet::new();
        write_value(self, f, &mut seen)
    }
}

fn write_value(v: &Value, f: &mut fmt::Formatter<'_>, seen: &mut HashSet<usize>) -> fmt::Result {
    match v {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => f.write_str(s),
        Value::Array(a) => {
            let ptr = Rc::as_ptr(a) as usize;
            if !seen.insert(ptr) {
                return f.write_str("<cycle>");
            }
            f.write_str("[")?;
            for (i, item) in a.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_value(item, f, seen)?;
            }
            seen.remove(&ptr);
            f.write_str("]")
        }
        Value::Object(o) => {
            let ptr = Rc::as_ptr(o) as usize;
            if !seen.insert(ptr) {
                return f.write_str("<cycle>");
            }
            f.write_str("{")?;
            for (i, (k, val)) in o.borrow().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{k}: ")?;
                write_value(val, f, seen)?;
            }
            seen.remove(&ptr);
            f.write_str("}")
        }
    }
}

/// Declared type tag for a literal value, used by the writer's coercion
/// matrix.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum LiteralValueType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl LiteralValueType {
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Coerce `v` to this declared type. When coercion is unrepresentable
    /// the *original* value is preserved with its *current* type rather
    /// than forced to `null`.
    pub fn coerce(self, v: &Value) -> Value {
        if LiteralValueType::of(v) == self {
            return v.clone();
        }
        match (self, v) {
            (Self::String, other) => Value::string(other.to_string()),
            (Self::Number, Value::String(s)) => s
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or_else(|_| v.clone()),
            (Self::Number, Value::Bool(b)) => Value::Number(if *b { 1.0 } else { 0.0 }),
            (Self::Bool, other) => Value::Bool(other.is_truthy()),
            (Self::Null, _) => Value::Null,
            (Self::Array, Value::Array(_)) => v.clone(),
            (Self::Object, Value::Object(_)) => v.clone(),
            // No sensible coercion (e.g. string -> array): keep original.
            _ => v.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_falsy_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::empty_array().is_truthy());
        assert!(!Value::empty_object().is_truthy());
        assert!(Value::Number(0.1).is_truthy());
        assert!(Value::string("x").is_truthy());
    }

    #[test]
    fn aliasing_shares_mutations() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = a.clone();
        if let Value::Array(arr) = &a {
            arr.borrow_mut().push(Value::Number(2.0));
        }
        if let Value::Array(arr) = &b {
            assert_eq!(arr.borrow().len(), 2);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn deep_eq_detects_cycles_without_looping() {
        let a = Value::empty_array();
        if let Value::Array(arr) = &a {
            arr.borrow_mut().push(a.clone());
        }
        assert!(a.deep_eq(&a));
    }

    #[test]
    fn cycle_display_uses_sentinel() {
        let a = Value::empty_array();
        if let Value::Array(arr) = &a {
            arr.borrow_mut().push(a.clone());
        }
        assert_eq!(a.to_string(), "[<cycle>]");
    }

    #[test]
    fn coercion_falls_back_to_original_on_unrepresentable() {
        let arr = Value::array(vec![Value::Number(1.0)]);
        let coerced = LiteralValueType::String.coerce(&arr);
        // Arrays *can* coerce to string (via Display), so pick a case that
        // truly has no representation: object -> number.
        assert!(matches!(coerced, Value::String(_)));
        let obj = Value::empty_object();
        let coerced2 = LiteralValueType::Number.coerce(&obj);
        assert!(matches!(coerced2, Value::Object(_)));
    }
}

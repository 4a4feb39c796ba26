//! Variable storage: frames, the call stack, and attribute-path
//! read/write/materialization.
//!
//! A [`Frame`] is either *isolated* (function calls, parameterized `do`
//! blocks) or *transparent* (plain `do`, `if`, `for`, `together` bodies).
//! Transparent frames see every enclosing frame's locals; isolated frames
//! see only the program's single global frame plus their own locals, the
//! same scoping a function body gets in most tree-walking interpreters.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::PathSeg;
use crate::error::{ControlFlow, Flow, RuntimeError, RuntimeErrorKind};
use crate::pos::Point;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Frame {
    variables: IndexMap<String, Value>,
    constants: HashSet<String>,
    forgotten: HashSet<String>,
    isolated: bool,
    last_value: Value,
}

impl Frame {
    pub fn new(isolated: bool) -> Self {
        Self { isolated, ..Default::default() }
    }
}

/// The live frame stack. Each frame owns its own `$` register; entering a
/// subexpression or `do` gets a fresh one that doesn't disturb the
/// caller's, and only the innermost frame's register is visible.
pub struct Environment {
    frames: Vec<Frame>,
    current_module: Option<String>,
    variable_metadata: IndexMap<String, IndexMap<String, Value>>,
    function_metadata: IndexMap<String, IndexMap<String, Value>>,
    module_metadata: IndexMap<String, IndexMap<String, Value>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(false)],
            current_module: None,
            variable_metadata: IndexMap::new(),
            function_metadata: IndexMap::new(),
            module_metadata: IndexMap::new(),
        }
    }

    /// Record `key = value` against `name`'s variable metadata (`meta $v ...`).
    pub fn set_variable_meta(&mut self, name: &str, key: &str, value: Value) {
        self.variable_metadata.entry(name.to_string()).or_default().insert(key.to_string(), value);
    }

    pub fn variable_meta(&self, name: &str) -> Option<IndexMap<String, Value>> {
        self.variable_metadata.get(name).cloned()
    }

    /// Record `key = value` against `name`'s function metadata (`meta name ...`).
    pub fn set_function_meta(&mut self, name: &str, key: &str, value: Value) {
        self.function_metadata.entry(name.to_string()).or_default().insert(key.to_string(), value);
    }

    pub fn function_meta(&self, name: &str) -> Option<IndexMap<String, Value>> {
        self.function_metadata.get(name).cloned()
    }

    /// Module metadata has no writer in the language surface itself (only
    /// variables and functions take `meta`); a host sets this ahead of a
    /// run for `explain` to surface, via [`Environment::set_module_meta`].
    pub fn set_module_meta(&mut self, name: &str, key: &str, value: Value) {
        self.module_metadata.entry(name.to_string()).or_default().insert(key.to_string(), value);
    }

    pub fn module_meta(&self, name: &str) -> Option<IndexMap<String, Value>> {
        self.module_metadata.get(name).cloned()
    }

    pub fn last_value(&self) -> Value {
        self.frames.last().expect("global frame always present").last_value.clone()
    }

    pub fn set_last_value(&mut self, v: Value) {
        self.frames.last_mut().expect("global frame always present").last_value = v;
    }

    pub fn current_module(&self) -> Option<&str> {
        self.current_module.as_deref()
    }

    pub fn set_current_module(&mut self, module: Option<String>) {
        self.current_module = module;
    }

    pub fn push_frame(&mut self, isolated: bool) {
        self.frames.push(Frame::new(isolated));
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        debug_assert!(!self.frames.is_empty(), "global frame must never be popped");
    }

    /// Indices of frames visible from the current one, nearest first:
    /// walk outward through transparent frames, stop at (but include) the
    /// first isolated frame, then always include the global frame too.
    fn visible_frame_indices(&self) -> Vec<usize> {
        let top = self.frames.len() - 1;
        let mut indices = Vec::new();
        let mut i = top;
        loop {
            indices.push(i);
            if self.frames[i].isolated || i == 0 {
                break;
            }
            i -= 1;
        }
        if indices.last() != Some(&0) {
            indices.push(0);
        }
        indices
    }

    pub fn get(&self, name: &str, point: Point) -> Flow<Value> {
        for &idx in &self.visible_frame_indices() {
            let frame = &self.frames[idx];
            if frame.forgotten.contains(name) {
                return Err(not_found(name, point));
            }
            if let Some(v) = frame.variables.get(name) {
                return Ok(v.clone());
            }
        }
        Err(not_found(name, point))
    }

    pub fn get_path(&self, name: &str, path: Option<&[PathSeg]>, point: Point) -> Flow<Value> {
        let base = self.get(name, point)?;
        match path {
            None => Ok(base),
            Some(segs) => read_path(&base, segs, point),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.visible_frame_indices().into_iter().any(|idx| {
            let frame = &self.frames[idx];
            !frame.forgotten.contains(name) && frame.variables.contains_key(name)
        })
    }

    /// Declare or overwrite `name` in the *current* frame (used by `var`).
    pub fn declare(&mut self, name: &str, value: Value, is_const: bool) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.forgotten.remove(name);
        frame.variables.insert(name.to_string(), value);
        if is_const {
            frame.constants.insert(name.to_string());
        } else {
            frame.constants.remove(name);
        }
        trace!(name, is_const, "declared variable");
    }

    /// Assign to an existing binding if one is visible, walking outward;
    /// otherwise declare a new local in the current frame. Matches a
    /// dynamically-scoped `set`/assignment-statement semantics.
    pub fn assign(&mut self, name: &str, value: Value, point: Point) -> Flow<()> {
        for &idx in &self.visible_frame_indices() {
            let frame = &mut self.frames[idx];
            if frame.forgotten.contains(name) {
                break;
            }
            if frame.variables.contains_key(name) {
                if frame.constants.contains(name) {
                    return Err(ControlFlow::Error(RuntimeError::new(
                        point,
                        RuntimeErrorKind::Immutable(name.to_string()),
                        "",
                    )));
                }
                frame.variables.insert(name.to_string(), value);
                return Ok(());
            }
        }
        self.declare(name, value, false);
        Ok(())
    }

    pub fn assign_path(
        &mut self,
        name: &str,
        path: Option<&[PathSeg]>,
        value: Value,
        point: Point,
    ) -> Flow<()> {
        let Some(segs) = path else {
            return self.assign(name, value, point);
        };
        if !self.has(name) {
            self.declare(name, materialize_root(segs), false);
        }
        let current = self.get(name, point)?;
        write_path(&current, segs, value, point)
    }

    pub fn forget(&mut self, name: &str) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.variables.shift_remove(name);
        frame.constants.remove(name);
        frame.forgotten.insert(name.to_string());
    }

    pub fn clear(&mut self) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.variables.clear();
        frame.constants.clear();
        frame.forgotten.clear();
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(name: &str, point: Point) -> ControlFlow {
    ControlFlow::Error(RuntimeError::new(point, RuntimeErrorKind::NotFound(name.to_string()), ""))
}

fn type_error(msg: impl Into<String>, point: Point) -> ControlFlow {
    ControlFlow::Error(RuntimeError::new(point, RuntimeErrorKind::TypeError(msg.into()), ""))
}

/// The shape needed to hold the first segment of a path being assigned to
/// a variable that doesn't exist yet: an array root for a leading index,
/// an object root for a leading property.
fn materialize_root(segs: &[PathSeg]) -> Value {
    match segs.first() {
        Some(PathSeg::Index { .. }) => Value::empty_array(),
        _ => Value::empty_object(),
    }
}

fn read_path(base: &Value, segs: &[PathSeg], point: Point) -> Flow<Value> {
    let mut current = base.clone();
    for seg in segs {
        current = match (seg, &current) {
            (PathSeg::Property { name }, Value::Object(o)) => {
                o.borrow().get(name).cloned().unwrap_or(Value::Null)
            }
            (PathSeg::Index { index }, Value::Array(a)) => {
                a.borrow().get(*index as usize).cloned().unwrap_or(Value::Null)
            }
            (PathSeg::Property { name }, other) => {
                return Err(type_error(
                    format!("cannot read property '{name}' of {}", other.type_tag()),
                    point,
                ))
            }
            (PathSeg::Index { index }, other) => {
                return Err(type_error(
                    format!("cannot read index {index} of {}", other.type_tag()),
                    point,
                ))
            }
        };
    }
    Ok(current)
}

/// Walk `segs` against `root`, auto-materializing missing intermediate
/// containers, and write `value` at the final segment. `root` must already
/// be the variable's current value (an `Array`/`Object` handle, or
/// something that needs replacing at the first segment).
fn write_path(root: &Value, segs: &[PathSeg], value: Value, point: Point) -> Flow<()> {
    let (last, init) = segs.split_last().expect("path is non-empty");
    let mut container = root.clone();
    for seg in init {
        container = step_into(&container, seg, point)?;
    }
    match (last, &container) {
        (PathSeg::Property { name }, Value::Object(o)) => {
            o.borrow_mut().insert(name.clone(), value);
            Ok(())
        }
        (PathSeg::Index { index }, Value::Array(a)) => {
            let mut a = a.borrow_mut();
            let idx = *index as usize;
            if idx >= a.len() {
                a.resize(idx + 1, Value::Null);
            }
            a[idx] = value;
            Ok(())
        }
        (PathSeg::Property { name }, other) => {
            Err(type_error(format!("cannot set property '{name}' on {}", other.type_tag()), point))
        }
        (PathSeg::Index { index }, other) => {
            Err(type_error(format!("cannot set index {index} on {}", other.type_tag()), point))
        }
    }
}

/// Descend one path segment into `container`, creating the child
/// container in place if it is currently `null`.
fn step_into(container: &Value, seg: &PathSeg, point: Point) -> Flow<Value> {
    match (seg, container) {
        (PathSeg::Property { name }, Value::Object(o)) => {
            let existing = o.borrow().get(name).cloned();
            match existing {
                Some(v @ (Value::Object(_) | Value::Array(_))) => Ok(v),
                None | Some(Value::Null) => {
                    let fresh = Value::empty_object();
                    o.borrow_mut().insert(name.clone(), fresh.clone());
                    Ok(fresh)
                }
                Some(other) => Err(type_error(
                    format!("cannot descend into property '{name}' holding {}", other.type_tag()),
                    point,
                )),
            }
        }
        (PathSeg::Index { index }, Value::Array(a)) => {
            let idx = *index as usize;
            {
                let mut a = a.borrow_mut();
                if idx >= a.len() {
                    a.resize(idx + 1, Value::Null);
                }
            }
            let existing = a.borrow()[idx].clone();
            match existing {
                v @ (Value::Object(_) | Value::Array(_)) => Ok(v),
                Value::Null => {
                    let fresh = Value::empty_object();
                    a.borrow_mut()[idx] = fresh.clone();
                    Ok(fresh)
                }
                other => Err(type_error(
                    format!("cannot descend into index {index} holding {}", other.type_tag()),
                    point,
                )),
            }
        }
        (PathSeg::Property { name }, other) => Err(type_error(
            format!("cannot descend into property '{name}' of {}", other.type_tag()),
            point,
        )),
        (PathSeg::Index { index }, other) => {
            Err(type_error(format!("cannot descend into index {index} of {}", other.type_tag()), point))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> Point {
        Point::new(0, 0)
    }

    #[test]
    fn declare_and_get_roundtrip() {
        let mut env = Environment::new();
        env.declare("x", Value::Number(1.0), false);
        assert_eq!(env.get("x", p()).unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn const_reassignment_is_an_error() {
        let mut env = Environment::new();
        env.declare("pi", Value::Number(3.14), true);
        let err = env.assign("pi", Value::Number(1.0), p()).unwrap_err();
        match err {
            ControlFlow::Error(e) => assert!(matches!(e.kind, RuntimeErrorKind::Immutable(_))),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn isolated_frame_does_not_see_intervening_locals() {
        let mut env = Environment::new();
        env.declare("g", Value::Number(1.0), false);
        env.push_frame(false);
        env.declare("mid", Value::Number(2.0), false);
        env.push_frame(true);
        assert!(env.get("g", p()).is_ok());
        assert!(env.get("mid", p()).is_err());
    }

    #[test]
    fn transparent_frame_sees_enclosing_locals() {
        let mut env = Environment::new();
        env.declare("g", Value::Number(1.0), false);
        env.push_frame(false);
        env.declare("mid", Value::Number(2.0), false);
        env.push_frame(false);
        assert!(env.get("mid", p()).is_ok());
    }

    #[test]
    fn forget_hides_enclosing_binding() {
        let mut env = Environment::new();
        env.declare("x", Value::Number(1.0), false);
        env.push_frame(false);
        env.forget("x");
        assert!(env.get("x", p()).is_err());
    }

    #[test]
    fn assign_path_materializes_missing_object() {
        let mut env = Environment::new();
        let segs = vec![PathSeg::Property { name: "a".to_string() }, PathSeg::Property { name: "b".to_string() }];
        env.assign_path("cfg", Some(&segs), Value::Number(9.0), p()).unwrap();
        let v = env.get_path("cfg", Some(&segs), p()).unwrap();
        assert_eq!(v.as_number(), Some(9.0));
    }

    #[test]
    fn variable_metadata_round_trips_by_key() {
        let mut env = Environment::new();
        env.set_variable_meta("x", "unit", Value::string("seconds"));
        let record = env.variable_meta("x").unwrap();
        assert_eq!(record.get("unit").and_then(Value::as_str), Some("seconds"));
        assert!(env.function_meta("x").is_none());
    }

    #[test]
    fn assign_path_grows_array() {
        let mut env = Environment::new();
        env.declare("xs", Value::empty_array(), false);
        let segs = vec![PathSeg::Index { index: 2 }];
        env.assign_path("xs", Some(&segs), Value::string("z"), p()).unwrap();
        let v = env.get_path("xs", Some(&segs), p()).unwrap();
        assert_eq!(v.as_str(), Some("z"));
    }
}

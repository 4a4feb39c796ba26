//! Command resolution: pseudo-commands, the reserved meta-command set,
//! user-defined functions (with their decorator chain), module-prefixed
//! and bare host builtins, and assignment evaluation.

use std::rc::Rc;

use futures::FutureExt;

use crate::ast::{Arg, Assignment, AssignmentRhs, Command, DefineFunction, LiteralArg};
use crate::error::{ControlFlow, Flow, RuntimeError, RuntimeErrorKind};
use crate::host::{CallArgs, ThreadId};
use crate::pos::Point;
use crate::value::{LiteralValueType, Value};

use super::Executor;

/// Names reserved for the core's own meta-commands. These never dispatch
/// to a host builtin, even if one happens to be registered under the same
/// name, so a host can't accidentally shadow language-level behavior.
const RESERVED: &[&str] = &[
    "var", "const", "set", "fallback", "empty", "end", "use", "explain", "thread", "module",
    "meta", "getMeta", "getType", "has", "clear", "forget",
];

/// Commands whose purpose isn't to produce a value leave `$` exactly as
/// they found it, rather than overwriting it with their own result.
/// `clear` is a deliberate exception: it nulls `$` outright instead of
/// restoring it.
fn preserves_last_value(name: &str) -> bool {
    matches!(name, "set" | "var" | "const" | "empty" | "meta" | "forget" | "log" | "sleep")
        || name.starts_with("assert")
}

pub(super) async fn exec_command(ex: &mut Executor<'_>, c: &Command) -> Flow<Value> {
    let point = c.code_pos.start;
    let prev_last = ex.env.last_value();
    let result = dispatch(ex, c, point).await?;
    if let Some(target) = &c.into {
        ex.env.assign_path(&target.name, target.path.as_deref(), result.clone(), point)?;
    }
    if c.into.is_some() || preserves_last_value(&c.name) {
        ex.env.set_last_value(prev_last);
    } else {
        ex.env.set_last_value(result.clone());
    }
    Ok(result)
}

pub(super) async fn exec_assignment(ex: &mut Executor<'_>, a: &Assignment) -> Flow<()> {
    let point = a.code_pos.start;
    let value = match &a.rhs {
        AssignmentRhs::IsLastValue => ex.env.last_value(),
        AssignmentRhs::Literal { value, value_type } => {
            coerce_literal(value, *value_type, point)?
        }
        AssignmentRhs::Command(cmd) => exec_command(ex, cmd).await?,
    };
    ex.env.set_last_value(value.clone());
    ex.env.assign_path(&a.target_name, a.target_path.as_deref(), value, point)
}

fn coerce_literal(value: &LiteralArg, value_type: LiteralValueType, point: Point) -> Flow<Value> {
    let raw = match value {
        LiteralArg::Null => Value::Null,
        LiteralArg::Bool(b) => Value::Bool(*b),
        LiteralArg::Number(n) => Value::Number(*n),
        LiteralArg::String(s) => Value::string(s.clone()),
        LiteralArg::Raw(code) => parse_raw_literal(code, value_type, point)?,
    };
    Ok(value_type.coerce(&raw))
}

fn parse_raw_literal(code: &str, value_type: LiteralValueType, point: Point) -> Flow<Value> {
    match value_type {
        LiteralValueType::Array => crate::json_lite::parse_array(code).map_err(|e| literal_err(e, point)),
        LiteralValueType::Object => {
            crate::json_lite::parse_object(code).map_err(|e| literal_err(e, point))
        }
        _ => Ok(Value::string(code.to_string())),
    }
}

fn literal_err(e: crate::json_lite::JsonLiteError, point: Point) -> ControlFlow {
    ControlFlow::Error(RuntimeError::new(point, RuntimeErrorKind::TypeError(e.to_string()), ""))
}

async fn dispatch(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    if c.module.is_none() {
        match c.name.as_str() {
            "_var" => return eval_arg(ex, &c.args[0]).await,
            "_subexpr" => {
                if let Arg::Subexpr { code } = &c.args[0] {
                    return exec_subexpr(ex, code, point).await;
                }
            }
            "_object" => {
                if let Arg::Object { code } = &c.args[0] {
                    return crate::json_lite::parse_object(code).map_err(|e| literal_err(e, point));
                }
            }
            "_array" => {
                if let Arg::Array { code } = &c.args[0] {
                    return crate::json_lite::parse_array(code).map_err(|e| literal_err(e, point));
                }
            }
            "var" | "const" => return exec_declare(ex, c, point).await,
            "set" => return exec_set(ex, c, point, false).await,
            "fallback" => return exec_set(ex, c, point, true).await,
            "empty" => return exec_empty(ex, c, point).await,
            "end" => {
                let v = match c.args.first() {
                    Some(arg) => eval_arg(ex, arg).await?,
                    None => ex.env.last_value(),
                };
                return Err(ControlFlow::End(v));
            }
            "use" => {
                let arg_text = match c.args.first() {
                    Some(Arg::Literal(s)) => Some(s.clone()),
                    Some(other) => eval_arg(ex, other).await?.as_str().map(|s| s.to_string()),
                    None => None,
                };
                match arg_text.as_deref() {
                    Some("clear") | None => ex.env.set_current_module(None),
                    Some(module) => ex.env.set_current_module(Some(module.to_string())),
                }
                return Ok(Value::Null);
            }
            "explain" => return exec_explain(ex, c, point).await,
            "thread" => return exec_thread(ex, c, point).await,
            "module" => {
                return Ok(match c.args.first() {
                    Some(Arg::Literal(s)) if s == "list" => {
                        Value::array(ex.host.known_modules().into_iter().map(Value::string).collect())
                    }
                    _ => Value::Null,
                })
            }
            "meta" => return exec_meta(ex, c, point).await,
            "getMeta" => return exec_get_meta(ex, c, point).await,
            "getType" => {
                let v = match c.args.first() {
                    Some(arg) => eval_arg(ex, arg).await?,
                    None => ex.env.last_value(),
                };
                return Ok(Value::string(v.type_tag()));
            }
            "has" => {
                return Ok(Value::Bool(match c.args.first() {
                    Some(Arg::Var { name, .. }) => ex.env.has(name),
                    Some(Arg::Literal(name)) => {
                        ex.functions.contains_key(name) || ex.host.has_builtin(name)
                    }
                    _ => false,
                }))
            }
            "clear" => {
                ex.env.clear();
                return Ok(Value::Null);
            }
            "forget" => {
                if let Some(Arg::Var { name, .. }) = c.args.first() {
                    ex.env.forget(name);
                }
                return Ok(Value::Null);
            }
            _ => {}
        }
        if let Some(def) = ex.functions.get(&c.name).cloned() {
            return call_user_function(ex, def, c, point).await;
        }
    }

    let full_name = match &c.module {
        Some(m) => format!("{m}.{}", c.name),
        None => {
            // Step 4: a bare name registered in more than one module (e.g.
            // `length` under both `string.` and `array.`) dispatches by the
            // first argument's runtime type rather than any fixed module.
            let candidates = modules_providing(ex, &c.name);
            if candidates.len() > 1 {
                let args = eval_call_args(ex, c).await?;
                let type_tag = args.positional.first().map(Value::type_tag).unwrap_or("null");
                let chosen = candidates
                    .iter()
                    .find(|m| m.as_str() == type_tag)
                    .unwrap_or(&candidates[0]);
                let full_name = format!("{chosen}.{}", c.name);
                return match ex.host.builtin(&full_name) {
                    Some(builtin) => builtin.call(args).await,
                    None => Err(ControlFlow::Error(RuntimeError::new(
                        point,
                        RuntimeErrorKind::NotFound(full_name),
                        "",
                    ))),
                };
            }
            match ex.env.current_module() {
                Some(cm) if ex.host.has_builtin(&format!("{cm}.{}", c.name)) => {
                    format!("{cm}.{}", c.name)
                }
                _ => c.name.clone(),
            }
        }
    };
    if let Some(builtin) = ex.host.builtin(&full_name) {
        let args = eval_call_args(ex, c).await?;
        return builtin.call(args).await;
    }

    Err(ControlFlow::Error(RuntimeError::new(
        point,
        RuntimeErrorKind::NotFound(full_name),
        "",
    )))
}

/// Module prefixes among the host's registered builtins that provide a
/// function named `name` (`"length"` → `["array", "string"]` if both
/// `array.length` and `string.length` are registered).
fn modules_providing(ex: &Executor<'_>, name: &str) -> Vec<String> {
    ex.host
        .known_modules()
        .into_iter()
        .filter(|m| ex.host.has_builtin(&format!("{m}.{name}")))
        .collect()
}

async fn exec_declare(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let is_const = c.name == "const";
    let mut last = Value::Null;
    for arg in &c.args {
        if let Arg::NamedArgs { args } = arg {
            for (name, inner) in args {
                let v = eval_arg(ex, inner).await?;
                ex.env.declare(name, v.clone(), is_const);
                last = v;
            }
        } else {
            return Err(ControlFlow::Error(RuntimeError::new(
                point,
                RuntimeErrorKind::TypeError(format!("'{}' requires name=value arguments", c.name)),
                "",
            )));
        }
    }
    Ok(last)
}

fn target_arg(c: &Command, point: Point) -> Flow<(&String, Option<&[crate::ast::PathSeg]>)> {
    match c.args.first() {
        Some(Arg::Var { name, path }) => Ok((name, path.as_deref())),
        _ => Err(ControlFlow::Error(RuntimeError::new(
            point,
            RuntimeErrorKind::TypeError(format!("'{}' requires a $variable target", c.name)),
            "",
        ))),
    }
}

async fn exec_set(ex: &mut Executor<'_>, c: &Command, point: Point, only_if_empty: bool) -> Flow<Value> {
    let (name, path) = target_arg(c, point)?;
    let name = name.clone();
    let path = path.map(|p| p.to_vec());
    if only_if_empty {
        let current = ex.env.get_path(&name, path.as_deref(), point).unwrap_or(Value::Null);
        if !current.is_empty_value() {
            return Ok(current);
        }
    }
    let value = match c.args.get(1) {
        Some(arg) => eval_arg(ex, arg).await?,
        None => Value::Null,
    };
    ex.env.assign_path(&name, path.as_deref(), value.clone(), point)?;
    Ok(value)
}

async fn exec_empty(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let (name, path) = target_arg(c, point)?;
    let name = name.clone();
    let path = path.map(|p| p.to_vec());
    let current = ex.env.get_path(&name, path.as_deref(), point).unwrap_or(Value::Null);
    let emptied = match current {
        Value::String(_) => Value::string(""),
        Value::Array(_) => Value::empty_array(),
        Value::Object(_) => Value::empty_object(),
        _ => Value::Null,
    };
    ex.env.assign_path(&name, path.as_deref(), emptied.clone(), point)?;
    Ok(emptied)
}

fn missing_args_err(name: &str, point: Point) -> ControlFlow {
    ControlFlow::Error(RuntimeError::new(
        point,
        RuntimeErrorKind::TypeError(format!("'{name}' requires a target and a key")),
        "",
    ))
}

async fn arg_as_name(ex: &mut Executor<'_>, arg: &Arg) -> Flow<String> {
    match arg {
        Arg::Literal(s) => Ok(s.clone()),
        other => Ok(eval_arg(ex, other).await?.as_str().unwrap_or_default().to_string()),
    }
}

/// Whether `meta`/`getMeta`'s target names a variable (`$v`, stored in
/// `variableMetadata`) or a bare function name (stored in
/// `functionMetadata`), per §6.2's "target syntactic form preserved" rule.
enum MetaTarget {
    Variable(String),
    Function(String),
}

async fn meta_target(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<MetaTarget> {
    match c.args.first() {
        Some(Arg::Var { name, .. }) => Ok(MetaTarget::Variable(name.clone())),
        Some(other) => Ok(MetaTarget::Function(arg_as_name(ex, other).await?)),
        None => Err(missing_args_err(&c.name, point)),
    }
}

async fn exec_meta(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let target = meta_target(ex, c, point).await?;
    let key = match c.args.get(1) {
        Some(arg) => arg_as_name(ex, arg).await?,
        None => return Err(missing_args_err(&c.name, point)),
    };
    let value = match c.args.get(2) {
        Some(arg) => eval_arg(ex, arg).await?,
        None => Value::Null,
    };
    match target {
        MetaTarget::Variable(name) => ex.env.set_variable_meta(&name, &key, value.clone()),
        MetaTarget::Function(name) => ex.env.set_function_meta(&name, &key, value.clone()),
    }
    Ok(value)
}

async fn exec_get_meta(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let target = meta_target(ex, c, point).await?;
    let record = match &target {
        MetaTarget::Variable(name) => ex.env.variable_meta(name),
        MetaTarget::Function(name) => ex.env.function_meta(name),
    };
    match c.args.get(1) {
        Some(arg) => {
            let key = arg_as_name(ex, arg).await?;
            Ok(record.and_then(|m| m.get(&key).cloned()).unwrap_or(Value::Null))
        }
        None => Ok(record.map(Value::object).unwrap_or(Value::Null)),
    }
}

async fn exec_explain(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let name = match c.args.first() {
        Some(arg) => arg_as_name(ex, arg).await?,
        None => return Err(missing_args_err(&c.name, point)),
    };
    let record = ex.env.module_meta(&name).or_else(|| ex.env.function_meta(&name));
    Ok(record.map(Value::object).unwrap_or(Value::Null))
}

async fn exec_thread(ex: &mut Executor<'_>, c: &Command, point: Point) -> Flow<Value> {
    let sub = match c.args.first() {
        Some(arg) => arg_as_name(ex, arg).await?,
        None => return Err(missing_args_err("thread", point)),
    };
    match sub.as_str() {
        "list" => {
            let threads = ex.host.list_threads().await;
            Ok(Value::array(
                threads
                    .into_iter()
                    .map(|(id, label)| {
                        let mut record = indexmap::IndexMap::new();
                        record.insert("id".to_string(), Value::Number(id as f64));
                        record.insert("label".to_string(), Value::string(label));
                        Value::object(record)
                    })
                    .collect(),
            ))
        }
        "create" => {
            let label = match c.args.get(1) {
                Some(arg) => arg_as_name(ex, arg).await?,
                None => String::new(),
            };
            let id = ex.host.spawn_thread(label).await;
            Ok(Value::Number(id.0 as f64))
        }
        "close" => {
            let id = match c.args.get(1) {
                Some(arg) => eval_arg(ex, arg).await?.as_number().unwrap_or(0.0) as u64,
                None => return Err(missing_args_err("thread close", point)),
            };
            ex.host.finish_thread(ThreadId(id)).await;
            Ok(Value::Null)
        }
        "use" => {
            let id = match c.args.get(1) {
                Some(arg) => eval_arg(ex, arg).await?.as_number().unwrap_or(0.0) as u64,
                None => return Err(missing_args_err("thread use", point)),
            };
            let threads = ex.host.list_threads().await;
            match threads.into_iter().find(|(tid, _)| *tid == id) {
                Some((tid, label)) => {
                    let mut record = indexmap::IndexMap::new();
                    record.insert("id".to_string(), Value::Number(tid as f64));
                    record.insert("label".to_string(), Value::string(label));
                    Ok(Value::object(record))
                }
                None => Err(ControlFlow::Error(RuntimeError::new(
                    point,
                    RuntimeErrorKind::NotFound(format!("thread {id}")),
                    "",
                ))),
            }
        }
        other => Err(ControlFlow::Error(RuntimeError::new(
            point,
            RuntimeErrorKind::TypeError(format!("unknown 'thread' subcommand '{other}'")),
            "",
        ))),
    }
}

async fn exec_subexpr(ex: &mut Executor<'_>, code: &str, point: Point) -> Flow<Value> {
    let ast = crate::parser::parse(code).map_err(|e| {
        ControlFlow::Error(RuntimeError::new(
            point,
            RuntimeErrorKind::Other(format!("invalid subexpression: {e}")),
            code,
        ))
    })?;
    ex.env.push_frame(false);
    let result = ex.exec_body(&ast.statements).await;
    let last = ex.env.last_value();
    ex.env.pop_frame();
    match result {
        Ok(()) => Ok(last),
        Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => Ok(v),
        Err(other) => Err(other),
    }
}

async fn call_user_function(
    ex: &mut Executor<'_>,
    def: Rc<DefineFunction>,
    call: &Command,
    point: Point,
) -> Flow<Value> {
    let args = eval_call_args(ex, call).await?;
    if let Some(decorators) = def.decorators.clone() {
        return run_decorated(ex, def, decorators, 0, args, point).await;
    }
    invoke_function_body(ex, &def, args).await
}

/// Reborrow a raw `Executor` pointer for exactly one `next()` call inside a
/// decorator. Sound because `run_decorated` never touches `ex` itself again
/// after taking this pointer — the only path back into the executor is
/// through the `NextCall` closure, which a decorator invokes at most once.
unsafe fn reborrow<'a, 'h>(ptr: *mut Executor<'h>) -> &'a mut Executor<'h> {
    &mut *ptr
}

fn run_decorated<'a, 'h>(
    ex: &'a mut Executor<'h>,
    def: Rc<DefineFunction>,
    decorators: Vec<crate::ast::Decorator>,
    index: usize,
    args: CallArgs,
    point: Point,
) -> futures::future::LocalBoxFuture<'a, Flow<Value>> {
    async move {
        if index >= decorators.len() {
            return invoke_function_body(ex, &def, args).await;
        }
        let dec = &decorators[index];
        let handler = ex.host.decorator(&dec.name).ok_or_else(|| {
            ControlFlow::Error(RuntimeError::new(
                point,
                RuntimeErrorKind::NotFound(format!("@{}", dec.name)),
                "",
            ))
        })?;
        let mut dec_args = Vec::with_capacity(dec.args.len());
        for a in &dec.args {
            dec_args.push(eval_arg(ex, a).await?);
        }
        let ex_ptr: *mut Executor<'h> = ex;
        let def2 = def.clone();
        let decorators2 = decorators.clone();
        let next = crate::host::NextCall::new(move |call_args: CallArgs| {
            run_decorated(unsafe { reborrow(ex_ptr) }, def2, decorators2, index + 1, call_args, point)
        });
        handler.call(dec_args, args, next).await
    }
    .boxed_local()
}

async fn invoke_function_body(ex: &mut Executor<'_>, def: &DefineFunction, args: CallArgs) -> Flow<Value> {
    ex.env.push_frame(true);
    for (i, name) in def.param_names.iter().enumerate() {
        let mut v = args.positional.get(i).cloned().unwrap_or(Value::Null);
        if let Some(named) = args.named.get(name) {
            v = named.clone();
        }
        ex.env.declare(name, v, false);
    }
    for (i, v) in args.positional.iter().enumerate() {
        ex.env.declare(&(i + 1).to_string(), v.clone(), false);
    }
    let named_bag: indexmap::IndexMap<String, Value> =
        args.named.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    ex.env.declare("args", Value::object(named_bag), false);
    let result = ex.exec_body(&def.body).await;
    ex.env.pop_frame();
    match result {
        Ok(()) => Ok(Value::Null),
        Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => Ok(v),
        Err(other) => Err(other),
    }
}

async fn eval_call_args(ex: &mut Executor<'_>, c: &Command) -> Flow<CallArgs> {
    let mut call_args = CallArgs::default();
    for arg in &c.args {
        if let Arg::NamedArgs { args } = arg {
            for (name, inner) in args {
                let v = eval_arg(ex, inner).await?;
                call_args.named.insert(name.clone(), v);
            }
        } else {
            call_args.positional.push(eval_arg(ex, arg).await?);
        }
    }
    Ok(call_args)
}

pub(super) async fn eval_arg(ex: &mut Executor<'_>, arg: &Arg) -> Flow<Value> {
    match arg {
        Arg::LastValue => Ok(ex.env.last_value()),
        Arg::Var { name, path } => ex.env.get_path(name, path.as_deref(), Point::new(0, 0)),
        Arg::Number(n) => Ok(Value::Number(*n)),
        Arg::String(s) => Ok(Value::string(s.clone())),
        Arg::Literal(s) => Ok(Value::string(s.clone())),
        Arg::Subexpr { code } => exec_subexpr(ex, code, Point::new(0, 0)).await,
        Arg::Object { code } => {
            crate::json_lite::parse_object(code).map_err(|e| literal_err(e, Point::new(0, 0)))
        }
        Arg::Array { code } => {
            crate::json_lite::parse_array(code).map_err(|e| literal_err(e, Point::new(0, 0)))
        }
        Arg::NamedArgs { args } => {
            let mut map = indexmap::IndexMap::new();
            for (name, inner) in args {
                map.insert(name.clone(), Box::pin(eval_arg(ex, inner)).await?);
            }
            Ok(Value::object(map))
        }
    }
}

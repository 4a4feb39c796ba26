//! The tree-walking executor: statement dispatch, frame/scope handling,
//! and the `$` last-value register. Command resolution and `together`
//! concurrency live in [`command`] and [`together`] respectively.

mod command;
mod together;

use std::collections::HashMap;
use std::rc::Rc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::ast::{Ast, DefineFunction, OnBlock, Statement};
use crate::env::Environment;
use crate::error::{ControlFlow, Flow, RuntimeError, RuntimeErrorKind};
use crate::expr_eval;
use crate::host::Host;
use crate::pos::Point;
use crate::value::Value;

/// A program ready to run: its flat top-level statements plus the
/// function/event tables lifted out at parse time, indexed for dispatch.
pub struct Program {
    pub statements: Vec<Statement>,
    pub functions: HashMap<String, Rc<DefineFunction>>,
    pub on_blocks: Vec<OnBlock>,
}

impl Program {
    pub fn from_ast(ast: Ast) -> Self {
        let functions = ast
            .functions
            .into_iter()
            .map(|f| (f.name.clone(), Rc::new(f)))
            .collect();
        Self { statements: ast.statements, functions, on_blocks: ast.on_blocks }
    }
}

pub struct Executor<'h> {
    pub(crate) host: &'h Host,
    pub(crate) env: Environment,
    pub(crate) functions: HashMap<String, Rc<DefineFunction>>,
}

impl<'h> Executor<'h> {
    pub fn new(host: &'h Host, functions: HashMap<String, Rc<DefineFunction>>) -> Self {
        Self { host, env: Environment::new(), functions }
    }

    /// The executor's variable environment, for callers that need to read
    /// or seed state around a run (e.g. tests inspecting final bindings).
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Run the program's top-level statements in order, then fire `ready`
    /// so any `on ready` listener observes a fully-initialized program.
    pub async fn run(&mut self, program: &Program) -> Flow<Value> {
        match self.exec_body(&program.statements).await {
            Ok(()) => {
                self.host.emit("ready", Value::Null);
                Ok(self.env.last_value())
            }
            Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => Ok(v),
            Err(other) => Err(other),
        }
    }

    /// Execute a single `on` block body against its delivered payload,
    /// exposed as `$event`.
    pub async fn run_on_block(&mut self, block: &OnBlock, payload: Value) -> Flow<Value> {
        self.env.declare("event", payload, false);
        match self.exec_body(&block.body).await {
            Ok(()) => Ok(self.env.last_value()),
            Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => Ok(v),
            Err(other) => Err(other),
        }
    }

    pub fn exec_body<'a>(&'a mut self, body: &'a [Statement]) -> BoxFuture<'a, Flow<()>> {
        async move {
            for stmt in body {
                self.exec_statement(stmt).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn exec_statement<'a>(&'a mut self, stmt: &'a Statement) -> BoxFuture<'a, Flow<()>> {
        async move {
            match stmt {
                Statement::Command(c) => {
                    command::exec_command(self, c).await?;
                    Ok(())
                }
                Statement::Assignment(a) => command::exec_assignment(self, a).await,
                Statement::ShorthandAssignment(a) => {
                    let v = self.env.last_value();
                    self.env.assign(&a.target_name, v, a.code_pos.start)
                }
                Statement::IfBlock(b) => {
                    let point = b.code_pos.start;
                    if self.eval_condition(&b.condition_expr, point).await? {
                        return self.exec_body(&b.then_branch).await;
                    }
                    for branch in &b.elseif_branches {
                        if self.eval_condition(&branch.condition, branch.code_pos.start).await? {
                            return self.exec_body(&branch.body).await;
                        }
                    }
                    if let Some(else_branch) = &b.else_branch {
                        return self.exec_body(else_branch).await;
                    }
                    Ok(())
                }
                Statement::InlineIf(b) => {
                    if self.eval_condition(&b.condition_expr, b.code_pos.start).await? {
                        self.exec_statement(&b.command).await?;
                    }
                    Ok(())
                }
                Statement::IfTrue(b) => {
                    if self.env.last_value().is_truthy() {
                        self.exec_statement(&b.command).await?;
                    }
                    Ok(())
                }
                Statement::IfFalse(b) => {
                    if !self.env.last_value().is_truthy() {
                        self.exec_statement(&b.command).await?;
                    }
                    Ok(())
                }
                Statement::ForLoop(f) => self.exec_for_loop(f).await,
                Statement::DefineFunction(_) => {
                    debug!("define-function statement survived lifting; ignoring at run time");
                    Ok(())
                }
                Statement::ScopeBlock(s) => {
                    together::exec_scope_block(self, s).await.map(|_| ())
                }
                Statement::TogetherBlock(t) => together::exec_together(self, t).await,
                Statement::ReturnStatement(r) => {
                    let v = match &r.value {
                        Some(arg) => command::eval_arg(self, arg).await?,
                        None => self.env.last_value(),
                    };
                    Err(ControlFlow::Return(v))
                }
                Statement::BreakStatement(_) => Err(ControlFlow::Break),
                Statement::ContinueStatement(_) => Err(ControlFlow::Continue),
                Statement::CommentStatement(_) => Ok(()),
                Statement::OnBlock(_) => {
                    debug!("nested on-block survived lifting; ignoring at run time");
                    Ok(())
                }
            }
        }
        .boxed()
    }

    async fn exec_for_loop(&mut self, f: &crate::ast::ForLoop) -> Flow<()> {
        let point = f.code_pos.start;
        let iterable = self.eval_expr_value(&f.iterable_expr, point).await?;
        let items: Vec<Value> = match &iterable {
            Value::Array(a) => a.borrow().clone(),
            Value::Object(o) => o.borrow().values().cloned().collect(),
            Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            other => {
                return Err(ControlFlow::Error(RuntimeError::new(
                    point,
                    RuntimeErrorKind::TypeError(format!("cannot iterate over {}", other.type_tag())),
                    "",
                )))
            }
        };
        // No frame of its own: the loop variable and `$` both live in the
        // enclosing frame, so a zero-iteration loop leaves `$` untouched.
        for item in items {
            self.env.declare(&f.var_name, item, false);
            match self.exec_body(&f.body).await {
                Ok(()) => {}
                Err(ControlFlow::Break) => break,
                Err(ControlFlow::Continue) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    async fn eval_condition(&mut self, expr: &str, point: Point) -> Flow<bool> {
        Ok(self.eval_expr_value(expr, point).await?.is_truthy())
    }

    async fn eval_expr_value(&mut self, expr: &str, point: Point) -> Flow<Value> {
        let mut resolver = ExecResolver { env: &mut self.env, point };
        expr_eval::evaluate(expr, point, &mut resolver)
    }
}

/// Bridges [`Environment`] lookups to [`expr_eval::VarResolver`] without
/// `expr_eval` needing to know about frames at all.
struct ExecResolver<'a> {
    env: &'a mut Environment,
    point: Point,
}

impl<'a> expr_eval::VarResolver for ExecResolver<'a> {
    fn resolve(
        &mut self,
        name: &str,
        path: Option<&[crate::ast::PathSeg]>,
    ) -> expr_eval::ExprFlow<Value> {
        self.env.get_path(name, path, self.point)
    }

    fn last_value(&self) -> Value {
        self.env.last_value()
    }
}

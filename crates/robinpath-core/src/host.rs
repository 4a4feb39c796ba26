//! The host surface: builtin commands, decorators, and the event bus a
//! program's `on` blocks attach to. A program never runs against the bare
//! executor; it runs against a [`Host`] that supplies these.

use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::error::Flow;
use crate::value::Value;

/// Arguments already evaluated to values, in declaration order, plus any
/// named arguments collected separately.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: HashMap<String, Value>,
}

impl CallArgs {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }
}

/// A host-provided command (`log`, `math.add`, ...). Implementations run
/// on the single-threaded executor the program is driven from, so they may
/// `.await` real I/O; `Value`'s `Rc`-backed arrays/objects keep this `?Send`
/// rather than the usual `async_trait` default.
#[async_trait(?Send)]
pub trait BuiltinFn {
    async fn call(&self, args: CallArgs) -> Flow<Value>;
}

#[async_trait(?Send)]
impl<F> BuiltinFn for F
where
    F: Fn(CallArgs) -> Flow<Value>,
{
    async fn call(&self, args: CallArgs) -> Flow<Value> {
        self(args)
    }
}

/// A decorator implementation (`@retry`, `@timeout`, ...), wrapping a
/// function call. `next` invokes the rest of the decorator chain (or the
/// function body itself, for the innermost decorator).
#[async_trait(?Send)]
pub trait DecoratorFn {
    async fn call(
        &self,
        decorator_args: Vec<Value>,
        call_args: CallArgs,
        next: NextCall<'_>,
    ) -> Flow<Value>;
}

/// The remaining decorator chain (or the bare function body), callable
/// exactly once by the decorator ahead of it.
pub struct NextCall<'a> {
    inner: Box<dyn FnOnce(CallArgs) -> futures::future::LocalBoxFuture<'a, Flow<Value>> + 'a>,
}

impl<'a> NextCall<'a> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(CallArgs) -> futures::future::LocalBoxFuture<'a, Flow<Value>> + 'a,
    {
        Self { inner: Box::new(f) }
    }

    pub async fn call(self, args: CallArgs) -> Flow<Value> {
        (self.inner)(args).await
    }
}

/// A spawned `together` worker's identity, handed back to `thread`-family
/// builtins so a program can inspect or join its own concurrent branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

#[derive(Default)]
struct ThreadRegistry {
    next_id: u64,
    active: HashMap<u64, String>,
}

impl ThreadRegistry {
    fn spawn(&mut self, label: impl Into<String>) -> ThreadId {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id, label.into());
        ThreadId(id)
    }

    fn finish(&mut self, id: ThreadId) {
        self.active.remove(&id.0);
    }

    fn list(&self) -> Vec<(u64, String)> {
        let mut threads: Vec<(u64, String)> = self.active.iter().map(|(id, label)| (*id, label.clone())).collect();
        threads.sort_by_key(|(id, _)| *id);
        threads
    }
}

/// A fired event: its name and the payload passed to matching `on` blocks.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// The host a program executes against: builtin commands, decorators,
/// a thread registry for `together` branches, and an event bus for
/// `on`/emit wiring. One `Host` is shared across an entire run.
pub struct Host {
    builtins: HashMap<String, Rc<dyn BuiltinFn>>,
    decorators: HashMap<String, Rc<dyn DecoratorFn>>,
    threads: Mutex<ThreadRegistry>,
    events: broadcast::Sender<Event>,
}

impl Host {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            builtins: HashMap::new(),
            decorators: HashMap::new(),
            threads: Mutex::new(ThreadRegistry::default()),
            events,
        }
    }

    pub fn register_builtin(&mut self, name: impl Into<String>, f: impl BuiltinFn + 'static) {
        self.builtins.insert(name.into(), Rc::new(f));
    }

    pub fn register_decorator(&mut self, name: impl Into<String>, f: impl DecoratorFn + 'static) {
        self.decorators.insert(name.into(), Rc::new(f));
    }

    pub fn builtin(&self, name: &str) -> Option<Rc<dyn BuiltinFn>> {
        self.builtins.get(name).cloned()
    }

    pub fn decorator(&self, name: &str) -> Option<Rc<dyn DecoratorFn>> {
        self.decorators.get(name).cloned()
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Distinct module prefixes among registered builtins, for the
    /// `module list` command. Builtins registered under a bare name
    /// (no `.`) contribute nothing here.
    pub fn known_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .builtins
            .keys()
            .filter_map(|name| name.split_once('.').map(|(m, _)| m.to_string()))
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }

    pub async fn spawn_thread(&self, label: impl Into<String>) -> ThreadId {
        self.threads.lock().await.spawn(label)
    }

    pub async fn finish_thread(&self, id: ThreadId) {
        self.threads.lock().await.finish(id);
    }

    /// Active branches spawned via [`Host::spawn_thread`], for the `thread`
    /// command's `list`/`use` forms.
    pub async fn list_threads(&self) -> Vec<(u64, String)> {
        self.threads.lock().await.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Fan an event out to every `on` listener. Errors only if there are
    /// no receivers at all, which the executor treats as a no-op.
    pub fn emit(&self, name: impl Into<String>, payload: Value) {
        let _ = self.events.send(Event { name: name.into(), payload });
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_closure_is_callable() {
        let mut host = Host::new();
        host.register_builtin("double", |args: CallArgs| {
            let n = args.get(0).and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        let f = host.builtin("double").unwrap();
        let result = f
            .call(CallArgs { positional: vec![Value::Number(4.0)], named: HashMap::new() })
            .await
            .unwrap();
        assert_eq!(result.as_number(), Some(8.0));
    }

    #[tokio::test]
    async fn event_bus_delivers_to_subscriber() {
        let host = Host::new();
        let mut rx = host.subscribe();
        host.emit("ready", Value::Bool(true));
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.name, "ready");
    }

    #[tokio::test]
    async fn thread_registry_tracks_active_count() {
        let host = Host::new();
        let id = host.spawn_thread("branch-0").await;
        host.finish_thread(id).await;
    }

    #[tokio::test]
    async fn thread_registry_lists_active_threads() {
        let host = Host::new();
        let id = host.spawn_thread("branch-0").await;
        let threads = host.list_threads().await;
        assert_eq!(threads, vec![(id.0, "branch-0".to_string())]);
        host.finish_thread(id).await;
        assert!(host.list_threads().await.is_empty());
    }
}

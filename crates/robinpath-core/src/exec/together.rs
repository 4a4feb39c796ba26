//! `do` scope blocks and `together`'s concurrent branches.
//!
//! A `do` with parameters is isolated: each named parameter is snapshotted
//! with [`Value::deep_clone`] out of the enclosing scope before the block
//! runs, so the block can never alias the caller's arrays/objects. Inside
//! `together`, every branch gets its own throwaway [`Executor`] (its own
//! frame stack) built from that same snapshot, and all branches are driven
//! concurrently with [`futures::future::join_all`] — cooperative
//! interleaving on one task, not OS threads, which is what `Value`'s
//! `Rc`-backed arrays/objects allow.

use tracing::warn;

use crate::ast::{ScopeBlock, TogetherBlock};
use crate::error::{ControlFlow, Flow};
use crate::pos::Point;
use crate::value::Value;

use super::Executor;

pub(super) async fn exec_scope_block(ex: &mut Executor<'_>, block: &ScopeBlock) -> Flow<Value> {
    let point = block.code_pos.start;
    let isolated = block.param_names.is_some();
    if isolated {
        let names = block.param_names.as_ref().unwrap();
        let mut snapshot = Vec::with_capacity(names.len());
        for name in names {
            let v = ex.env.get(name, point).unwrap_or(Value::Null).deep_clone();
            snapshot.push((name.clone(), v));
        }
        ex.env.push_frame(true);
        for (name, v) in snapshot {
            ex.env.declare(&name, v, false);
        }
    } else {
        ex.env.push_frame(false);
    }
    let result = ex.exec_body(&block.body).await;
    let last = ex.env.last_value();
    ex.env.pop_frame();
    let value = match result {
        Ok(()) => last,
        Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => v,
        Err(other) => return Err(other),
    };
    if let Some(target) = &block.into {
        ex.env.assign_path(&target.name, target.path.as_deref(), value.clone(), point)?;
    }
    Ok(value)
}

pub(super) async fn exec_together(ex: &mut Executor<'_>, t: &TogetherBlock) -> Flow<()> {
    let point = t.code_pos.start;
    let host = ex.host;
    let functions_snapshot = ex.functions.clone();

    // Snapshot every branch's captured parameters up front, sequentially,
    // before any branch starts running.
    let mut prepared = Vec::with_capacity(t.blocks.len());
    for block in &t.blocks {
        let mut snapshot = Vec::new();
        if let Some(names) = &block.param_names {
            for name in names {
                let v = ex.env.get(name, point).unwrap_or(Value::Null).deep_clone();
                snapshot.push((name.clone(), v));
            }
        }
        prepared.push((snapshot, block));
    }

    let branch_futures = prepared.into_iter().map(|(snapshot, block)| {
        let functions = functions_snapshot.clone();
        async move {
            let tid = host.spawn_thread("together-branch").await;
            let mut branch_ex = Executor::new(host, functions);
            for (name, v) in snapshot {
                branch_ex.env.declare(&name, v, false);
            }
            let result = branch_ex.exec_body(&block.body).await;
            let last = branch_ex.env.last_value();
            host.finish_thread(tid).await;
            let value = match result {
                Ok(()) => last,
                Err(ControlFlow::Return(v)) | Err(ControlFlow::End(v)) => v,
                Err(other) => return Err(other),
            };
            Ok((block.into.clone(), value))
        }
    });

    let results = futures::future::join_all(branch_futures).await;
    let mut first_error = None;
    for r in results {
        match r {
            Ok((into, value)) => {
                if let Some(target) = into {
                    ex.env.assign_path(&target.name, target.path.as_deref(), value, point)?;
                }
            }
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(err) => warn!(?err, "together branch failed after another already won; discarding"),
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

//! CK-006: Operation invocation.
//!
//! `invoke` layers the caller's named values over the entry's merged
//! parameters, finds the operation along the ancestry chain, binds and calls
//! it. When nothing along the chain defines the method, entry built-ins and
//! then kernel built-ins are tried, bound against the caller's values only.

use super::binder::{bind, Args};
use super::entry::Entry;
use super::error::{KernelError, Result};
use super::registry::Registry;
use super::resolver::reach_operation;
use super::types::{merge_params, CallContext, Operation, Outcome, Params, Value};
use std::rc::Rc;

/// Keys callers may not inject; the call context carries these instead.
pub const RESERVED_KEYS: [&str; 2] = ["__kernel__", "__entry__"];

fn strip_reserved(bag: &Params) -> Params {
    bag.iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Invoke `method` on `entry`.
pub fn invoke(
    reg: &Registry,
    entry: &Rc<Entry>,
    method: &str,
    positional: &[Value],
    named: &Params,
) -> Result<Outcome> {
    let caller = strip_reserved(named);

    match reach_operation(entry, reg, method) {
        Ok(reached) => {
            let base = entry.merged_parameters(reg)?;
            let bag = strip_reserved(&merge_params(&base, &caller));
            tracing::debug!(
                entry = entry.name(),
                method,
                owner = reached.owner.name(),
                "invoking"
            );
            call(reg, entry, method, &reached.operation, positional, &bag)
        }
        Err(err @ KernelError::OperationNotFound { .. }) => {
            for (layer, ns) in [
                ("entry", reg.entry_builtins()),
                ("kernel", reg.kernel_builtins()),
            ] {
                if let Some(op) = ns.get(method) {
                    tracing::debug!(entry = entry.name(), method, layer, "invoking built-in");
                    return call(reg, entry, method, op, positional, &caller);
                }
            }
            Err(err)
        }
        Err(other) => Err(other),
    }
}

fn call(
    reg: &Registry,
    entry: &Rc<Entry>,
    method: &str,
    op: &Operation,
    positional: &[Value],
    bag: &Params,
) -> Result<Outcome> {
    let bound = bind(&op.name, &op.shape, positional, bag)?;
    let ctx = CallContext {
        registry: reg,
        entry,
        method,
    };
    op.call(&ctx, &Args::new(&op.shape, &bound))
        .map_err(|e| in_operation(e, method, entry, bag))
}

/// Attach call context to a failure raised inside an operation body.
///
/// Lookup and binding failures of nested calls keep their own kind (and
/// exit code); nested invocation failures already carry their context.
fn in_operation(err: KernelError, method: &str, entry: &Entry, bag: &Params) -> KernelError {
    let reason = match err {
        KernelError::EntryNotFound { .. }
        | KernelError::OperationNotFound { .. }
        | KernelError::MissingArguments { .. }
        | KernelError::TooManyArguments { .. }
        | KernelError::CyclicAncestry { .. }
        | KernelError::Invocation { .. } => return err,
        KernelError::Failed(reason) => reason,
        other => other.to_string(),
    };
    KernelError::Invocation {
        method: method.to_string(),
        entry: entry.name().to_string(),
        params: Value::Object(bag.clone()).to_string(),
        reason,
    }
}

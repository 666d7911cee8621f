//! CK-014: Structured help for entries and methods.

use crate::core::binder::ParamShape;
use crate::core::entry::Entry;
use crate::core::error::{KernelError, Result};
use crate::core::registry::Registry;
use crate::core::resolver::{ancestry, reach_operation};
use crate::core::types::{CallContext, Namespace, Operation, Outcome, Value};
use serde_json::json;
use std::rc::Rc;

pub fn namespace() -> Namespace {
    Namespace::new("help", "Describe entries and their methods.")
        .with(
            Operation::new(
                "entry",
                ParamShape::new().optional("entry_name", Value::Null),
                |ctx, args| {
                    let target = target(ctx, args.str("entry_name"))?;
                    Ok(Outcome::Data(describe_entry(ctx.registry, &target)?))
                },
            )
            .with_doc("Describe an entry (this one unless entry_name is given)."),
        )
        .with(
            Operation::new(
                "method",
                ParamShape::new()
                    .required("method_name")
                    .optional("entry_name", Value::Null),
                |ctx, args| {
                    let method = args.require_str("method_name")?;
                    let target = target(ctx, args.str("entry_name"))?;
                    Ok(Outcome::Data(describe_method(ctx.registry, &target, method)?))
                },
            )
            .with_doc("Describe how a method resolves on an entry."),
        )
}

fn target(ctx: &CallContext<'_>, entry_name: Option<&str>) -> Result<Rc<Entry>> {
    match entry_name {
        None => Ok(ctx.entry.clone()),
        Some(name) => ctx
            .registry
            .byname(name)?
            .ok_or_else(|| KernelError::EntryNotFound {
                name: name.to_string(),
            }),
    }
}

/// Name, path, namespace doc, ancestry and every reachable operation.
pub fn describe_entry(reg: &Registry, entry: &Rc<Entry>) -> Result<Value> {
    let chain = ancestry(entry, reg)?;
    let own = entry.operations(reg)?;

    let mut reachable: Vec<String> = Vec::new();
    for level in &chain {
        if let Some(ns) = level.operations(reg)? {
            for name in ns.names() {
                if !reachable.iter().any(|n| n == name) {
                    reachable.push(name.to_string());
                }
            }
        }
    }
    let builtins: Vec<&str> = reg
        .entry_builtins()
        .names()
        .chain(reg.kernel_builtins().names())
        .collect();
    let names: Vec<&str> = chain.iter().map(|e| e.name()).collect();

    Ok(json!({
        "entry": entry.name(),
        "path": entry.path().display().to_string(),
        "doc": own.as_ref().map(|ns| ns.doc.clone()),
        "namespace": own.as_ref().map(|ns| ns.name.clone()),
        "parent": chain.get(1).map(|p| p.name()),
        "ancestry": names.join(" --> "),
        "operations": reachable,
        "builtins": builtins,
    }))
}

/// Where `method` resolves from `entry`, with its signature and doc.
pub fn describe_method(reg: &Registry, entry: &Rc<Entry>, method: &str) -> Result<Value> {
    let base = || {
        json!({
            "entry": entry.name(),
            "path": entry.path().display().to_string(),
            "method": method,
        })
    };

    match reach_operation(entry, reg, method) {
        Ok(reached) => {
            let mut out = base();
            out["owner"] = json!(reached.owner.name());
            out["ancestry"] = json!(reached.ancestry.join(" --> "));
            describe_operation(&mut out, &reached.operation);
            Ok(out)
        }
        Err(err @ KernelError::OperationNotFound { .. }) => {
            for (layer, ns) in [
                ("entry", reg.entry_builtins()),
                ("kernel", reg.kernel_builtins()),
            ] {
                if let Some(op) = ns.get(method) {
                    let mut out = base();
                    out["builtin"] = json!(layer);
                    describe_operation(&mut out, op);
                    return Ok(out);
                }
            }
            Err(err)
        }
        Err(other) => Err(other),
    }
}

fn describe_operation(out: &mut Value, op: &Operation) {
    let shape = &op.shape;
    out["signature"] = json!(op.signature());
    out["doc"] = json!(op.doc);
    out["required"] = json!(shape.required_names());
    out["optional"] = json!(shape.optional_names().collect::<Vec<_>>());
    out["extra_named"] = json!(shape.accepts_extra_named());
    out["variadic"] = json!(shape.is_variadic());
}

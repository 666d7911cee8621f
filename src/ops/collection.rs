//! CK-012: Collections: entries that index other entries.
//!
//! A collection's parameters carry `name_2_path` (entry name → path relative
//! to the collection) and `collections_searchpath` (sub-collections searched
//! after the index, in order).

use crate::core::binder::ParamShape;
use crate::core::error::{KernelError, Result};
use crate::core::registry::{NAME_2_PATH, SEARCHPATH};
use crate::core::types::{CallContext, Namespace, Operation, Outcome, Params, Value};
use rustc_hash::FxHashSet;
use serde_json::json;

pub fn namespace() -> Namespace {
    Namespace::new(
        "collection",
        "A collection of entries, searchable by name.",
    )
    .with(
        Operation::new(
            "byname",
            ParamShape::new().required("entry_name"),
            |ctx, args| {
                let name = args.require_str("entry_name")?;
                let mut visited = FxHashSet::default();
                match ctx.registry.byname_in(name, ctx.entry, &mut visited)? {
                    Some(entry) => Ok(Outcome::Entry(entry)),
                    None => Err(KernelError::EntryNotFound {
                        name: name.to_string(),
                    }),
                }
            },
        )
        .with_doc("Find an entry in this collection or its sub-collections."),
    )
    .with(
        Operation::new(
            "show_map",
            ParamShape::new().required(NAME_2_PATH),
            |_ctx, args| Ok(Outcome::Data(args.require(NAME_2_PATH)?.clone())),
        )
        .with_doc("The name → path index."),
    )
    .with(
        Operation::new(
            "all_entries",
            ParamShape::new().optional(NAME_2_PATH, json!({})),
            |ctx, args| {
                let index = match args.get(NAME_2_PATH) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Params::new(),
                };
                let entries = index
                    .values()
                    .filter_map(Value::as_str)
                    .map(|rel| Outcome::Entry(ctx.registry.bypath(ctx.entry.file_path(Some(rel)))))
                    .collect();
                Ok(Outcome::List(entries))
            },
        )
        .with_doc("Every indexed entry, in index order."),
    )
    .with(
        Operation::new(
            "add_entry",
            ParamShape::new()
                .required("entry_name")
                .optional("data", json!({})),
            |ctx, args| {
                let name = args.require_str("entry_name")?;
                let data = match args.get("data") {
                    None | Some(Value::Null) => Params::new(),
                    Some(Value::Object(map)) => map.clone(),
                    Some(_) => return Err(KernelError::failed("'data' must be a map")),
                };
                add_entry(ctx, name, &data)
            },
        )
        .with_doc("Create an entry directory, index it and store its initial data."),
    )
    .with(
        Operation::new(
            "delete_entry",
            ParamShape::new().required("entry_name"),
            |ctx, args| {
                let name = args.require_str("entry_name")?;
                delete_entry(ctx, name)
            },
        )
        .with_doc("Unindex an entry and remove its directory."),
    )
    .with(
        Operation::new("searchpath", ParamShape::new(), |ctx, _args| {
            let own = ctx.entry.own_parameters(ctx.registry)?;
            Ok(Outcome::Data(own.get(SEARCHPATH).cloned().unwrap_or(json!([]))))
        })
        .with_doc("Sub-collections searched after the index."),
    )
}

fn own_index(ctx: &CallContext<'_>) -> Result<Params> {
    let own = ctx.entry.own_parameters(ctx.registry)?;
    Ok(match own.get(NAME_2_PATH) {
        Some(Value::Object(map)) => map.clone(),
        _ => Params::new(),
    })
}

fn add_entry(ctx: &CallContext<'_>, name: &str, data: &Params) -> Result<Outcome> {
    if name.is_empty() || name.contains('/') {
        return Err(KernelError::failed(format!("'{}' is not a valid entry name", name)));
    }
    let mut index = own_index(ctx)?;
    if index.contains_key(name) {
        return Err(KernelError::failed(format!(
            "'{}' is already in collection '{}'",
            name,
            ctx.entry.name()
        )));
    }

    let dir = ctx.entry.file_path(Some(name));
    std::fs::create_dir_all(&dir)
        .map_err(|e| KernelError::failed(format!("cannot create {}: {}", dir.display(), e)))?;

    let entry = ctx.registry.bypath(&dir);
    entry.update_parameters(ctx.registry, data)?;
    entry.persist(ctx.registry)?;

    index.insert(name.to_string(), json!(name));
    ctx.entry
        .set_parameter(ctx.registry, NAME_2_PATH, Value::Object(index))?;
    ctx.entry.persist(ctx.registry)?;

    tracing::info!(collection = ctx.entry.name(), entry = name, "added entry");
    Ok(Outcome::Entry(entry))
}

fn delete_entry(ctx: &CallContext<'_>, name: &str) -> Result<Outcome> {
    let mut index = own_index(ctx)?;
    let Some(rel) = index.shift_remove(name) else {
        return Err(KernelError::EntryNotFound {
            name: name.to_string(),
        });
    };
    let rel = rel
        .as_str()
        .ok_or_else(|| KernelError::failed(format!("index path of '{}' is not a string", name)))?
        .to_string();

    ctx.entry
        .set_parameter(ctx.registry, NAME_2_PATH, Value::Object(index))?;
    ctx.entry.persist(ctx.registry)?;

    let dir = ctx.entry.file_path(Some(&rel));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .map_err(|e| KernelError::failed(format!("cannot remove {}: {}", dir.display(), e)))?;
    }

    tracing::info!(collection = ctx.entry.name(), entry = name, "deleted entry");
    Ok(Outcome::Data(json!(name)))
}

//! CK-011: Kernel built-ins, tried after the entry built-ins.

use crate::core::binder::ParamShape;
use crate::core::error::KernelError;
use crate::core::types::{Namespace, Operation, Outcome, Value};
use serde_json::json;

pub fn namespace() -> Namespace {
    Namespace::new("kernel", "Registry-level operations.")
        .with(
            Operation::new("version", ParamShape::new(), |ctx, _args| {
                Ok(Outcome::Data(json!(ctx.registry.version())))
            })
            .with_doc("Kernel version."),
        )
        .with(
            Operation::new(
                "get_kernel_path",
                ParamShape::new().optional("file_name", Value::Null),
                |ctx, args| {
                    let path = ctx.registry.kernel_path(args.str("file_name"));
                    Ok(Outcome::Data(json!(path.display().to_string())))
                },
            )
            .with_doc("The kernel directory, or a file inside it."),
        )
        .with(
            Operation::new("bypath", ParamShape::new().required("path"), |ctx, args| {
                let path = args.require_str("path")?;
                let full = ctx.registry.kernel_path(Some(path));
                Ok(Outcome::Entry(ctx.registry.bypath(full)))
            })
            .with_doc("The entry at a path (relative paths start at the kernel directory)."),
        )
        .with(
            Operation::new(
                "byname",
                ParamShape::new().required("entry_name"),
                |ctx, args| {
                    let name = args.require_str("entry_name")?;
                    match ctx.registry.byname(name)? {
                        Some(entry) => Ok(Outcome::Entry(entry)),
                        None => Err(KernelError::EntryNotFound {
                            name: name.to_string(),
                        }),
                    }
                },
            )
            .with_doc("Find an entry by name across all collections."),
        )
        .with(
            Operation::new("working_collection", ParamShape::new(), |ctx, _args| {
                Ok(Outcome::Entry(ctx.registry.working_collection()?))
            })
            .with_doc("The first configured collection."),
        )
        .with(
            Operation::new(
                "cached",
                ParamShape::new().required("entry_name"),
                |ctx, args| {
                    let name = args.require_str("entry_name")?;
                    Ok(ctx
                        .registry
                        .cached(name)
                        .map(Outcome::Entry)
                        .unwrap_or_else(Outcome::null))
                },
            )
            .with_doc("An entry already resolved by name, or null."),
        )
}

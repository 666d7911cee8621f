//! CK-011: Entry built-ins, reachable on every entry when its ancestry lacks the method.

use super::help;
use crate::core::binder::ParamShape;
use crate::core::error::KernelError;
use crate::core::types::{Namespace, Operation, Outcome, Value};
use serde_json::json;

pub fn namespace() -> Namespace {
    Namespace::new("entry", "Operations every entry understands.")
        .with(
            Operation::new(
                "get_path",
                ParamShape::new().optional("file_name", Value::Null),
                |ctx, args| {
                    let path = ctx.entry.file_path(args.str("file_name"));
                    Ok(Outcome::Data(json!(path.display().to_string())))
                },
            )
            .with_doc("The entry directory, or a file inside it (absolute names are returned as-is)."),
        )
        .with(
            Operation::new("get_name", ParamShape::new(), |ctx, _args| {
                Ok(Outcome::Data(json!(ctx.entry.name())))
            })
            .with_doc("The entry name."),
        )
        .with(
            Operation::new(
                "help",
                ParamShape::new().optional("method_name", Value::Null),
                |ctx, args| {
                    let described = match args.str("method_name") {
                        Some(method) => help::describe_method(ctx.registry, ctx.entry, method)?,
                        None => help::describe_entry(ctx.registry, ctx.entry)?,
                    };
                    Ok(Outcome::Data(described))
                },
            )
            .with_doc("Describe the entry, or one of its methods."),
        )
        .with(
            Operation::new("parameters", ParamShape::new(), |ctx, _args| {
                Ok(Outcome::Data(Value::Object(
                    ctx.entry.own_parameters(ctx.registry)?,
                )))
            })
            .with_doc("The entry's own parameters."),
        )
        .with(
            Operation::new("merged_parameters", ParamShape::new(), |ctx, _args| {
                Ok(Outcome::Data(Value::Object(
                    ctx.entry.merged_parameters(ctx.registry)?,
                )))
            })
            .with_doc("Parameters merged along the ancestry chain."),
        )
        .with(
            Operation::new(
                "get_parameter",
                ParamShape::new().required("param_name"),
                |ctx, args| {
                    let name = args.require_str("param_name")?;
                    let value = ctx.entry.get_parameter(ctx.registry, name)?;
                    Ok(Outcome::Data(value.unwrap_or(Value::Null)))
                },
            )
            .with_doc("One parameter from the merged view, or null."),
        )
        .with(
            Operation::new(
                "set_parameter",
                ParamShape::new().required("param_name").required("value"),
                |ctx, args| {
                    let name = args.require_str("param_name")?;
                    let value = args.require("value")?.clone();
                    ctx.entry.set_parameter(ctx.registry, name, value.clone())?;
                    Ok(Outcome::Data(value))
                },
            )
            .with_doc("Set one of the entry's own parameters (in memory)."),
        )
        .with(
            Operation::new(
                "update",
                ParamShape::new().optional("data", json!({})),
                |ctx, args| {
                    let data = match args.get("data") {
                        None | Some(Value::Null) => Default::default(),
                        Some(Value::Object(map)) => map.clone(),
                        Some(_) => return Err(KernelError::failed("'data' must be a map")),
                    };
                    ctx.entry.update_parameters(ctx.registry, &data)?;
                    ctx.entry.persist(ctx.registry)?;
                    Ok(Outcome::Data(Value::Object(
                        ctx.entry.own_parameters(ctx.registry)?,
                    )))
                },
            )
            .with_doc("Merge data into the entry's own parameters and store them."),
        )
}

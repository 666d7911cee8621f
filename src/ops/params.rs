//! CK-013: Parameter echo. `show` returns every parameter it receives.

use crate::core::binder::ParamShape;
use crate::core::types::{Namespace, Operation, Outcome, Value};

pub fn namespace() -> Namespace {
    Namespace::new("params", "Inspect the parameters an operation would receive.").with(
        Operation::new("show", ParamShape::new().extra_named(), |_ctx, args| {
            Ok(Outcome::Data(Value::Object(args.named().clone())))
        })
        .with_doc("Return the received parameters: inherited, own and caller-supplied."),
    )
}

#[cfg(test)]
mod tests {
    use crate::core::config::KernelConfig;
    use crate::core::invoker::invoke;
    use crate::core::registry::Registry;
    use crate::core::types::{Params, Value};
    use serde_json::json;

    #[test]
    fn test_ck013_show_layers() {
        let dir = tempfile::tempdir().unwrap();
        let entry_dir = dir.path().join("params_entry");
        std::fs::create_dir_all(&entry_dir).unwrap();
        std::fs::write(
            entry_dir.join("parameters.json"),
            r#"{"operations": "params", "alpha": 10, "beta": 20}"#,
        )
        .unwrap();
        let reg = Registry::from_config(&KernelConfig::default(), dir.path());
        let e = reg.bypath(&entry_dir);

        let mut caller = Params::new();
        caller.insert("alpha".into(), json!("Hello"));
        caller.insert("delta".into(), json!(420));
        caller.insert("__entry__".into(), json!("spoofed"));
        let shown = invoke(&reg, &e, "show", &[], &caller).unwrap().to_json();

        assert_eq!(
            shown,
            json!({"operations": "params", "alpha": "Hello", "beta": 20, "delta": 420})
        );
        assert!(matches!(shown, Value::Object(ref m) if !m.contains_key("__entry__")));
    }
}

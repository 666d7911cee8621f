//! CK-005: Ancestry resolution for parameter inheritance and method lookup.
//!
//! Walks an entry's parent chain. Merged parameters fold the chain from the
//! root down (each level a shallow overlay, nearer levels win). Operation
//! lookup stops at the first entry whose namespace has the name. Revisiting
//! an entry path is a cycle.

use super::entry::Entry;
use super::error::{KernelError, Result};
use super::registry::Registry;
use super::types::{merge_params, Operation, Params};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::rc::Rc;

/// The receiving entry followed by each resolved parent.
pub fn ancestry(entry: &Rc<Entry>, reg: &Registry) -> Result<Vec<Rc<Entry>>> {
    let mut chain = vec![entry.clone()];
    let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
    seen.insert(entry.path().to_path_buf());

    let mut current = entry.clone();
    while let Some(parent) = current.resolve_parent(reg)? {
        if !seen.insert(parent.path().to_path_buf()) {
            return Err(cycle(&chain, &parent));
        }
        chain.push(parent.clone());
        current = parent;
    }
    Ok(chain)
}

fn cycle(chain: &[Rc<Entry>], revisited: &Entry) -> KernelError {
    let mut names: Vec<String> = chain.iter().map(|e| e.name().to_string()).collect();
    names.push(revisited.name().to_string());
    KernelError::CyclicAncestry { chain: names }
}

/// Own parameters overlaid on the parent's merged parameters, to the root.
pub fn merged_parameters(entry: &Rc<Entry>, reg: &Registry) -> Result<Params> {
    let chain = ancestry(entry, reg)?;
    let mut merged = Params::new();
    for level in chain.iter().rev() {
        let own = level.own_parameters(reg)?;
        merged = merge_params(&merged, &own);
    }
    Ok(merged)
}

/// A located operation.
#[derive(Debug, Clone)]
pub struct Reached {
    pub operation: Rc<Operation>,
    /// The entry whose namespace defines the operation.
    pub owner: Rc<Entry>,
    /// Entry names visited, receiver first, owner last.
    pub ancestry: Vec<String>,
}

/// Find `name` in the entry's namespace, else along its parents.
pub fn reach_operation(entry: &Rc<Entry>, reg: &Registry, name: &str) -> Result<Reached> {
    let mut visited: Vec<String> = Vec::new();
    let mut chain: Vec<Rc<Entry>> = Vec::new();
    let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
    let mut current = entry.clone();

    loop {
        seen.insert(current.path().to_path_buf());
        visited.push(current.name().to_string());
        chain.push(current.clone());

        if let Some(ns) = current.operations(reg)? {
            if let Some(op) = ns.get(name) {
                tracing::debug!(method = name, owner = current.name(), depth = visited.len(), "reached operation");
                return Ok(Reached {
                    operation: op.clone(),
                    owner: current,
                    ancestry: visited,
                });
            }
        }

        match current.resolve_parent(reg)? {
            Some(parent) if seen.contains(parent.path()) => return Err(cycle(&chain, &parent)),
            Some(parent) => current = parent,
            None => {
                return Err(KernelError::OperationNotFound {
                    name: name.to_string(),
                    ancestry: visited,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binder::ParamShape;
    use crate::core::config::KernelConfig;
    use crate::core::storage::{ConfigStore, FsStore};
    use crate::core::types::{Namespace, OperationLoader, Outcome, Value};
    use serde_json::json;
    use std::cell::Cell;
    use std::path::Path;

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    /// working collection with params_entry <- latin <- english.
    fn languages(root: &Path) -> KernelConfig {
        write(
            &root.join("working/parameters.json"),
            r#"{"name_2_path": {"params_entry": "params_entry", "latin": "latin", "english": "english", "a": "a", "b": "b"}}"#,
        );
        write(
            &root.join("working/params_entry/parameters.json"),
            r#"{"alpha": "base", "beta": "base", "gamma": "base"}"#,
        );
        write(
            &root.join("working/latin/parameters.json"),
            r#"{"parent_entry_name": "params_entry", "beta": "lat"}"#,
        );
        write(
            &root.join("working/english/parameters.json"),
            r#"{"parent_entry_name": "latin", "gamma": "eng"}"#,
        );
        write(&root.join("working/a/parameters.json"), r#"{"parent_entry_name": "b"}"#);
        write(&root.join("working/b/parameters.json"), r#"{"parent_entry_name": "a"}"#);

        let mut cfg = KernelConfig::default();
        cfg.collections.truncate(1);
        cfg.collections[0].path = "working".into();
        cfg
    }

    struct Counting {
        loads: Rc<Cell<usize>>,
    }

    impl ConfigStore for Counting {
        fn load_structured(&self, path: &Path, nested: &[String]) -> Result<(Value, bool)> {
            self.loads.set(self.loads.get() + 1);
            FsStore.load_structured(path, nested)
        }

        fn store_structured(&self, value: &Value, path: &Path) -> Result<()> {
            FsStore.store_structured(value, path)
        }
    }

    /// Gives `latin` a `latin_only` and `both`, `english` a `both`.
    struct Languages;

    impl OperationLoader for Languages {
        fn load_operations(&self, entry: &Entry, _reg: &Registry) -> Result<Option<Rc<Namespace>>> {
            let op = |name: &str, tag: &'static str| {
                crate::core::types::Operation::new(name, ParamShape::new(), move |_, _| {
                    Ok(Outcome::Data(json!(tag)))
                })
            };
            let ns = match entry.name() {
                "latin" => Namespace::new("latin", "")
                    .with(op("latin_only", "latin"))
                    .with(op("both", "latin")),
                "english" => Namespace::new("english", "").with(op("both", "english")),
                _ => return Ok(None),
            };
            Ok(Some(Rc::new(ns)))
        }
    }

    #[test]
    fn test_ck005_three_level_merge() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = languages(dir.path());
        let reg = Registry::from_config(&cfg, dir.path());
        let english = reg.byname("english").unwrap().unwrap();
        let merged = merged_parameters(&english, &reg).unwrap();
        assert_eq!(merged["alpha"], json!("base"));
        assert_eq!(merged["beta"], json!("lat"));
        assert_eq!(merged["gamma"], json!("eng"));
        assert_eq!(merged["parent_entry_name"], json!("latin"));

        let names: Vec<String> = ancestry(&english, &reg)
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["english", "latin", "params_entry"]);
    }

    #[test]
    fn test_ck005_parent_resolution_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = languages(dir.path());
        let loads = Rc::new(Cell::new(0));
        let reg = Registry::from_config(&cfg, dir.path()).with_store(Counting {
            loads: loads.clone(),
        });
        let latin = reg.byname("latin").unwrap().unwrap();
        let first = latin.resolve_parent(&reg).unwrap().unwrap();
        let after_first = loads.get();
        let second = latin.resolve_parent(&reg).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(loads.get(), after_first);
    }

    #[test]
    fn test_ck005_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = languages(dir.path());
        let reg = Registry::from_config(&cfg, dir.path());
        let a = reg.byname("a").unwrap().unwrap();
        match merged_parameters(&a, &reg) {
            Err(KernelError::CyclicAncestry { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
        assert!(matches!(
            reach_operation(&a, &reg, "anything"),
            Err(KernelError::CyclicAncestry { .. })
        ));
    }

    #[test]
    fn test_ck005_reach_along_ancestry() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = languages(dir.path());
        let reg = Registry::from_config(&cfg, dir.path()).with_loader(Languages);
        let english = reg.byname("english").unwrap().unwrap();

        let own = reach_operation(&english, &reg, "both").unwrap();
        assert_eq!(own.owner.name(), "english");
        assert_eq!(own.ancestry, vec!["english"]);

        let inherited = reach_operation(&english, &reg, "latin_only").unwrap();
        assert_eq!(inherited.owner.name(), "latin");
        assert_eq!(inherited.ancestry, vec!["english", "latin"]);

        match reach_operation(&english, &reg, "neither") {
            Err(KernelError::OperationNotFound { name, ancestry }) => {
                assert_eq!(name, "neither");
                assert_eq!(ancestry, vec!["english", "latin", "params_entry"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ck005_reach_lone_entry() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::from_config(&KernelConfig::default(), dir.path());
        let lone = Rc::new(Entry::at("/lone").with_parameters(Params::new()));
        match reach_operation(&lone, &reg, "x") {
            Err(KernelError::OperationNotFound { ancestry, .. }) => {
                assert_eq!(ancestry, vec!["lone"])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn small_map() -> impl Strategy<Value = Params> {
            prop::collection::btree_map("[a-e]", 0i64..100, 0..5).prop_map(|m| {
                m.into_iter().map(|(k, v)| (k, json!(v))).collect::<Params>()
            })
        }

        proptest! {
            #[test]
            fn test_ck005_merge_is_parent_then_own(parent in small_map(), own in small_map()) {
                let dir = tempfile::tempdir().unwrap();
                let reg = Registry::from_config(&KernelConfig::default(), dir.path());
                let p = Rc::new(Entry::at("/p").with_parameters(parent.clone()).with_parent(None));
                let c = Rc::new(Entry::at("/c").with_parameters(own.clone()).with_parent(Some(p)));
                let merged = merged_parameters(&c, &reg).unwrap();
                prop_assert_eq!(merged, merge_params(&parent, &own));
                for (k, v) in &own {
                    let got = c.get_parameter(&reg, k).unwrap();
                    prop_assert_eq!(got.as_ref(), Some(v));
                }
            }
        }
    }
}

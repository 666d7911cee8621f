//! CK-008: Executor. Runs parsed pipeline steps against a moving target.
//!
//! State per run: the current target (one entry, or a list of entries while
//! iterating), the label cache, and the sticky iteration flag.
//! Per step: restart → materialize keywords → invoke (once, or per
//! element) → bind label → advance the target. An entry result always
//! becomes the target; a non-empty list of entries does while iterating, and
//! otherwise only when the very next step opens iteration with `{`.

use super::entry::Entry;
use super::error::{KernelError, Result};
use super::invoker::invoke;
use super::parser::{Assignment, PipelineStep, Reference, Restart};
use super::registry::Registry;
use super::storage::kind_of;
use super::types::{insert_path, Outcome, Params, Value};
use indexmap::IndexMap;
use std::rc::Rc;

/// Run-wide execution switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Record failing steps and move on instead of aborting.
    pub continue_on_error: bool,
}

/// A step skipped under `continue_on_error`.
#[derive(Debug)]
pub struct StepFailure {
    pub index: usize,
    pub method: String,
    pub error: KernelError,
}

/// What a pipeline run produced.
#[derive(Debug)]
pub struct Execution {
    /// Result of the final step (`null` if it failed and was skipped).
    pub result: Outcome,
    /// Label → last value bound under it.
    pub cache: IndexMap<String, Outcome>,
    pub failures: Vec<StepFailure>,
}

#[derive(Debug, Clone)]
enum Target {
    One(Rc<Entry>),
    Many(Vec<Rc<Entry>>),
}

struct RunState {
    root: Rc<Entry>,
    current: Target,
    /// Entry list produced outside iteration, adopted by a following `{`.
    pending: Option<Vec<Rc<Entry>>>,
    iterating: bool,
    cache: IndexMap<String, Outcome>,
}

/// Pipeline executor bound to one registry.
pub struct Executor<'r> {
    registry: &'r Registry,
    options: ExecOptions,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: ExecOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute `steps` from the root collection. An empty pipeline runs `help`.
    pub fn run(&self, steps: &[PipelineStep]) -> Result<Execution> {
        let implicit = [PipelineStep::new("help")];
        let steps = if steps.is_empty() { &implicit[..] } else { steps };

        let root = self.registry.working_collection()?;
        let mut state = RunState {
            current: Target::One(root.clone()),
            root,
            pending: None,
            iterating: false,
            cache: IndexMap::new(),
        };
        let mut failures = Vec::new();
        let mut result = Outcome::null();

        for (index, step) in steps.iter().enumerate() {
            let span = tracing::info_span!("step", index, method = %step.method);
            let _enter = span.enter();
            tracing::info!(label = ?step.label, iterating = state.iterating, "executing step");

            match self.run_step(step, &mut state) {
                Ok(outcome) => {
                    if let Some(label) = &step.label {
                        state.cache.insert(label.clone(), outcome.clone());
                    }
                    if let Some(entry) = outcome.as_entry() {
                        state.current = Target::One(entry.clone());
                    } else if let Some(entries) = outcome.entry_list() {
                        if state.iterating {
                            state.current = Target::Many(entries);
                        } else {
                            state.pending = Some(entries);
                        }
                    }
                    result = outcome;
                }
                Err(error) if self.options.continue_on_error && error.is_invocation_failure() => {
                    tracing::warn!(%error, "step failed, continuing");
                    failures.push(StepFailure {
                        index,
                        method: step.method.clone(),
                        error,
                    });
                    result = Outcome::null();
                }
                Err(error) => return Err(error),
            }
        }

        Ok(Execution {
            result,
            cache: state.cache,
            failures,
        })
    }

    fn run_step(&self, step: &PipelineStep, state: &mut RunState) -> Result<Outcome> {
        let pending = state.pending.take();
        match &step.restart {
            Restart::None => {
                if let (true, Some(entries)) = (step.iterate, pending) {
                    state.current = Target::Many(entries);
                }
            }
            Restart::Root => {
                state.current = Target::One(state.root.clone());
                state.iterating = false;
            }
            Restart::Cached(path) => {
                let value = self.lookup(&state.cache, path)?;
                state.current = match (value.as_entry(), value.entry_list()) {
                    (Some(entry), _) => Target::One(entry.clone()),
                    (None, Some(entries)) => Target::Many(entries),
                    (None, None) => {
                        return Err(KernelError::UnresolvedReference {
                            reference: path.join("."),
                            reason: "the cached value is not an entry".to_string(),
                        })
                    }
                };
            }
            Restart::Entry(path) => state.current = Target::One(self.registry.bypath(path)),
        }
        if step.iterate {
            state.iterating = true;
        }

        let named = self.materialize(step, &state.cache)?;

        if state.iterating {
            let targets = match &state.current {
                Target::One(entry) => vec![entry.clone()],
                Target::Many(entries) => entries.clone(),
            };
            let results = targets
                .iter()
                .map(|entry| invoke(self.registry, entry, &step.method, &step.positional, &named))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Outcome::List(results));
        }

        match &state.current {
            Target::One(entry) => invoke(
                self.registry,
                entry,
                &step.method,
                &step.positional,
                &named,
            ),
            Target::Many(entries) => Err(KernelError::Malformed(format!(
                "'{}' needs a single target but the current target is a list of {} entries; iterate with ',{{'",
                step.method,
                entries.len()
            ))),
        }
    }

    /// The step's keyword tree, literals and cache references applied in
    /// command-line order.
    fn materialize(&self, step: &PipelineStep, cache: &IndexMap<String, Outcome>) -> Result<Params> {
        let mut named = Params::new();
        for assignment in &step.assignments {
            match assignment {
                Assignment::Literal { key, value } => {
                    insert_path(&mut named, key, value.clone());
                }
                Assignment::Reference(Reference { target, source }) => {
                    let value = self.lookup(cache, source)?.to_json();
                    if !insert_path(&mut named, target, value) {
                        return Err(KernelError::UnresolvedReference {
                            reference: source.join("."),
                            reason: "only a map can be merged into the keyword root".to_string(),
                        });
                    }
                }
            }
        }
        Ok(named)
    }

    /// Resolve `label.path...` against the cache.
    fn lookup(&self, cache: &IndexMap<String, Outcome>, path: &[String]) -> Result<Outcome> {
        let unresolved = |reason: String| KernelError::UnresolvedReference {
            reference: path.join("."),
            reason,
        };
        let Some((label, rest)) = path.split_first() else {
            return Err(unresolved("empty reference".to_string()));
        };
        let mut node = cache
            .get(label)
            .cloned()
            .ok_or_else(|| unresolved(format!("no result is labelled '{}'", label)))?;

        for key in rest {
            node = match node {
                Outcome::Data(Value::Object(mut map)) => map
                    .remove(key)
                    .map(Outcome::Data)
                    .ok_or_else(|| unresolved(format!("no key '{}'", key)))?,
                Outcome::Data(Value::Array(mut items)) => {
                    let idx = index(key, items.len()).map_err(&unresolved)?;
                    Outcome::Data(items.swap_remove(idx))
                }
                Outcome::List(mut items) => {
                    let idx = index(key, items.len()).map_err(&unresolved)?;
                    items.swap_remove(idx)
                }
                Outcome::Entry(entry) => entry
                    .get_parameter(self.registry, key)?
                    .map(Outcome::Data)
                    .ok_or_else(|| {
                        unresolved(format!("entry '{}' has no parameter '{}'", entry.name(), key))
                    })?,
                Outcome::Data(other) => {
                    return Err(unresolved(format!(
                        "cannot descend into {} with '{}'",
                        kind_of(&other),
                        key
                    )))
                }
            };
        }
        Ok(node)
    }
}

fn index(key: &str, len: usize) -> std::result::Result<usize, String> {
    match key.parse::<usize>() {
        Ok(i) if i < len => Ok(i),
        Ok(i) => Err(format!("index {} out of range ({} items)", i, len)),
        Err(_) => Err(format!("cannot index a list with '{}'", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::KernelConfig;
    use crate::core::parser::parse_pipeline;
    use serde_json::json;
    use std::path::Path;

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    /// A working collection of three entries; `english` inherits from
    /// `latin`, which inherits from `params_entry`.
    fn fixture(root: &Path) -> Registry {
        write(
            &root.join("working/parameters.json"),
            r#"{"operations": "collection", "name_2_path": {"params_entry": "params_entry", "latin": "latin", "english": "english"}}"#,
        );
        write(
            &root.join("working/params_entry/parameters.json"),
            r#"{"operations": "params", "alpha": "base"}"#,
        );
        write(
            &root.join("working/latin/parameters.json"),
            r#"{"parent_entry_name": "params_entry", "beta": "lat"}"#,
        );
        write(
            &root.join("working/english/parameters.json"),
            r#"{"parent_entry_name": "latin", "gamma": "eng"}"#,
        );
        let mut cfg = KernelConfig::default();
        cfg.collections.truncate(1);
        cfg.collections[0].name = "working".into();
        cfg.collections[0].path = "working".into();
        Registry::from_config(&cfg, root)
    }

    fn run(reg: &Registry, line: &str) -> Result<Execution> {
        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        Executor::new(reg).run(&parse_pipeline(&tokens)?)
    }

    #[test]
    fn test_ck008_chain_moves_current() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "byname english , show").unwrap();
        let shown = exec.result.to_json();
        assert_eq!(shown["alpha"], json!("base"));
        assert_eq!(shown["beta"], json!("lat"));
        assert_eq!(shown["gamma"], json!("eng"));
    }

    #[test]
    fn test_ck008_labels_match_direct_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "e: byname english , n: get_name , s: show --delta=4").unwrap();

        let root = reg.working_collection().unwrap();
        let direct_e = invoke(&reg, &root, "byname", &[json!("english")], &Params::new()).unwrap();
        let english = direct_e.as_entry().unwrap().clone();
        let direct_n = invoke(&reg, &english, "get_name", &[], &Params::new()).unwrap();
        let mut delta = Params::new();
        delta.insert("delta".into(), json!(4));
        let direct_s = invoke(&reg, &english, "show", &[], &delta).unwrap();

        assert_eq!(exec.cache["e"], direct_e);
        assert_eq!(exec.cache["n"], direct_n);
        assert_eq!(
            serde_json::to_string(&exec.cache["s"]).unwrap(),
            serde_json::to_string(&direct_s).unwrap()
        );
    }

    #[test]
    fn test_ck008_iteration_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "all_entries ,{ get_name").unwrap();
        assert_eq!(
            exec.result.to_json(),
            json!(["params_entry", "latin", "english"])
        );
    }

    #[test]
    fn test_ck008_iteration_is_sticky_until_root_reset() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "all_entries ,{ get_name , get_path ,, get_name").unwrap();
        assert_eq!(exec.result.to_json(), json!("working"));

        let exec = run(&reg, "all_entries ,{ get_name , get_path").unwrap();
        assert_eq!(exec.result.to_json().as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_ck008_list_target_without_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "all_entries , get_name").unwrap();
        assert_eq!(exec.result.to_json(), json!("working"));

        // Only the step right after the listing may adopt it.
        let exec = run(&reg, "all_entries , get_name ,{ get_name").unwrap();
        assert_eq!(exec.result.to_json(), json!(["working"]));

        assert!(matches!(
            run(&reg, "l: all_entries :l get_name"),
            Err(KernelError::Malformed(_))
        ));
        let exec = run(&reg, "l: all_entries :l{ get_name").unwrap();
        assert_eq!(exec.result.to_json().as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_ck008_keywords_apply_in_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "n: get_name , byname params_entry , show --x:n --x=5").unwrap();
        assert_eq!(exec.result.to_json()["x"], json!(5));

        let exec = run(&reg, "n: get_name , byname params_entry , show --x=5 --x:n").unwrap();
        assert_eq!(exec.result.to_json()["x"], json!("working"));

        let exec = run(
            &reg,
            "wc: working_collection ,, byname params_entry , show --m.latin=0 --m:wc.name_2_path --m.extra=1",
        )
        .unwrap();
        let out = exec.result.to_json();
        let m = &out["m"];
        assert_eq!(m["latin"], json!("latin"));
        assert_eq!(m["extra"], json!(1));
    }

    #[test]
    fn test_ck008_explicit_entry_restart() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let mut jump = PipelineStep::new("show").with_keyword("delta", json!(4));
        jump.restart = Restart::Entry(dir.path().join("working/english"));
        let steps = vec![PipelineStep::new("get_name"), jump, PipelineStep::new("get_name")];

        let exec = Executor::new(&reg).run(&steps).unwrap();
        assert_eq!(exec.result.to_json(), json!("english"));

        let mut shown = steps[1].clone();
        shown.restart = Restart::Entry(dir.path().join("working/./latin/../english"));
        let exec = Executor::new(&reg).run(&[shown]).unwrap();
        let out = exec.result.to_json();
        assert_eq!(out["gamma"], json!("eng"));
        assert_eq!(out["alpha"], json!("base"));
        assert_eq!(out["delta"], json!(4));
    }

    #[test]
    fn test_ck008_references_and_cached_restart() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(
            &reg,
            "wc: working_collection ,, byname params_entry , show --extras.n2p:wc.name_2_path --pen=:wc.operations",
        )
        .unwrap();
        let shown = exec.result.to_json();
        assert_eq!(shown["extras"]["n2p"]["latin"], json!("latin"));
        assert_eq!(shown["pen"], json!("collection"));

        let exec = run(&reg, "l: byname latin ,, byname english , get_name :l get_name").unwrap();
        assert_eq!(exec.result.to_json(), json!("latin"));
    }

    #[test]
    fn test_ck008_merge_reference_into_root() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = run(&reg, "wc: working_collection ,, byname params_entry , show --:wc.name_2_path").unwrap();
        assert_eq!(exec.result.to_json()["english"], json!("english"));

        let err = run(&reg, "n: get_name , byname params_entry , show --:n").unwrap_err();
        assert!(matches!(err, KernelError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_ck008_unresolved_reference() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        match run(&reg, "byname english , show --x:nolabel.y") {
            Err(KernelError::UnresolvedReference { reference, .. }) => {
                assert_eq!(reference, "nolabel.y")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            run(&reg, "n: get_name :n get_name"),
            Err(KernelError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_ck008_empty_pipeline_is_help() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let exec = Executor::new(&reg).run(&[]).unwrap();
        assert_eq!(exec.result.to_json()["entry"], json!("working"));
    }

    #[test]
    fn test_ck008_continue_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let steps = parse_pipeline(&[
            "bad:", "bypath", "--path=nowhere", ",", "update", "--data=5", ",,", "ok:", "get_name",
        ])
        .unwrap();

        let strict = Executor::new(&reg).run(&steps);
        assert!(matches!(strict, Err(KernelError::Invocation { .. })));

        let lenient = Executor::new(&reg)
            .with_options(ExecOptions {
                continue_on_error: true,
            })
            .run(&steps)
            .unwrap();
        assert_eq!(lenient.failures.len(), 1);
        assert_eq!(lenient.failures[0].method, "update");
        assert!(lenient.cache.contains_key("bad"));
        assert_eq!(lenient.cache["ok"].to_json(), json!("working"));
    }

    #[test]
    fn test_ck008_storage_failure_is_skippable() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        std::fs::write(dir.path().join("plainfile"), "not a directory").unwrap();
        let steps = parse_pipeline(&[
            "bypath", "plainfile", ",", "update", "--data.k=1", ",,", "ok:", "get_name",
        ])
        .unwrap();

        match Executor::new(&reg).run(&steps) {
            Err(KernelError::Invocation { method, entry, .. }) => {
                assert_eq!(method, "update");
                assert_eq!(entry, "plainfile");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let lenient = Executor::new(&reg)
            .with_options(ExecOptions {
                continue_on_error: true,
            })
            .run(&steps)
            .unwrap();
        assert_eq!(lenient.failures.len(), 1);
        assert_eq!(lenient.failures[0].index, 1);
        assert!(matches!(lenient.failures[0].error, KernelError::Invocation { .. }));
        assert_eq!(lenient.result.to_json(), json!("working"));
    }

    #[test]
    fn test_ck008_not_found_aborts_even_when_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let reg = fixture(dir.path());
        let err = Executor::new(&reg)
            .with_options(ExecOptions {
                continue_on_error: true,
            })
            .run(&parse_pipeline(&["byname", "english", ",", "neither"]).unwrap())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}

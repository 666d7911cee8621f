//! CK-003: Registry: entry cache, collection search order, conventions.
//!
//! One registry per run. Entries are created on first resolution and cached
//! by path and by name; nothing is evicted. Collection roots are entries too:
//! their parameters carry a `name_2_path` index and an ordered
//! `collections_searchpath` of sub-collections.

use super::config::KernelConfig;
use super::entry::Entry;
use super::error::{KernelError, Result};
use super::storage::{ConfigStore, FsStore};
use super::types::{Namespace, OperationLoader, Value};
use crate::ops;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

/// Collection parameter: entry name → path relative to the collection.
pub const NAME_2_PATH: &str = "name_2_path";
/// Collection parameter: ordered sub-collection names or paths.
pub const SEARCHPATH: &str = "collections_searchpath";

/// Where a structured document lives relative to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub path: Vec<String>,
}

impl Location {
    pub fn file(file: &str) -> Self {
        Self {
            file: file.to_string(),
            path: Vec::new(),
        }
    }
}

/// Shared conventions every entry is read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    pub parameters: Location,
    pub meta: Location,
    pub operations_key: String,
    pub parent_key: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            parameters: Location::file("parameters.json"),
            meta: Location::file("parameters.json"),
            operations_key: "operations".to_string(),
            parent_key: "parent_entry_name".to_string(),
        }
    }
}

pub struct Registry {
    kernel_path: PathBuf,
    roots: Vec<Rc<Entry>>,
    conventions: Conventions,
    store: Box<dyn ConfigStore>,
    loader: Box<dyn OperationLoader>,
    by_path: RefCell<FxHashMap<PathBuf, Rc<Entry>>>,
    by_name: RefCell<FxHashMap<String, Rc<Entry>>>,
    entry_builtins: Rc<Namespace>,
    kernel_builtins: Rc<Namespace>,
}

impl Registry {
    /// Build a registry from a config. Relative collection paths resolve
    /// against `base_dir`.
    pub fn from_config(cfg: &KernelConfig, base_dir: &Path) -> Self {
        let parameters = Location {
            file: cfg.parameters.file.clone(),
            path: cfg.parameters.path.clone(),
        };
        let meta = cfg
            .meta
            .as_ref()
            .map(|m| Location {
                file: m.file.clone(),
                path: m.path.clone(),
            })
            .unwrap_or_else(|| parameters.clone());
        let conventions = Conventions {
            parameters,
            meta,
            operations_key: cfg.operations_key.clone(),
            parent_key: cfg.parent_key.clone(),
        };

        let reg = Self {
            kernel_path: base_dir.to_path_buf(),
            roots: Vec::new(),
            conventions,
            store: Box::new(FsStore),
            loader: Box::new(ops::Catalog::builtin()),
            by_path: RefCell::new(FxHashMap::default()),
            by_name: RefCell::new(FxHashMap::default()),
            entry_builtins: Rc::new(ops::entry::namespace()),
            kernel_builtins: Rc::new(ops::kernel::namespace()),
        };
        let roots = cfg
            .collections
            .iter()
            .map(|c| {
                let root = Rc::new(Entry::at(normalize(&base_dir.join(&c.path))).with_name(&c.name));
                reg.register(root.clone());
                root
            })
            .collect();
        Self { roots, ..reg }
    }

    pub fn with_store(mut self, store: impl ConfigStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_loader(mut self, loader: impl OperationLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    pub fn loader(&self) -> &dyn OperationLoader {
        self.loader.as_ref()
    }

    pub fn entry_builtins(&self) -> &Rc<Namespace> {
        &self.entry_builtins
    }

    pub fn kernel_builtins(&self) -> &Rc<Namespace> {
        &self.kernel_builtins
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// The kernel directory, or a file inside it.
    pub fn kernel_path(&self, file_name: Option<&str>) -> PathBuf {
        match file_name {
            Some(f) => self.kernel_path.join(f),
            None => self.kernel_path.clone(),
        }
    }

    /// Collection roots in search order.
    pub fn collections(&self) -> &[Rc<Entry>] {
        &self.roots
    }

    /// The first configured collection.
    pub fn working_collection(&self) -> Result<Rc<Entry>> {
        self.roots
            .first()
            .cloned()
            .ok_or_else(|| KernelError::Malformed("no collections configured".to_string()))
    }

    /// The entry at `path`, created on first request.
    pub fn bypath(&self, path: impl AsRef<Path>) -> Rc<Entry> {
        let normalized = normalize(path.as_ref());
        let path = normalized.as_path();
        if let Some(e) = self.by_path.borrow().get(path) {
            tracing::debug!(path = %path.display(), "entry cache hit");
            return e.clone();
        }
        let entry = Rc::new(Entry::at(path));
        self.by_path
            .borrow_mut()
            .insert(path.to_path_buf(), entry.clone());
        entry
    }

    /// Cache `entry` under its path and name. Last writer wins.
    pub fn register(&self, entry: Rc<Entry>) {
        self.by_path
            .borrow_mut()
            .insert(entry.path().to_path_buf(), entry.clone());
        self.by_name
            .borrow_mut()
            .insert(entry.name().to_string(), entry);
    }

    /// An entry already known by name, without searching.
    pub fn cached(&self, name: &str) -> Option<Rc<Entry>> {
        self.by_name.borrow().get(name).cloned()
    }

    /// Resolve `name` through the cache, then every collection root in order.
    pub fn byname(&self, name: &str) -> Result<Option<Rc<Entry>>> {
        if let Some(e) = self.cached(name) {
            tracing::debug!(entry = name, "entry cache hit");
            return Ok(Some(e));
        }
        let mut visited = FxHashSet::default();
        for root in &self.roots {
            if let Some(found) = self.byname_in(name, root, &mut visited)? {
                self.by_name
                    .borrow_mut()
                    .insert(name.to_string(), found.clone());
                return Ok(Some(found));
            }
        }
        tracing::debug!(entry = name, "entry not found in any collection");
        Ok(None)
    }

    /// Search one collection: its own index first, then its sub-collections
    /// depth-first. Each collection is visited at most once.
    pub fn byname_in(
        &self,
        name: &str,
        collection: &Rc<Entry>,
        visited: &mut FxHashSet<PathBuf>,
    ) -> Result<Option<Rc<Entry>>> {
        if !visited.insert(collection.path().to_path_buf()) {
            return Ok(None);
        }
        if let Some(found) = self.indexed(collection, name)? {
            tracing::debug!(entry = name, collection = collection.name(), "found in index");
            return Ok(Some(found));
        }

        let searchpath: Vec<String> = collection.with_own_parameters(self, |p| {
            p.get(SEARCHPATH)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        })?;

        for item in searchpath {
            let sub = if item.contains('/') {
                Some(self.bypath(collection.file_path(Some(&item))))
            } else {
                match self.indexed(collection, &item)? {
                    Some(local) => Some(local),
                    None => self.cached(&item),
                }
            };
            match sub {
                Some(sub) => {
                    if let Some(found) = self.byname_in(name, &sub, visited)? {
                        return Ok(Some(found));
                    }
                }
                None => {
                    tracing::debug!(collection = collection.name(), sub = %item, "sub-collection not resolvable")
                }
            }
        }
        Ok(None)
    }

    /// Look `name` up in a collection's `name_2_path` index only.
    pub fn indexed(&self, collection: &Entry, name: &str) -> Result<Option<Rc<Entry>>> {
        let rel = collection.with_own_parameters(self, |p| {
            p.get(NAME_2_PATH)
                .and_then(|m| m.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        })?;
        Ok(rel.map(|r| self.bypath(collection.file_path(Some(&r)))))
    }
}

/// Lexically drop `.` and fold `..` so one directory has one cache key.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

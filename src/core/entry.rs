//! CK-002: Entry, a named, path-identified unit with lazily loaded state.
//!
//! Own parameters, meta, parent and operation namespace are each loaded on
//! first use and memoized. Only own parameters stay mutable afterwards
//! (`set_parameter`, `update_parameters`); the merged view is recomputed on
//! every read by the resolver.

use super::error::{KernelError, Result};
use super::registry::Registry;
use super::resolver;
use super::storage::kind_of;
use super::types::{insert_path, Namespace, Params, Value};
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct Entry {
    path: PathBuf,
    name: String,
    own_parameters: RefCell<Option<Params>>,
    meta: OnceCell<Params>,
    parent: OnceCell<Option<Rc<Entry>>>,
    operations: OnceCell<Option<Rc<Namespace>>>,
}

impl Entry {
    /// An entry rooted at `path`, named after its last path component.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            name,
            own_parameters: RefCell::new(None),
            meta: OnceCell::new(),
            parent: OnceCell::new(),
            operations: OnceCell::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Preload own parameters (skips the storage read).
    pub fn with_parameters(self, params: Params) -> Self {
        *self.own_parameters.borrow_mut() = Some(params);
        self
    }

    /// Preload meta (skips the storage read).
    pub fn with_meta(mut self, meta: Params) -> Self {
        self.meta = OnceCell::from(meta);
        self
    }

    /// Fix the parent up front instead of resolving it from meta.
    pub fn with_parent(mut self, parent: Option<Rc<Entry>>) -> Self {
        self.parent = OnceCell::from(parent);
        self
    }

    /// Fix the operation namespace up front instead of asking the loader.
    pub fn with_operations(mut self, ops: Option<Rc<Namespace>>) -> Self {
        self.operations = OnceCell::from(ops);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry directory, or a file inside it. Absolute names are returned as-is.
    pub fn file_path(&self, file_name: Option<&str>) -> PathBuf {
        match file_name {
            Some(f) if Path::new(f).is_absolute() => PathBuf::from(f),
            Some(f) => self.path.join(f),
            None => self.path.clone(),
        }
    }

    pub fn parameters_loaded(&self) -> bool {
        self.own_parameters.borrow().is_some()
    }

    fn ensure_parameters(&self, reg: &Registry) -> Result<()> {
        if self.parameters_loaded() {
            return Ok(());
        }
        let loc = &reg.conventions().parameters;
        let file = self.file_path(Some(&loc.file));
        let (value, found) = reg.store().load_structured(&file, &loc.path)?;
        let params = match value {
            Value::Object(map) => map,
            other => {
                return Err(KernelError::storage(
                    &file,
                    format!("parameters must be a map, found {}", kind_of(&other)),
                ))
            }
        };
        tracing::debug!(entry = %self.name, found, keys = params.len(), "loaded own parameters");
        *self.own_parameters.borrow_mut() = Some(params);
        Ok(())
    }

    /// A copy of the entry's own parameters, loading them on first use.
    pub fn own_parameters(&self, reg: &Registry) -> Result<Params> {
        self.with_own_parameters(reg, Params::clone)
    }

    /// Borrow own parameters without cloning.
    pub fn with_own_parameters<T>(&self, reg: &Registry, f: impl FnOnce(&Params) -> T) -> Result<T> {
        self.ensure_parameters(reg)?;
        let guard = self.own_parameters.borrow();
        match guard.as_ref() {
            Some(params) => Ok(f(params)),
            None => Err(KernelError::Malformed(format!(
                "parameters of '{}' are not loaded",
                self.name
            ))),
        }
    }

    /// Set one of the entry's own parameters. The parent is never touched.
    pub fn set_parameter(&self, reg: &Registry, name: &str, value: Value) -> Result<()> {
        self.ensure_parameters(reg)?;
        if let Some(params) = self.own_parameters.borrow_mut().as_mut() {
            params.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Overlay `data` onto own parameters.
    pub fn update_parameters(&self, reg: &Registry, data: &Params) -> Result<()> {
        self.ensure_parameters(reg)?;
        if let Some(params) = self.own_parameters.borrow_mut().as_mut() {
            for (k, v) in data {
                params.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    /// Write own parameters back to the parameters document.
    ///
    /// With a nested struct path, the rest of the document is preserved.
    pub fn persist(&self, reg: &Registry) -> Result<()> {
        let own = self.own_parameters(reg)?;
        let loc = &reg.conventions().parameters;
        let file = self.file_path(Some(&loc.file));
        let doc = if loc.path.is_empty() {
            Value::Object(own)
        } else {
            let (whole, _) = reg.store().load_structured(&file, &[])?;
            let mut whole = match whole {
                Value::Object(map) => map,
                _ => Params::new(),
            };
            insert_path(&mut whole, &loc.path, Value::Object(own));
            Value::Object(whole)
        };
        reg.store().store_structured(&doc, &file)
    }

    fn load_meta(&self, reg: &Registry) -> Result<Params> {
        let conv = reg.conventions();
        if conv.meta == conv.parameters {
            return self.own_parameters(reg);
        }
        let file = self.file_path(Some(&conv.meta.file));
        match reg.store().load_structured(&file, &conv.meta.path)? {
            (Value::Object(map), _) => Ok(map),
            (other, _) => Err(KernelError::storage(
                &file,
                format!("meta must be a map, found {}", kind_of(&other)),
            )),
        }
    }

    /// The entry's meta mapping (parent name, operations key).
    pub fn meta(&self, reg: &Registry) -> Result<&Params> {
        if let Some(meta) = self.meta.get() {
            return Ok(meta);
        }
        let loaded = self.load_meta(reg)?;
        Ok(self.meta.get_or_init(|| loaded))
    }

    pub fn meta_value(&self, reg: &Registry, key: &str) -> Result<Option<&Value>> {
        Ok(self.meta(reg)?.get(key))
    }

    /// Resolve the parent named in meta, at most once.
    ///
    /// A reference containing `/` is a path (relative ones resolve against
    /// the directory holding this entry); anything else is an entry name.
    /// A name that does not resolve memoizes as "no parent".
    pub fn resolve_parent(&self, reg: &Registry) -> Result<Option<Rc<Entry>>> {
        if let Some(parent) = self.parent.get() {
            return Ok(parent.clone());
        }

        let key = reg.conventions().parent_key.clone();
        let resolved = match self.meta_value(reg, &key)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) if s.contains('/') => {
                let base = self.path.parent().unwrap_or(&self.path);
                Some(reg.bypath(base.join(s)))
            }
            Some(Value::String(s)) => {
                let s = s.clone();
                match reg.byname(&s)? {
                    Some(parent) => Some(parent),
                    None => {
                        tracing::warn!(entry = %self.name, parent = %s, "parent entry not found");
                        None
                    }
                }
            }
            Some(other) => {
                return Err(KernelError::Malformed(format!(
                    "'{}' of entry '{}' must be a string, found {}",
                    key,
                    self.name,
                    kind_of(other)
                )))
            }
        };
        Ok(self.parent.get_or_init(|| resolved).clone())
    }

    /// The operation namespace of this entry, loaded at most once.
    pub fn operations(&self, reg: &Registry) -> Result<Option<Rc<Namespace>>> {
        if let Some(ops) = self.operations.get() {
            return Ok(ops.clone());
        }
        let loaded = reg.loader().load_operations(self, reg)?;
        tracing::debug!(entry = %self.name, has_code = loaded.is_some(), "loaded operations");
        Ok(self.operations.get_or_init(|| loaded).clone())
    }

    /// Merged parameters along the ancestry chain.
    pub fn merged_parameters(self: &Rc<Self>, reg: &Registry) -> Result<Params> {
        resolver::merged_parameters(self, reg)
    }

    /// A parameter from the merged view; absent is `None`, not an error.
    pub fn get_parameter(self: &Rc<Self>, reg: &Registry, name: &str) -> Result<Option<Value>> {
        Ok(self.merged_parameters(reg)?.remove(name))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("parameters_loaded", &self.parameters_loaded())
            .finish_non_exhaustive()
    }
}

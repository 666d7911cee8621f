//! CK-011: Operation catalog. Namespaces are selected by a key in entry meta.
//!
//! An entry whose meta says `"operations": "collection"` exposes the
//! `collection` namespace. Unknown keys load as "no code" with a warning.

pub mod collection;
pub mod entry;
pub mod help;
pub mod kernel;
pub mod params;

use crate::core::entry::Entry;
use crate::core::error::{KernelError, Result};
use crate::core::registry::Registry;
use crate::core::types::{Namespace, OperationLoader, Value};
use indexmap::IndexMap;
use std::rc::Rc;

/// Static table of operation namespaces, keyed by namespace name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    namespaces: IndexMap<String, Rc<Namespace>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The namespaces shipped with the kernel.
    pub fn builtin() -> Self {
        Self::empty()
            .with(collection::namespace())
            .with(params::namespace())
            .with(help::namespace())
    }

    pub fn with(mut self, ns: Namespace) -> Self {
        self.register(ns);
        self
    }

    /// Add a namespace, replacing one of the same name.
    pub fn register(&mut self, ns: Namespace) {
        self.namespaces.insert(ns.name.clone(), Rc::new(ns));
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Namespace>> {
        self.namespaces.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

impl OperationLoader for Catalog {
    fn load_operations(&self, entry: &Entry, registry: &Registry) -> Result<Option<Rc<Namespace>>> {
        let key = &registry.conventions().operations_key;
        match entry.meta_value(registry, key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(tag)) => match self.namespaces.get(tag) {
                Some(ns) => Ok(Some(ns.clone())),
                None => {
                    tracing::warn!(entry = entry.name(), namespace = %tag, "unknown operations namespace");
                    Ok(None)
                }
            },
            Some(other) => Err(KernelError::Malformed(format!(
                "'{}' of entry '{}' must name a namespace, found {}",
                key,
                entry.name(),
                other
            ))),
        }
    }
}

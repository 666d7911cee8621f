//! CK-001: Shared value types for parameters, outcomes, operations and namespaces.
//!
//! Parameters are JSON-shaped trees (`serde_json` with preserved key order).
//! An operation returns an [`Outcome`]: plain data, an [`Entry`], or an
//! ordered list of outcomes.

use super::binder::{Args, ParamShape};
use super::entry::Entry;
use super::error::Result;
use super::registry::Registry;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::rc::Rc;

/// A parameter value.
pub type Value = serde_json::Value;

/// A parameter mapping (string keys, insertion-ordered).
pub type Params = serde_json::Map<String, Value>;

// ============================================================================
// Outcomes
// ============================================================================

/// The result of invoking an operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Structured data (`null` for "nothing").
    Data(Value),
    /// An entry, which may become the pipeline's next target.
    Entry(Rc<Entry>),
    /// An ordered list of outcomes (iteration results, entry listings).
    List(Vec<Outcome>),
}

impl Outcome {
    pub fn null() -> Self {
        Self::Data(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(Value::Null))
    }

    pub fn as_entry(&self) -> Option<&Rc<Entry>> {
        match self {
            Self::Entry(e) => Some(e),
            _ => None,
        }
    }

    /// The entries of a non-empty list made only of entries.
    pub fn entry_list(&self) -> Option<Vec<Rc<Entry>>> {
        match self {
            Self::List(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_entry().cloned())
                .collect::<Option<Vec<_>>>(),
            _ => None,
        }
    }

    /// Render as plain JSON. Entries become `{"entry": name, "path": path}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Data(v) => v.clone(),
            Self::Entry(e) => entry_json(e),
            Self::List(items) => Value::Array(items.iter().map(Outcome::to_json).collect()),
        }
    }
}

fn entry_json(entry: &Entry) -> Value {
    let mut map = Params::new();
    map.insert("entry".to_string(), Value::String(entry.name().to_string()));
    map.insert(
        "path".to_string(),
        Value::String(entry.path().display().to_string()),
    );
    Value::Object(map)
}

impl From<Value> for Outcome {
    fn from(v: Value) -> Self {
        Self::Data(v)
    }
}

impl From<Rc<Entry>> for Outcome {
    fn from(e: Rc<Entry>) -> Self {
        Self::Entry(e)
    }
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::Entry(a), Self::Entry(b)) => Rc::ptr_eq(a, b) || a.path() == b.path(),
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Data(v) => v.serialize(serializer),
            Self::Entry(e) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("entry", e.name())?;
                map.serialize_entry("path", &e.path().display().to_string())?;
                map.end()
            }
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Everything an operation can see besides its bound arguments.
pub struct CallContext<'a> {
    pub registry: &'a Registry,
    pub entry: &'a Rc<Entry>,
    pub method: &'a str,
}

/// Signature of an operation body.
pub type OpFn = dyn Fn(&CallContext<'_>, &Args<'_>) -> Result<Outcome>;

/// A named callable with an explicit parameter shape.
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub doc: String,
    pub shape: ParamShape,
    func: Rc<OpFn>,
}

impl Operation {
    pub fn new<F>(name: &str, shape: ParamShape, func: F) -> Self
    where
        F: Fn(&CallContext<'_>, &Args<'_>) -> Result<Outcome> + 'static,
    {
        Self {
            name: name.to_string(),
            doc: String::new(),
            shape,
            func: Rc::new(func),
        }
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn call(&self, ctx: &CallContext<'_>, args: &Args<'_>) -> Result<Outcome> {
        (self.func)(ctx, args)
    }

    /// Human-readable signature, e.g. `foo(alpha, beta, delta=4444, **rest)`.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.shape)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// A named set of operations an entry can expose.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub name: String,
    pub doc: String,
    operations: IndexMap<String, Rc<Operation>>,
}

impl Namespace {
    pub fn new(name: &str, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            doc: doc.to_string(),
            operations: IndexMap::new(),
        }
    }

    /// Add an operation, replacing one of the same name.
    pub fn with(mut self, op: Operation) -> Self {
        self.insert(op);
        self
    }

    pub fn insert(&mut self, op: Operation) {
        self.operations.insert(op.name.clone(), Rc::new(op));
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Operation>> {
        self.operations.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }
}

/// Loads the operation namespace associated with an entry.
///
/// Returning `Ok(None)` is normal: an entry may have no code of its own.
pub trait OperationLoader {
    fn load_operations(&self, entry: &Entry, registry: &Registry) -> Result<Option<Rc<Namespace>>>;
}

// ============================================================================
// Parameter tree helpers
// ============================================================================

/// Overlay `over` onto a copy of `under`; `over` wins on key collision.
pub fn merge_params(under: &Params, over: &Params) -> Params {
    let mut merged = under.clone();
    for (k, v) in over {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Set `value` at a dotted key path, vivifying intermediate maps.
///
/// A non-map value found on the way is replaced by a map. An empty path
/// merges `value` (which must be a map) into the root.
pub fn insert_path(tree: &mut Params, path: &[String], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return match value {
            Value::Object(map) => {
                tree.extend(map);
                true
            }
            _ => false,
        };
    };

    let mut node = tree;
    for key in parents {
        let slot = node
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Params::new()));
        if !slot.is_object() {
            *slot = Value::Object(Params::new());
        }
        match slot {
            Value::Object(map) => node = map,
            _ => return false,
        }
    }
    node.insert(last.clone(), value);
    true
}

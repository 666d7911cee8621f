//! CK-004: Argument binding of a loose argument bag to a parameter shape.
//!
//! An operation declares its shape up front (required names, optional names
//! with defaults, whether extra named or positional arguments are accepted).
//! [`bind`] turns a positional list plus a named mapping into a [`BoundCall`]:
//!
//! 1. Required names not covered positionally are taken from the mapping.
//! 2. With `extra_named`, every unconsumed mapping key passes through.
//! 3. Otherwise only declared optional names pass; unknown keys are dropped.
//! 4. Defaults are never synthesized: an optional name without a value is
//!    simply absent, and [`Args::get`] falls back to the declared default.

use super::error::{KernelError, Result};
use super::types::{Params, Value};
use std::fmt;

/// Declared parameters of an operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamShape {
    required: Vec<String>,
    optional: Vec<(String, Value)>,
    extra_named: bool,
    variadic: bool,
}

impl ParamShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.required.push(name.to_string());
        self
    }

    pub fn optional(mut self, name: &str, default: Value) -> Self {
        self.optional.push((name.to_string(), default));
        self
    }

    /// Accept named arguments beyond the declared ones (`**rest`).
    pub fn extra_named(mut self) -> Self {
        self.extra_named = true;
        self
    }

    /// Accept positional arguments beyond the declared ones (`*args`).
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn required_names(&self) -> &[String] {
        &self.required
    }

    pub fn optional_names(&self) -> impl Iterator<Item = &str> {
        self.optional.iter().map(|(n, _)| n.as_str())
    }

    pub fn accepts_extra_named(&self) -> bool {
        self.extra_named
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Number of declared (required + optional) parameters.
    pub fn declared_len(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    /// Declared position of `name`, required names first.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.required
            .iter()
            .position(|n| n == name)
            .or_else(|| {
                self.optional
                    .iter()
                    .position(|(n, _)| n == name)
                    .map(|i| i + self.required.len())
            })
    }

    /// The declared default of an optional parameter.
    pub fn default_of(&self, name: &str) -> Option<&Value> {
        self.optional
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn declared_name(&self, index: usize) -> Option<&str> {
        if index < self.required.len() {
            Some(self.required[index].as_str())
        } else {
            self.optional
                .get(index - self.required.len())
                .map(|(n, _)| n.as_str())
        }
    }
}

impl fmt::Display for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.required.clone();
        for (name, default) in &self.optional {
            parts.push(format!("{}={}", name, default));
        }
        if self.variadic {
            parts.push("*args".to_string());
        }
        if self.extra_named {
            parts.push("**rest".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// A concrete call: values in declared positional order, then named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundCall {
    pub positional: Vec<Value>,
    pub named: Params,
}

/// Bind `positional` and `named` against `shape`.
pub fn bind(
    operation: &str,
    shape: &ParamShape,
    positional: &[Value],
    named: &Params,
) -> Result<BoundCall> {
    if !shape.variadic && positional.len() > shape.declared_len() {
        return Err(KernelError::TooManyArguments {
            operation: operation.to_string(),
            given: positional.len(),
            accepted: shape.declared_len(),
        });
    }

    let covered = positional.len().min(shape.required.len());
    let leftover_required = &shape.required[covered..];

    let missing: Vec<String> = leftover_required
        .iter()
        .filter(|name| !named.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(KernelError::MissingArguments {
            operation: operation.to_string(),
            names: missing,
        });
    }

    let mut bound_positional = positional.to_vec();
    for name in leftover_required {
        if let Some(v) = named.get(name) {
            bound_positional.push(v.clone());
        }
    }

    // Names already given a value positionally never pass again by name.
    let positionally_covered: Vec<&str> = (0..positional.len())
        .filter_map(|i| shape.declared_name(i))
        .collect();

    let mut bound_named = Params::new();
    for (key, value) in named {
        if positionally_covered.contains(&key.as_str())
            || leftover_required.iter().any(|r| r == key)
        {
            continue;
        }
        let declared_optional = shape.optional.iter().any(|(n, _)| n == key);
        if shape.extra_named || declared_optional {
            bound_named.insert(key.clone(), value.clone());
        }
    }

    tracing::trace!(
        operation,
        positional = bound_positional.len(),
        named = bound_named.len(),
        "bound call"
    );

    Ok(BoundCall {
        positional: bound_positional,
        named: bound_named,
    })
}

/// Read access to a bound call, resolving declared defaults lazily.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    shape: &'a ParamShape,
    call: &'a BoundCall,
}

impl<'a> Args<'a> {
    pub fn new(shape: &'a ParamShape, call: &'a BoundCall) -> Self {
        Self { shape, call }
    }

    /// Value bound to `name`: positional slot, then named value, then the
    /// declared default.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        if let Some(i) = self.shape.position_of(name) {
            if let Some(v) = self.call.positional.get(i) {
                return Some(v);
            }
        }
        self.call
            .named
            .get(name)
            .or_else(|| self.shape.default_of(name))
    }

    /// Like [`Args::get`] but fails inside the operation when absent.
    pub fn require(&self, name: &str) -> Result<&'a Value> {
        self.get(name)
            .ok_or_else(|| KernelError::failed(format!("argument '{}' has no value", name)))
    }

    /// A string argument; `null` counts as absent.
    pub fn str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A required string argument.
    pub fn require_str(&self, name: &str) -> Result<&'a str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| KernelError::failed(format!("argument '{}' must be a string", name)))
    }

    /// Named arguments that were actually passed (no defaults).
    pub fn named(&self) -> &'a Params {
        &self.call.named
    }

    /// Positional values beyond the declared parameters.
    pub fn rest(&self) -> &'a [Value] {
        let declared = self.shape.declared_len();
        if self.call.positional.len() > declared {
            &self.call.positional[declared..]
        } else {
            &[]
        }
    }

    /// Every declared parameter with its effective value, followed by the
    /// extra named arguments.
    pub fn to_params(&self) -> Params {
        let mut out = Params::new();
        let names = self
            .shape
            .required
            .iter()
            .map(String::as_str)
            .chain(self.shape.optional_names());
        for name in names {
            if let Some(v) = self.get(name) {
                out.insert(name.to_string(), v.clone());
            }
        }
        for (k, v) in &self.call.named {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
        out
    }
}

//! CK-007: Pipeline tokenizer, flat command-line tokens to ordered steps.
//!
//! ```text
//! pipeline  := step (separator step)*
//! separator := ',' | ',,' | ',{' | ',,{' | ':' label.path ['{']
//! step      := [label ':'] method (positional | keyword)*
//! ```
//!
//! Keywords: `--k=v`, `--k,=a,b` (delimited list), `--k` (true), `--k-`
//! (false), `--k,` / `--k;` (empty list), and the deferred cache references
//! `--k:label.path`, `--k=:label.path`, `--:label.path`. Dotted keys build a
//! nested tree; later assignments override earlier ones.

use super::error::{KernelError, Result};
use super::types::{insert_path, Params, Value};
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::path::PathBuf;

/// Where a step starts from before it is invoked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Restart {
    /// Keep the current target.
    #[default]
    None,
    /// Back to the root collection (also leaves iteration mode).
    Root,
    /// A value from the result cache, by label path.
    Cached(Vec<String>),
    /// An explicit entry path.
    Entry(PathBuf),
}

/// A deferred `target <- cache[source]` assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    /// Keyword path to assign; empty merges into the keyword root.
    pub target: Vec<String>,
    /// Label followed by the path inside the cached value.
    pub source: Vec<String>,
}

/// One keyword token, kept in command-line order.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `--key=value` and the flag forms.
    Literal { key: Vec<String>, value: Value },
    /// A value taken from the result cache at execution time.
    Reference(Reference),
}

/// One parsed pipeline unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub label: Option<String>,
    pub method: String,
    pub positional: Vec<Value>,
    /// Keyword assignments in source order; later ones override earlier ones.
    pub assignments: Vec<Assignment>,
    pub restart: Restart,
    pub iterate: bool,
}

impl PipelineStep {
    pub fn new(method: &str) -> Self {
        Self {
            label: None,
            method: method.to_string(),
            positional: Vec::new(),
            assignments: Vec::new(),
            restart: Restart::None,
            iterate: false,
        }
    }

    pub fn with_keyword(mut self, key: &str, value: Value) -> Self {
        self.assignments.push(Assignment::Literal {
            key: key.split('.').map(str::to_string).collect(),
            value,
        });
        self
    }

    /// The literal keyword tree, references left out.
    pub fn keywords(&self) -> Params {
        let mut tree = Params::new();
        for a in &self.assignments {
            if let Assignment::Literal { key, value } = a {
                insert_path(&mut tree, key, value.clone());
            }
        }
        tree
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.assignments.iter().filter_map(|a| match a {
            Assignment::Reference(r) => Some(r),
            Assignment::Literal { .. } => None,
        })
    }
}

impl Serialize for PipelineStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(label) = &self.label {
            map.serialize_entry("label", label)?;
        }
        map.serialize_entry("method", &self.method)?;
        if !self.positional.is_empty() {
            map.serialize_entry("positional", &self.positional)?;
        }
        let keywords = self.keywords();
        if !keywords.is_empty() {
            map.serialize_entry("keywords", &keywords)?;
        }
        let references: Vec<&Reference> = self.references().collect();
        if !references.is_empty() {
            map.serialize_entry("references", &references)?;
        }
        if self.restart != Restart::None {
            map.serialize_entry("restart", &self.restart)?;
        }
        if self.iterate {
            map.serialize_entry("iterate", &true)?;
        }
        map.end()
    }
}

struct Grammar {
    label: Regex,
    restart: Regex,
    reference: Regex,
    pair: Regex,
    single: Regex,
    ref_value: Regex,
}

impl Grammar {
    fn compile() -> Result<Self> {
        Ok(Self {
            label: Regex::new(r"^(\w+):$")?,
            restart: Regex::new(r"^:([\w.]+)(\{)?$")?,
            reference: Regex::new(r"^--([\w.]*):([\w.]+)$")?,
            pair: Regex::new(r"^--([\w.]+)([ ,;]?)=(.*)$")?,
            single: Regex::new(r"^--([\w.]+)([,;\-]?)$")?,
            ref_value: Regex::new(r"^:([\w.]+)$")?,
        })
    }

    /// `Some((restart, iterate))` if `token` is a separator.
    fn separator(&self, token: &str) -> Result<Option<(Restart, bool)>> {
        let sep = match token {
            "," => (Restart::None, false),
            ",," => (Restart::Root, false),
            ",{" => (Restart::None, true),
            ",,{" => (Restart::Root, true),
            _ => match self.restart.captures(token) {
                Some(caps) => (
                    Restart::Cached(dotted(token, &caps[1])?),
                    caps.get(2).is_some(),
                ),
                None => return Ok(None),
            },
        };
        Ok(Some(sep))
    }

    fn is_separator(&self, token: &str) -> bool {
        matches!(token, "," | ",," | ",{" | ",,{") || self.restart.is_match(token)
    }
}

fn parse_error(token: &str, reason: impl Into<String>) -> KernelError {
    KernelError::Parse {
        token: token.to_string(),
        reason: reason.into(),
    }
}

/// Split a dotted key; empty segments are an error.
fn dotted(token: &str, key: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = key.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(parse_error(token, format!("empty segment in '{}'", key)));
    }
    Ok(segments)
}

/// Integer if it parses as one, else a finite float, else the string itself.
pub fn coerce_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f).filter(|_| f.is_finite()) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn parse_keyword(grammar: &Grammar, token: &str, step: &mut PipelineStep) -> Result<()> {
    if let Some(caps) = grammar.reference.captures(token) {
        let target = if caps[1].is_empty() {
            Vec::new()
        } else {
            dotted(token, &caps[1])?
        };
        step.assignments.push(Assignment::Reference(Reference {
            target,
            source: dotted(token, &caps[2])?,
        }));
        return Ok(());
    }

    if let Some(caps) = grammar.pair.captures(token) {
        let key = dotted(token, &caps[1])?;
        let delimiter = &caps[2];
        let raw = &caps[3];
        if delimiter.is_empty() {
            if let Some(r) = grammar.ref_value.captures(raw) {
                step.assignments.push(Assignment::Reference(Reference {
                    target: key,
                    source: dotted(token, &r[1])?,
                }));
                return Ok(());
            }
        }
        let value = if delimiter.is_empty() {
            coerce_scalar(raw)
        } else if raw.is_empty() {
            Value::Array(Vec::new())
        } else {
            Value::Array(raw.split(delimiter).map(coerce_scalar).collect())
        };
        step.assignments.push(Assignment::Literal { key, value });
        return Ok(());
    }

    if let Some(caps) = grammar.single.captures(token) {
        let key = dotted(token, &caps[1])?;
        let value = match &caps[2] {
            "," | ";" => Value::Array(Vec::new()),
            "-" => Value::Bool(false),
            _ => Value::Bool(true),
        };
        step.assignments.push(Assignment::Literal { key, value });
        return Ok(());
    }

    Err(parse_error(token, "matches no keyword form"))
}

/// Parse a token sequence into pipeline steps.
///
/// No backtracking: the first malformed token aborts with [`KernelError::Parse`].
pub fn parse_pipeline<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<PipelineStep>> {
    let grammar = Grammar::compile()?;
    let tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let (restart, iterate) = match grammar.separator(tokens[i])? {
            Some(sep) => {
                i += 1;
                sep
            }
            None if steps.is_empty() => (Restart::None, false),
            None => return Err(parse_error(tokens[i], "expected a separator")),
        };

        let mut label = None;
        if let Some(caps) = tokens.get(i).and_then(|t| grammar.label.captures(t)) {
            label = Some(caps[1].to_string());
            i += 1;
        }

        let method = match tokens.get(i) {
            None => {
                let last = tokens.last().copied().unwrap_or_default();
                return Err(parse_error(last, "missing method name"));
            }
            Some(t) if grammar.is_separator(t) || t.starts_with("--") => {
                return Err(parse_error(t, "a separator or keyword cannot be a method name"));
            }
            Some(t) => *t,
        };
        i += 1;

        let mut step = PipelineStep::new(method);
        step.label = label;
        step.restart = restart;
        step.iterate = iterate;

        while i < tokens.len() && !grammar.is_separator(tokens[i]) {
            let token = tokens[i];
            if token.starts_with("--") {
                parse_keyword(&grammar, token, &mut step)?;
            } else {
                step.positional.push(coerce_scalar(token));
            }
            i += 1;
        }

        tracing::trace!(method = %step.method, label = ?step.label, "parsed step");
        steps.push(step);
    }

    Ok(steps)
}

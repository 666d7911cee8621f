//! CK-010: Structured document storage (load/store config at a path).
//!
//! JSON is the default format; `.yaml` / `.yml` files go through
//! `serde_yaml_ng`. Writes are atomic: temp file + rename.

use super::error::{KernelError, Result};
use super::types::{Params, Value};
use std::path::Path;

/// Load/store collaborator for entry parameter and meta documents.
pub trait ConfigStore {
    /// Load the document at `path` and descend into `nested`.
    ///
    /// Returns `(value, found)`; a missing file yields `({}, false)`.
    fn load_structured(&self, path: &Path, nested: &[String]) -> Result<(Value, bool)>;

    /// Overwrite the document at `path` with `value`.
    fn store_structured(&self, value: &Value, path: &Path) -> Result<()>;
}

/// Filesystem-backed store.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => Format::Json,
    }
}

impl ConfigStore for FsStore {
    fn load_structured(&self, path: &Path, nested: &[String]) -> Result<(Value, bool)> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no document, using empty map");
            return Ok((Value::Object(Params::new()), false));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::storage(path, format!("cannot read: {}", e)))?;
        let doc: Value = match format_of(path) {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| KernelError::storage(path, format!("JSON parse error: {}", e)))?,
            Format::Yaml => serde_yaml_ng::from_str(&content)
                .map_err(|e| KernelError::storage(path, format!("YAML parse error: {}", e)))?,
        };
        let value = descend(doc, nested).map_err(|reason| KernelError::storage(path, reason))?;
        Ok((value, true))
    }

    fn store_structured(&self, value: &Value, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KernelError::storage(parent, format!("cannot create dir: {}", e))
            })?;
        }

        let text = match format_of(path) {
            Format::Json => to_pretty_json(value)
                .map_err(|e| KernelError::storage(path, format!("serialize error: {}", e)))?,
            Format::Yaml => serde_yaml_ng::to_string(value)
                .map_err(|e| KernelError::storage(path, format!("serialize error: {}", e)))?,
        };

        // Atomic write: temp file + rename
        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, &text)
            .map_err(|e| KernelError::storage(&tmp_path, format!("cannot write: {}", e)))?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            KernelError::storage(
                path,
                format!("cannot rename {} → {}: {}", tmp_path.display(), path.display(), e),
            )
        })?;
        tracing::debug!(path = %path.display(), "stored document");
        Ok(())
    }
}

fn to_pretty_json(value: &Value) -> std::result::Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    serde::Serialize::serialize(value, &mut ser)?;
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    text.push('\n');
    Ok(text)
}

/// Walk `nested` keys into `doc`. Missing map keys descend as empty maps,
/// numeric keys index arrays.
pub fn descend(doc: Value, nested: &[String]) -> std::result::Result<Value, String> {
    let mut node = doc;
    for key in nested {
        node = match node {
            Value::Object(mut map) => map
                .remove(key)
                .unwrap_or_else(|| Value::Object(Params::new())),
            Value::Array(mut items) => {
                let idx: usize = key
                    .parse()
                    .map_err(|_| format!("cannot index a list with '{}'", key))?;
                if idx >= items.len() {
                    return Err(format!("index {} out of range ({} items)", idx, items.len()));
                }
                items.swap_remove(idx)
            }
            other => {
                return Err(format!(
                    "cannot descend into {} with '{}'",
                    kind_of(&other),
                    key
                ))
            }
        };
    }
    Ok(node)
}

pub(crate) fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

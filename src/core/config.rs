//! CK-015: Kernel configuration (`clip.yaml`) parsing and validation.
//!
//! Every field is optional. Without a file the kernel uses two collections
//! (`working_collection`, `core_collection`) under the kernel directory,
//! reads parameters and meta from `parameters.json`, selects operations by
//! the `operations` meta key and parents by `parent_entry_name`.

use super::error::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "clip.yaml";

/// A named collection root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub path: PathBuf,
}

/// A document location relative to an entry directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl Default for LocationSpec {
    fn default() -> Self {
        Self {
            file: "parameters.json".to_string(),
            path: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Collection roots in search order; the first is the working collection.
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionSpec>,

    #[serde(default)]
    pub parameters: LocationSpec,

    /// Meta location; `None` reads meta from the parameters document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<LocationSpec>,

    #[serde(default = "default_operations_key")]
    pub operations_key: String,

    #[serde(default = "default_parent_key")]
    pub parent_key: String,
}

fn default_collections() -> Vec<CollectionSpec> {
    ["working_collection", "core_collection"]
        .iter()
        .map(|name| CollectionSpec {
            name: name.to_string(),
            path: PathBuf::from(name),
        })
        .collect()
}

fn default_operations_key() -> String {
    "operations".to_string()
}

fn default_parent_key() -> String {
    "parent_entry_name".to_string()
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            parameters: LocationSpec::default(),
            meta: None,
            operations_key: default_operations_key(),
            parent_key: default_parent_key(),
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a kernel config from YAML text.
pub fn parse_config(yaml: &str) -> Result<KernelConfig> {
    serde_yaml_ng::from_str(yaml)
        .map_err(|e| KernelError::Malformed(format!("config YAML parse error: {}", e)))
}

/// Parse a kernel config file.
pub fn load_config_file(path: &Path) -> Result<KernelConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| KernelError::storage(path, format!("cannot read: {}", e)))?;
    parse_config(&content)
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &KernelConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.collections.is_empty() {
        errors.push(ValidationError {
            message: "at least one collection is required".to_string(),
        });
    }

    for (i, c) in config.collections.iter().enumerate() {
        if c.name.is_empty() {
            errors.push(ValidationError {
                message: format!("collection #{} has an empty name", i + 1),
            });
        }
        if config.collections[..i].iter().any(|prev| prev.name == c.name) {
            errors.push(ValidationError {
                message: format!("collection '{}' is listed twice", c.name),
            });
        }
    }

    let locations = std::iter::once(("parameters", &config.parameters))
        .chain(config.meta.as_ref().map(|m| ("meta", m)));
    for (what, loc) in locations {
        if loc.file.is_empty() {
            errors.push(ValidationError {
                message: format!("{} file must not be empty", what),
            });
        }
        if loc.path.iter().any(String::is_empty) {
            errors.push(ValidationError {
                message: format!("{} path has an empty segment", what),
            });
        }
    }

    if config.operations_key.is_empty() {
        errors.push(ValidationError {
            message: "operations_key must not be empty".to_string(),
        });
    }
    if config.parent_key.is_empty() {
        errors.push(ValidationError {
            message: "parent_key must not be empty".to_string(),
        });
    }

    errors
}

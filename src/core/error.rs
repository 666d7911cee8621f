//! CK-009: Error taxonomy for resolution, binding, parsing and invocation.
//!
//! Every variant carries enough context to reproduce the failure (entry,
//! method, parameters, ancestry path). The CLI maps variants to exit codes
//! via [`KernelError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = KernelError> = std::result::Result<T, E>;

/// Errors raised by the kernel and by operations it invokes.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A pipeline token matched none of the grammar forms.
    #[error("parse error at '{token}': {reason}")]
    Parse { token: String, reason: String },

    /// A name or path did not resolve to an entry.
    #[error("could not find the entry '{name}'")]
    EntryNotFound { name: String },

    /// The method is missing along the ancestry chain and from every built-in.
    #[error("could not find the method '{name}' along the ancestry path '{}'", ancestry.join(" --> "))]
    OperationNotFound { name: String, ancestry: Vec<String> },

    /// Required parameters could not be satisfied by the argument bag.
    #[error("'{operation}' is missing required arguments: {}", names.join(", "))]
    MissingArguments { operation: String, names: Vec<String> },

    /// More positional values than the operation declares.
    #[error("'{operation}' accepts at most {accepted} positional arguments, got {given}")]
    TooManyArguments {
        operation: String,
        given: usize,
        accepted: usize,
    },

    /// A deferred `:label.path` reference did not resolve against the result cache.
    #[error("unresolved reference ':{reference}': {reason}")]
    UnresolvedReference { reference: String, reason: String },

    /// A parent chain revisits an entry.
    #[error("cyclic ancestry: {}", chain.join(" --> "))]
    CyclicAncestry { chain: Vec<String> },

    /// An operation ran and failed.
    #[error("method '{method}' on entry '{entry}' with parameters {params} failed: {reason}")]
    Invocation {
        method: String,
        entry: String,
        params: String,
        reason: String,
    },

    /// Loading or storing a structured document failed.
    #[error("storage error at {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },

    /// The invocation itself is malformed (no target, bad options, bad config).
    #[error("malformed invocation: {0}")]
    Malformed(String),

    /// Raised from inside an operation body; the invoker rewraps it as [`KernelError::Invocation`].
    #[error("{0}")]
    Failed(String),

    /// A built-in grammar failed to compile.
    #[error("grammar error: {0}")]
    Grammar(#[from] regex::Error),
}

impl KernelError {
    /// Shorthand for an operation-body failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// `2` for not-found, `3` for malformed invocations, `1` for everything
    /// that failed while running.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EntryNotFound { .. } | Self::OperationNotFound { .. } => 2,
            Self::Parse { .. }
            | Self::Malformed(_)
            | Self::MissingArguments { .. }
            | Self::TooManyArguments { .. } => 3,
            _ => 1,
        }
    }

    /// True for failures raised by a running operation (as opposed to
    /// resolution or binding failures).
    pub fn is_invocation_failure(&self) -> bool {
        matches!(self, Self::Invocation { .. } | Self::Failed(_))
    }
}

//! Error types for kubesess
//!
//! Core modules return [`Error`]; the command layer wraps it in `anyhow`.

use std::fmt;
use std::path::PathBuf;

/// Result type for kubesess core operations
pub type Result<T> = std::result::Result<T, Error>;

/// A malformed configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Where in the document the problem is, e.g. `contexts[2].context.cluster`
    pub location: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

impl std::error::Error for ParseError {}

/// Which reference of a context failed to resolve after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReference {
    Cluster(String),
    User(String),
    Both { cluster: String, user: String },
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(name) => write!(f, "cluster '{}' is not defined", name),
            Self::User(name) => write!(f, "user '{}' is not defined", name),
            Self::Both { cluster, user } => write!(
                f,
                "cluster '{}' and user '{}' are not defined",
                cluster, user
            ),
        }
    }
}

/// Errors that can occur in kubesess operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration document could not be parsed
    #[error("Failed to parse {}: {error}", path.display())]
    Parse { path: PathBuf, error: ParseError },

    /// A context references a cluster or user that no document defines
    #[error("Context '{context}' is invalid: {missing}")]
    InvalidReference {
        context: String,
        missing: MissingReference,
    },

    /// A query did not resolve to exactly one target
    #[error("{}", describe_unresolved(query, candidates))]
    AmbiguousOrNotFound {
        query: String,
        candidates: Vec<String>,
    },

    /// A context looked up by exact name does not exist
    #[error("Context '{0}' not found")]
    NotFound(String),

    /// No kubeconfig records a `current-context` to fall back to
    #[error("No kubeconfig records a current-context")]
    NoDefaultContext,

    /// An operation needs an active context but none is selected
    #[error("No context selected.\nHint: Run 'kubesess context <name>' first.")]
    NoContextSelected,

    /// Namespace name that kubernetes would reject
    #[error("Invalid namespace name '{name}': {reason}")]
    InvalidNamespace { name: String, reason: String },

    /// The state directory cannot be created or written
    #[error(
        "State store unavailable at {}: {source}\nHint: Make the directory writable or point KUBESESS_STATE_DIR at a writable location.",
        path.display()
    )]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but cannot be parsed
    #[error("State file {} is corrupt: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// A compare-and-swap lost the race with another invocation
    #[error("State changed concurrently (expected version {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },

    /// The previously selected context vanished from the configuration
    #[error(
        "Active context '{context}' is no longer usable: {reason}\nHint: Select another context with 'kubesess context <name>'."
    )]
    StaleReference { context: String, reason: String },

    /// `init`/`env` was asked for a shell we do not generate code for
    #[error("Unsupported shell '{name}' (supported: bash, zsh, fish, powershell)")]
    UnsupportedShell { name: String },

    /// An interactive picker was dismissed without a choice
    #[error("No {prompt} selected")]
    NoSelection { prompt: &'static str },

    /// Reading a configuration document failed
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_unresolved(query: &str, candidates: &[String]) -> String {
    if candidates.is_empty() {
        format!("No match for '{}'", query)
    } else {
        format!(
            "'{}' is ambiguous, candidates: {}",
            query,
            candidates.join(", ")
        )
    }
}

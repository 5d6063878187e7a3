//! Merging kubeconfig documents into one registry.
//!
//! Documents are applied in order and the last one to define a name wins.
//! Problems in individual documents or contexts never abort the merge: they
//! are collected as [`Diagnostic`]s next to whatever is still usable.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, MissingReference, ParseError, Result};
use crate::kubeconfig::{self, Cluster, Context, Document, User};

/// A candidate document location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub path: PathBuf,
    /// Explicit overrides must exist; search-path entries may be absent
    pub required: bool,
}

impl DocumentSource {
    pub fn search(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }

    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }
}

/// A parsed document together with where it came from
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub document: Document,
}

/// A context after merging, flagged when its references do not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub context: Context,
    pub source: PathBuf,
    pub invalid: Option<MissingReference>,
}

impl ContextEntry {
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }
}

/// A non-fatal problem found while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Parse {
        path: PathBuf,
        error: ParseError,
    },
    InvalidReference {
        context: String,
        source: PathBuf,
        missing: MissingReference,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { path, error } => {
                write!(f, "skipped {}: {}", path.display(), error)
            }
            Self::InvalidReference {
                context,
                source,
                missing,
            } => write!(
                f,
                "context '{}' ({}) is unusable: {}",
                context,
                source.display(),
                missing
            ),
        }
    }
}

/// Union of all loaded documents after precedence resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedRegistry {
    pub clusters: BTreeMap<String, Cluster>,
    pub users: BTreeMap<String, User>,
    pub contexts: BTreeMap<String, ContextEntry>,
    /// `current-context` of the highest-precedence document that has one.
    /// Informational only; the session state is authoritative.
    pub current_context: Option<String>,
    /// Documents that were parsed successfully, in load order
    pub sources: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merge parsed documents, later documents overriding earlier ones.
pub fn merge(documents: Vec<SourceDocument>) -> MergedRegistry {
    let mut merged = MergedRegistry::default();

    for SourceDocument { path, document } in documents {
        for cluster in document.clusters {
            if merged.clusters.contains_key(&cluster.name) {
                debug!(cluster = %cluster.name, source = %path.display(), "cluster overridden");
            }
            merged.clusters.insert(cluster.name.clone(), cluster);
        }
        for user in document.users {
            if merged.users.contains_key(&user.name) {
                debug!(user = %user.name, source = %path.display(), "user overridden");
            }
            merged.users.insert(user.name.clone(), user);
        }
        for context in document.contexts {
            if merged.contexts.contains_key(&context.name) {
                debug!(context = %context.name, source = %path.display(), "context overridden");
            }
            merged.contexts.insert(
                context.name.clone(),
                ContextEntry {
                    context,
                    source: path.clone(),
                    invalid: None,
                },
            );
        }
        if document.current_context.is_some() {
            merged.current_context = document.current_context;
        }
        merged.sources.push(path);
    }

    // References are only checked once every document has been applied, so a
    // context may point at a cluster defined in a different file.
    for entry in merged.contexts.values_mut() {
        let has_cluster = merged.clusters.contains_key(&entry.context.cluster);
        let has_user = merged.users.contains_key(&entry.context.user);
        entry.invalid = match (has_cluster, has_user) {
            (true, true) => None,
            (false, true) => Some(MissingReference::Cluster(entry.context.cluster.clone())),
            (true, false) => Some(MissingReference::User(entry.context.user.clone())),
            (false, false) => Some(MissingReference::Both {
                cluster: entry.context.cluster.clone(),
                user: entry.context.user.clone(),
            }),
        };

        if let Some(missing) = &entry.invalid {
            merged.diagnostics.push(Diagnostic::InvalidReference {
                context: entry.context.name.clone(),
                source: entry.source.clone(),
                missing: missing.clone(),
            });
        }
    }

    merged
}

/// Read, parse and merge documents in precedence order (lowest first).
///
/// Only I/O failures are fatal. Unparseable documents are skipped and
/// reported in [`MergedRegistry::diagnostics`].
pub fn load(sources: &[DocumentSource]) -> Result<MergedRegistry> {
    let mut documents = Vec::new();
    let mut parse_problems = Vec::new();

    for source in sources {
        let bytes = match read_source(source)? {
            Some(bytes) => bytes,
            None => continue,
        };

        match kubeconfig::parse(&bytes) {
            Ok(document) => {
                debug!(
                    path = %source.path.display(),
                    contexts = document.contexts.len(),
                    "loaded kubeconfig"
                );
                documents.push(SourceDocument {
                    path: source.path.clone(),
                    document,
                });
            }
            Err(error) => {
                warn!(path = %source.path.display(), %error, "skipping unparseable kubeconfig");
                parse_problems.push(Diagnostic::Parse {
                    path: source.path.clone(),
                    error,
                });
            }
        }
    }

    let mut merged = merge(documents);
    for diagnostic in &merged.diagnostics {
        warn!("{}", diagnostic);
    }
    parse_problems.append(&mut merged.diagnostics);
    merged.diagnostics = parse_problems;

    Ok(merged)
}

fn read_source(source: &DocumentSource) -> Result<Option<Vec<u8>>> {
    match std::fs::read(&source.path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound && !source.required => {
            debug!(path = %source.path.display(), "kubeconfig not found, skipping");
            Ok(None)
        }
        Err(source_err) => Err(Error::Io {
            path: source.path.clone(),
            source: source_err,
        }),
    }
}

/// Convenience for the single-document case
pub fn load_one(path: &Path) -> Result<MergedRegistry> {
    load(&[DocumentSource::explicit(path)])
}

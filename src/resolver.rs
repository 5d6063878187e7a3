//! Context and namespace selection.
//!
//! Combines the [`Registry`] with the [`StateStore`]. Every query is resolved
//! completely before the state is touched, so a failed lookup never leaves a
//! partial switch behind.

use std::collections::BTreeSet;
use tracing::info;

use crate::error::{Error, Result};
use crate::merge::ContextEntry;
use crate::registry::{Registry, best_tier, rank};
use crate::state::{SessionState, StateStore};

/// Kubernetes limits namespace names to DNS-1123 labels
const MAX_NAMESPACE_LEN: usize = 63;

/// The active selection as recorded in the session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    NoContext,
    ContextSelected {
        context: String,
    },
    ContextAndNamespaceSelected {
        context: String,
        namespace: String,
    },
}

impl Selection {
    pub fn from_state(state: &SessionState) -> Self {
        match (&state.active_context, &state.active_namespace) {
            (None, _) => Self::NoContext,
            (Some(context), None) => Self::ContextSelected {
                context: context.clone(),
            },
            (Some(context), Some(namespace)) => Self::ContextAndNamespaceSelected {
                context: context.clone(),
                namespace: namespace.clone(),
            },
        }
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            Self::NoContext => None,
            Self::ContextSelected { context } | Self::ContextAndNamespaceSelected { context, .. } => {
                Some(context.as_str())
            }
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::ContextAndNamespaceSelected { namespace, .. } => Some(namespace.as_str()),
            _ => None,
        }
    }
}

/// Why a stored selection can no longer be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    pub context: String,
    pub reason: String,
}

impl Staleness {
    pub fn into_error(self) -> Error {
        Error::StaleReference {
            context: self.context,
            reason: self.reason,
        }
    }
}

/// Result of `show_current`
#[derive(Debug, Clone)]
pub struct CurrentReport {
    pub selection: Selection,
    /// Filled in for verbose lookups when the context still exists
    pub entry: Option<ContextEntry>,
    pub stale: Option<Staleness>,
}

/// Everything a completion script or picker needs
#[derive(Debug, Clone)]
pub struct Listing {
    pub contexts: Vec<ContextEntry>,
    pub namespaces: BTreeSet<String>,
    pub selection: Selection,
}

pub struct Resolver<'a> {
    registry: &'a Registry,
    store: &'a StateStore,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry, store: &'a StateStore) -> Self {
        Self { registry, store }
    }

    /// Switch to the context best matching `query`.
    ///
    /// The active namespace becomes the context's default, or is cleared.
    pub fn select_context(&self, query: &str) -> Result<Selection> {
        let entry = self.resolve_context(query)?;
        self.switch_to(entry)
    }

    /// Switch to the `current-context` recorded by the kubeconfig documents.
    ///
    /// The recorded name is used verbatim; it never goes through fuzzy
    /// matching.
    pub fn reset_context(&self) -> Result<Selection> {
        let name = self
            .registry
            .source_current_context()
            .ok_or(Error::NoDefaultContext)?;
        let entry = self.registry.find_context(name)?;
        if let Some(missing) = &entry.invalid {
            return Err(Error::InvalidReference {
                context: entry.context.name.clone(),
                missing: missing.clone(),
            });
        }
        self.switch_to(entry)
    }

    fn switch_to(&self, entry: &ContextEntry) -> Result<Selection> {
        let name = entry.context.name.clone();
        let default_namespace = entry.context.namespace.clone();

        let state = self.store.save(|s| {
            s.active_context = Some(name.clone());
            s.active_namespace = default_namespace.clone();
            if let Some(ns) = &default_namespace {
                s.record_namespace(&name, ns);
            }
        })?;

        info!(context = %name, version = state.version, "context selected");
        Ok(Selection::from_state(&state))
    }

    /// Switch the namespace within the active context
    pub fn select_namespace(&self, query: &str) -> Result<Selection> {
        let (context, state) = self.active_context()?;
        let namespace = self.resolve_namespace(&context, query, &state)?;

        let state = self.store.save(|s| {
            s.active_namespace = Some(namespace.clone());
            s.record_namespace(&context, &namespace);
        })?;

        info!(%context, %namespace, version = state.version, "namespace selected");
        Ok(Selection::from_state(&state))
    }

    /// Restore the active context's own default namespace
    pub fn reset_namespace(&self) -> Result<Selection> {
        let (context, _) = self.active_context()?;
        let default_namespace = self.registry.find_context(&context)?.context.namespace.clone();

        let state = self.store.save(|s| {
            s.active_namespace = default_namespace.clone();
        })?;
        Ok(Selection::from_state(&state))
    }

    /// Read the active selection. `verbose` also checks it is still usable.
    pub fn show_current(&self, verbose: bool) -> Result<CurrentReport> {
        let state = self.store.load()?;
        let selection = Selection::from_state(&state);

        let mut report = CurrentReport {
            selection,
            entry: None,
            stale: None,
        };
        if !verbose {
            return Ok(report);
        }

        if let Some(context) = report.selection.context() {
            match self.registry.find_context(context) {
                Ok(entry) => {
                    if let Some(missing) = &entry.invalid {
                        report.stale = Some(Staleness {
                            context: context.to_string(),
                            reason: missing.to_string(),
                        });
                    }
                    report.entry = Some(entry.clone());
                }
                Err(_) => {
                    report.stale = Some(Staleness {
                        context: context.to_string(),
                        reason: "it is no longer defined in any kubeconfig".to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// All contexts plus the namespaces known for the active one
    pub fn list_all(&self) -> Result<Listing> {
        let state = self.store.load()?;
        let selection = Selection::from_state(&state);
        let namespaces = selection
            .context()
            .map(|ctx| self.registry.list_namespaces(ctx, &state))
            .unwrap_or_default();

        Ok(Listing {
            contexts: self.registry.list_contexts().into_iter().cloned().collect(),
            namespaces,
            selection,
        })
    }

    /// Namespaces known for `context`, or for the active context
    pub fn namespaces_for(&self, context: Option<&str>) -> Result<BTreeSet<String>> {
        let state = self.store.load()?;
        let context = match context {
            Some(ctx) => ctx.to_string(),
            None => match state.active_context.clone() {
                Some(ctx) => ctx,
                None => return Ok(BTreeSet::new()),
            },
        };
        Ok(self.registry.list_namespaces(&context, &state))
    }

    fn resolve_context(&self, query: &str) -> Result<&'a ContextEntry> {
        let query = query.trim();

        // Exact names short-circuit fuzzy matching
        if let Ok(entry) = self.registry.find_context(query) {
            return match &entry.invalid {
                None => Ok(entry),
                Some(missing) => Err(Error::InvalidReference {
                    context: entry.context.name.clone(),
                    missing: missing.clone(),
                }),
            };
        }

        let candidates: Vec<_> = self
            .registry
            .fuzzy_candidates(query)
            .into_iter()
            .filter(|c| {
                self.registry
                    .find_context(&c.name)
                    .map(|e| e.is_valid())
                    .unwrap_or(false)
            })
            .collect();

        match best_tier(&candidates) {
            [only] => self.registry.find_context(&only.name),
            best => Err(Error::AmbiguousOrNotFound {
                query: query.to_string(),
                candidates: best.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    fn resolve_namespace(&self, context: &str, query: &str, state: &SessionState) -> Result<String> {
        let query = query.trim();
        let known = self.registry.list_namespaces(context, state);
        if known.contains(query) {
            return Ok(query.to_string());
        }

        let candidates = rank(query, known.iter().map(String::as_str));
        match best_tier(&candidates) {
            [only] => Ok(only.name.clone()),
            [] => {
                // Namespaces are not checked against a live cluster, so an
                // unknown but well-formed name is taken as given.
                validate_namespace_name(query)?;
                Ok(query.to_string())
            }
            best => Err(Error::AmbiguousOrNotFound {
                query: query.to_string(),
                candidates: best.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    /// The active context, checked against the registry
    fn active_context(&self) -> Result<(String, SessionState)> {
        let state = self.store.load()?;
        let context = state.active_context.clone().ok_or(Error::NoContextSelected)?;

        match self.registry.find_context(&context) {
            Ok(entry) if entry.is_valid() => Ok((context, state)),
            Ok(entry) => Err(Error::StaleReference {
                reason: entry
                    .invalid
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                context,
            }),
            Err(_) => Err(Error::StaleReference {
                context,
                reason: "it is no longer defined in any kubeconfig".to_string(),
            }),
        }
    }
}

/// Check `name` is a DNS-1123 label
pub fn validate_namespace_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidNamespace {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > MAX_NAMESPACE_LEN {
        return Err(invalid("name cannot be longer than 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "only lowercase letters, digits and '-' are allowed",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("name must start and end with a letter or digit"));
    }
    Ok(())
}

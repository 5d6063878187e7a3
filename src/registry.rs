//! Read-only lookups over a [`MergedRegistry`].
//!
//! Built once per invocation; nothing here touches the filesystem.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::kubeconfig::{Cluster, User};
use crate::merge::{ContextEntry, MergedRegistry};
use crate::state::SessionState;

/// Namespace every cluster has
pub const DEFAULT_NAMESPACE: &str = "default";

/// How well a candidate matched a query. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    CaseInsensitiveExact,
    Substring,
    Prefix,
    CaseInsensitiveSubstring,
}

/// A fuzzy-match candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub kind: MatchKind,
}

/// Score `name` against `query`.
///
/// Tiers: exact, case-insensitive exact, substring (case-sensitive, so prefix
/// hits land here too), case-insensitive prefix, case-insensitive substring.
pub fn score(query: &str, name: &str) -> Option<MatchKind> {
    if query.is_empty() {
        return None;
    }
    if name == query {
        return Some(MatchKind::Exact);
    }

    let lower_name = name.to_lowercase();
    let lower_query = query.to_lowercase();

    if lower_name == lower_query {
        Some(MatchKind::CaseInsensitiveExact)
    } else if name.contains(query) {
        Some(MatchKind::Substring)
    } else if lower_name.starts_with(&lower_query) {
        Some(MatchKind::Prefix)
    } else if lower_name.contains(&lower_query) {
        Some(MatchKind::CaseInsensitiveSubstring)
    } else {
        None
    }
}

/// Rank `names` against `query`: best tier first, ties in lexical order.
pub fn rank<'a, I>(query: &str, names: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidates: Vec<Candidate> = names
        .into_iter()
        .filter_map(|name| {
            score(query, name).map(|kind| Candidate {
                name: name.to_string(),
                kind,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    candidates.dedup_by(|a, b| a.name == b.name);
    candidates
}

/// The candidates sharing the best score, or all of them if none.
pub fn best_tier(candidates: &[Candidate]) -> &[Candidate] {
    match candidates.first() {
        Some(top) => {
            let end = candidates
                .iter()
                .position(|c| c.kind != top.kind)
                .unwrap_or(candidates.len());
            &candidates[..end]
        }
        None => candidates,
    }
}

/// Lookup layer over the merged configuration
#[derive(Debug, Clone)]
pub struct Registry {
    merged: MergedRegistry,
}

impl Registry {
    pub fn new(merged: MergedRegistry) -> Self {
        Self { merged }
    }

    /// All contexts, valid or not, sorted by name
    pub fn list_contexts(&self) -> Vec<&ContextEntry> {
        self.merged.contexts.values().collect()
    }

    /// Contexts that can be switched to
    pub fn valid_contexts(&self) -> Vec<&ContextEntry> {
        self.merged.contexts.values().filter(|c| c.is_valid()).collect()
    }

    pub fn find_context(&self, name: &str) -> Result<&ContextEntry> {
        self.merged
            .contexts
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.merged.clusters.get(name)
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.merged.users.get(name)
    }

    /// Context names matching `query`, best first. Deterministic for a fixed
    /// registry and query.
    pub fn fuzzy_match(&self, query: &str) -> Vec<String> {
        self.fuzzy_candidates(query)
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    pub fn fuzzy_candidates(&self, query: &str) -> Vec<Candidate> {
        rank(query, self.merged.contexts.keys().map(String::as_str))
    }

    /// Known namespaces for a context: `default`, the context's own
    /// namespace, and those recorded in the session history. No cluster is
    /// queried.
    pub fn list_namespaces(&self, context: &str, state: &SessionState) -> BTreeSet<String> {
        let mut namespaces = state.seen_namespaces(context);
        if let Some(entry) = self.merged.contexts.get(context) {
            namespaces.insert(DEFAULT_NAMESPACE.to_string());
            if let Some(ns) = &entry.context.namespace {
                namespaces.insert(ns.clone());
            }
        }
        namespaces
    }

    /// `current-context` recorded by the source documents
    pub fn source_current_context(&self) -> Option<&str> {
        self.merged.current_context.as_deref()
    }

    /// Documents that contributed to the merge, lowest precedence first
    pub fn sources(&self) -> &[std::path::PathBuf] {
        &self.merged.sources
    }
}

use anyhow::{Context, Result};
use directories::BaseDirs;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::merge::DocumentSource;

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "KUBESESS_STATE_DIR";

/// All computed paths used by kubesess
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.kube
    pub kube_dir: PathBuf,
    /// ~/.kube/kubesess, or $KUBESESS_STATE_DIR
    pub state_dir: PathBuf,
    /// <state_dir>/state.json
    pub state_file: PathBuf,
    /// $KUBECONFIG entries in the order given, or ~/.kube/config
    pub kubeconfig_search: Vec<PathBuf>,
    /// --kubeconfig arguments
    pub overrides: Vec<PathBuf>,
}

impl Paths {
    pub fn new(overrides: Vec<PathBuf>) -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let state_dir = std::env::var_os(STATE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self::from_parts(
            base_dirs.home_dir(),
            std::env::var_os("KUBECONFIG"),
            state_dir,
            overrides,
        ))
    }

    /// Build paths from explicit inputs instead of the process environment
    pub fn from_parts(
        home: &Path,
        kubeconfig_env: Option<OsString>,
        state_dir: Option<PathBuf>,
        overrides: Vec<PathBuf>,
    ) -> Self {
        let kube_dir = home.join(".kube");
        let state_dir = state_dir.unwrap_or_else(|| kube_dir.join("kubesess"));
        let state_file = state_dir.join("state.json");

        let mut kubeconfig_search: Vec<PathBuf> = kubeconfig_env
            .as_deref()
            .map(|value| {
                std::env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if kubeconfig_search.is_empty() {
            kubeconfig_search.push(kube_dir.join("config"));
        }

        Self {
            kube_dir,
            state_dir,
            state_file,
            kubeconfig_search,
            overrides,
        }
    }

    /// Sidecar file used to serialise state writers
    pub fn lock_file(&self) -> PathBuf {
        self.state_file.with_extension("json.lock")
    }

    /// Every candidate document, lowest precedence first.
    ///
    /// Loose `*.yaml`/`*.yml` files in ~/.kube come first, then $KUBECONFIG
    /// reversed (kubectl lets its first entry win), then explicit overrides.
    pub fn document_sources(&self) -> Vec<DocumentSource> {
        let mut sources: Vec<DocumentSource> = self
            .loose_kube_files()
            .into_iter()
            .map(DocumentSource::search)
            .collect();
        sources.extend(
            self.kubeconfig_search
                .iter()
                .rev()
                .cloned()
                .map(DocumentSource::search),
        );
        sources.extend(self.overrides.iter().cloned().map(DocumentSource::explicit));

        // A path listed twice is loaded once, at its highest precedence.
        let mut seen = HashSet::new();
        let mut deduped: Vec<DocumentSource> = sources
            .into_iter()
            .rev()
            .filter(|s| seen.insert(s.path.clone()))
            .collect();
        deduped.reverse();
        deduped
    }

    fn loose_kube_files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.kube_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.kube_dir.display(), error = %e, "not scanning kube dir");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_paths(paths: &Paths) -> Vec<PathBuf> {
        paths
            .document_sources()
            .into_iter()
            .map(|s| s.path)
            .collect()
    }

    #[test]
    fn test_default_search_path() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::from_parts(temp_dir.path(), None, None, Vec::new());

        assert_eq!(paths.kubeconfig_search, vec![temp_dir.path().join(".kube/config")]);
        assert!(paths.state_file.ends_with(".kube/kubesess/state.json"));
        assert!(paths.lock_file().ends_with(".kube/kubesess/state.json.lock"));
    }

    #[test]
    fn test_empty_kubeconfig_env_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::from_parts(temp_dir.path(), Some(OsString::new()), None, Vec::new());
        assert_eq!(paths.kubeconfig_search.len(), 1);
    }

    #[test]
    fn test_state_dir_override() {
        let temp_dir = TempDir::new().unwrap();
        let state = temp_dir.path().join("elsewhere");
        let paths = Paths::from_parts(temp_dir.path(), None, Some(state.clone()), Vec::new());
        assert_eq!(paths.state_file, state.join("state.json"));
    }

    #[test]
    fn test_document_source_order() {
        let temp_dir = TempDir::new().unwrap();
        let kube_dir = temp_dir.path().join(".kube");
        std::fs::create_dir_all(&kube_dir).unwrap();
        std::fs::write(kube_dir.join("b.yaml"), "").unwrap();
        std::fs::write(kube_dir.join("a.yml"), "").unwrap();
        std::fs::write(kube_dir.join("notes.txt"), "").unwrap();

        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        let explicit = temp_dir.path().join("explicit");
        let env = std::env::join_paths([&first, &second]).unwrap();

        let paths = Paths::from_parts(temp_dir.path(), Some(env), None, vec![explicit.clone()]);
        let sources = paths.document_sources();

        assert_eq!(
            sources.iter().map(|s| s.path.clone()).collect::<Vec<_>>(),
            vec![
                kube_dir.join("a.yml"),
                kube_dir.join("b.yaml"),
                second,
                first,
                explicit,
            ]
        );
        assert!(sources.last().unwrap().required);
        assert!(!sources[0].required);
    }

    #[test]
    fn test_duplicates_keep_highest_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("config");
        let other = temp_dir.path().join("other");
        let env = std::env::join_paths([&config, &other]).unwrap();

        let paths = Paths::from_parts(temp_dir.path(), Some(env), None, vec![config.clone()]);
        assert_eq!(source_paths(&paths), vec![other, config]);
    }
}

//! Test utilities shared across test modules
//!
//! Fixtures for kubeconfig documents and a `Paths` rooted in a temp directory.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::paths::Paths;

/// Single-cluster document as written by Docker Desktop
pub const DOCKER_DESKTOP: &str = r#"
apiVersion: v1
clusters:
- cluster:
    server: https://kubernetes.docker.internal:6443
  name: docker-desktop
contexts:
- context:
    cluster: docker-desktop
    namespace: monitoring
    user: docker-desktop
  name: docker-desktop
current-context: docker-desktop
kind: Config
preferences: {}
users:
- name: docker-desktop
"#;

/// Build a one-context kubeconfig document
pub fn kubeconfig_doc(
    context: &str,
    cluster: &str,
    user: &str,
    current_context: Option<&str>,
) -> String {
    let current = current_context
        .map(|c| format!("current-context: {}\n", c))
        .unwrap_or_default();
    format!(
        "apiVersion: v1\nkind: Config\n{current}clusters:\n- name: {cluster}\n  cluster:\n    server: https://{cluster}.example.com:6443\ncontexts:\n- name: {context}\n  context:\n    cluster: {cluster}\n    user: {user}\nusers:\n- name: {user}\n  user:\n    token: secret\n"
    )
}

/// Document with several contexts sharing one cluster and user
pub fn multi_context_doc(contexts: &[(&str, Option<&str>)]) -> String {
    let mut doc = String::from(
        "clusters:\n- name: shared\n  cluster:\n    server: https://shared:6443\nusers:\n- name: me\n  user:\n    token: t\ncontexts:\n",
    );
    for (name, namespace) in contexts {
        doc.push_str(&format!(
            "- name: {}\n  context:\n    cluster: shared\n    user: me\n",
            name
        ));
        if let Some(ns) = namespace {
            doc.push_str(&format!("    namespace: {}\n", ns));
        }
    }
    doc
}

pub fn write_file(temp_dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = temp_dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Create a Paths struct for testing using a temporary directory
///
/// `kubeconfig` entries become the KUBECONFIG search path.
pub fn setup_test_paths(temp_dir: &TempDir, kubeconfig: &[PathBuf]) -> Paths {
    let home = temp_dir.path().to_path_buf();
    Paths::from_parts(
        &home,
        Some(std::env::join_paths(kubeconfig).unwrap()),
        Some(home.join("state")),
        Vec::new(),
    )
}

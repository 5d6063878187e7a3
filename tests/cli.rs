//! Integration tests for the kubesess binary.
//!
//! Every command runs against a temporary HOME, KUBECONFIG and state
//! directory so nothing touches the real ~/.kube.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tempfile::{TempDir, tempdir};

const DOCKER_DESKTOP: &str = r#"
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
  user:
    client-certificate-data: REDACTED
    client-key-data: REDACTED
"#;

/// Contexts on one shared cluster/user, no current-context
fn contexts_doc(names: &[&str]) -> String {
    let mut doc = String::from(
        "clusters:\n- name: shared\n  cluster:\n    server: https://shared:6443\nusers:\n- name: me\n  user:\n    token: t\ncontexts:\n",
    );
    for name in names {
        doc.push_str(&format!(
            "- name: {}\n  context:\n    cluster: shared\n    user: me\n",
            name
        ));
    }
    doc
}

fn single_context_doc(context: &str, cluster: &str) -> String {
    format!(
        "clusters:\n- name: {cluster}\n  cluster:\n    server: https://{cluster}:6443\nusers:\n- name: me\n  user:\n    token: t\ncontexts:\n- name: {context}\n  context:\n    cluster: {cluster}\n    user: me\n"
    )
}

/// Temporary home with kubeconfig files on the KUBECONFIG path
struct Env {
    home: TempDir,
    kubeconfig: Vec<PathBuf>,
}

impl Env {
    fn new(documents: &[(&str, &str)]) -> Self {
        let home = tempdir().unwrap();
        let kubeconfig = documents
            .iter()
            .map(|(name, content)| {
                let path = home.path().join(name);
                fs::write(&path, content).unwrap();
                path
            })
            .collect();
        Self { home, kubeconfig }
    }

    fn state_dir(&self) -> PathBuf {
        self.home.path().join("state")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.home.path().join(name)
    }

    /// `program` with this environment and the kubesess binary on PATH
    fn process(&self, program: impl AsRef<std::ffi::OsStr>) -> process::Command {
        let bin_dir = kubesess_bin().parent().unwrap().to_path_buf();
        let path = std::env::var_os("PATH").unwrap_or_default();
        let search = std::iter::once(bin_dir).chain(std::env::split_paths(&path));

        let mut cmd = process::Command::new(program);
        cmd.env("HOME", self.home.path())
            .env("KUBECONFIG", std::env::join_paths(&self.kubeconfig).unwrap())
            .env("KUBESESS_STATE_DIR", self.state_dir())
            .env("PATH", std::env::join_paths(search).unwrap())
            .env("NO_COLOR", "1")
            .env_remove("KUBESESS_LOG")
            .env_remove("KUBESESS_CONTEXT")
            .env_remove("KUBESESS_NAMESPACE");
        cmd
    }

    fn cmd(&self) -> Command {
        Command::from_std(self.process(kubesess_bin()))
    }
}

fn kubesess_bin() -> &'static Path {
    assert_cmd::cargo::cargo_bin!("kubesess")
}

fn has_bash() -> bool {
    process::Command::new("bash")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn state_json(dir: &Path) -> serde_json::Value {
    let content = fs::read_to_string(dir.join("state.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_output() {
    Env::new(&[])
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace"))
        .stdout(predicate::str::contains("init"));
}

// ============================================================================
// Context switching
// ============================================================================

#[test]
fn test_verbose_context_switch() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd()
        .args(["context", "-v", "docker-desktop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docker-desktop"))
        .stdout(predicate::str::contains("kubernetes.docker.internal"));

    let state = state_json(&env.state_dir());
    assert_eq!(state["active_context"], "docker-desktop");
    assert_eq!(state["active_namespace"], "monitoring");
    assert_eq!(state["version"], 1);
}

#[test]
fn test_fuzzy_context_switch() {
    let env = Env::new(&[("config", &contexts_doc(&["dev", "prod-eu"]))]);
    env.cmd()
        .args(["context", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prod-eu"));

    env.cmd()
        .arg("context")
        .assert()
        .success()
        .stdout("prod-eu\n");
}

#[test]
fn test_ambiguous_context_leaves_state_untouched() {
    let env = Env::new(&[(
        "config",
        &contexts_doc(&["staging-east", "staging-west"]),
    )]);
    env.cmd()
        .args(["context", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ambiguous"))
        .stderr(predicate::str::contains("staging-east"));

    assert!(!env.state_dir().join("state.json").exists());
}

#[test]
fn test_unknown_context_fails() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd()
        .args(["context", "minikube"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No match for 'minikube'"));
}

#[test]
fn test_context_default_uses_current_context() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd()
        .args(["context", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docker-desktop"));

    let env = Env::new(&[("config", &contexts_doc(&["dev"]))]);
    env.cmd()
        .args(["context", "--default"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("current-context"));
}

#[test]
fn test_context_default_needs_exact_name() {
    let doc = format!("current-context: prod\n{}", contexts_doc(&["prod-eu"]));
    let env = Env::new(&[("config", &doc)]);
    env.cmd()
        .args(["context", "--default"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Context 'prod' not found"));

    assert!(!env.state_dir().join("state.json").exists());
}

// ============================================================================
// Namespaces and env
// ============================================================================

#[test]
fn test_namespace_requires_context() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd()
        .args(["namespace", "kube-system"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No context selected"));
}

#[test]
fn test_namespace_switch_and_env() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd().args(["context", "docker-desktop"]).assert().success();
    env.cmd()
        .args(["namespace", "kube-system"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kube-system"));

    env.cmd()
        .args(["env", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "export KUBESESS_CONTEXT='docker-desktop'",
        ))
        .stdout(predicate::str::contains(
            "export KUBESESS_NAMESPACE='kube-system'",
        ));

    // Both the default and the one we used are now known
    env.cmd()
        .args(["list", "namespaces"])
        .assert()
        .success()
        .stdout(predicate::str::contains("monitoring"))
        .stdout(predicate::str::contains("kube-system"));

    env.cmd()
        .args(["namespace", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("monitoring"));
}

#[test]
fn test_default_namespace_not_rewritten() {
    let doc = "clusters:\n- name: shared\n  cluster:\n    server: https://shared:6443\nusers:\n- name: me\n  user:\n    token: t\ncontexts:\n- name: dev\n  context:\n    cluster: shared\n    user: me\n    namespace: default-apps\n";
    let env = Env::new(&[("config", doc)]);
    env.cmd().args(["context", "dev"]).assert().success();
    env.cmd()
        .args(["namespace", "default"])
        .assert()
        .success()
        .stdout("default\n");

    assert_eq!(state_json(&env.state_dir())["active_namespace"], "default");
}

#[test]
fn test_env_warns_about_stale_context() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd().args(["context", "docker-desktop"]).assert().success();

    // The context disappears from the kubeconfig afterwards
    fs::write(env.path("config"), contexts_doc(&["dev"])).unwrap();

    env.cmd()
        .args(["env", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "export KUBESESS_CONTEXT='docker-desktop'",
        ))
        .stderr(predicate::str::contains("no longer usable"));
}

#[test]
fn test_invalid_namespace_rejected() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd().args(["context", "docker-desktop"]).assert().success();
    env.cmd()
        .args(["namespace", "Not_Valid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid namespace"));
}

#[test]
fn test_env_without_selection_unsets() {
    let env = Env::new(&[]);
    env.cmd()
        .args(["env", "fish"])
        .assert()
        .success()
        .stdout("set -e KUBESESS_CONTEXT\nset -e KUBESESS_NAMESPACE\n");
}

// ============================================================================
// Shell integration
// ============================================================================

#[test]
fn test_init_supported_shells() {
    let env = Env::new(&[]);
    for shell in ["bash", "zsh", "fish", "powershell"] {
        env.cmd()
            .args(["init", shell])
            .assert()
            .success()
            .stdout(predicate::str::contains("kubesess env"));
    }
    env.cmd()
        .args(["init", "powershell"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Register-ArgumentCompleter"));
}

#[test]
fn test_init_unsupported_shell() {
    Env::new(&[])
        .cmd()
        .args(["init", "cobol"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Unsupported shell"));
}

#[test]
fn test_bash_integration_round_trip() {
    if !has_bash() {
        return;
    }
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    let init = env.path("init.bash");
    fs::write(&init, &env.cmd().args(["init", "bash"]).output().unwrap().stdout).unwrap();

    let status = env.process("bash").arg("-n").arg(&init).status().unwrap();
    assert!(status.success(), "init bash does not parse");

    let script = r#"
source "$1"
kc docker-desktop >/dev/null || exit 10
echo "ctx=$KUBESESS_CONTEXT ns=$KUBESESS_NAMESPACE"
kn kube-system >/dev/null || exit 11
echo "ns=$KUBESESS_NAMESPACE"
kc minikube 2>/dev/null
echo "miss=$? ctx=$KUBESESS_CONTEXT"
kcd extra 2>/dev/null
echo "kcd=$?"
"#;
    let output = env
        .process("bash")
        .arg("-c")
        .arg(script)
        .arg("bash")
        .arg(&init)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ctx=docker-desktop ns=monitoring"), "{}", stdout);
    assert!(stdout.contains("ns=kube-system"), "{}", stdout);
    assert!(stdout.contains("miss=1 ctx=docker-desktop"), "{}", stdout);
    assert!(stdout.contains("kcd=2"), "{}", stdout);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_processes_never_tear_state() {
    let env = Env::new(&[("config", &contexts_doc(&["blue", "green"]))]);
    let rounds = 20;

    for _ in 0..rounds {
        let children: Vec<_> = ["blue", "green"]
            .iter()
            .map(|name| {
                env.process(kubesess_bin())
                    .args(["context", name])
                    .stdout(process::Stdio::null())
                    .stderr(process::Stdio::null())
                    .spawn()
                    .unwrap()
            })
            .collect();
        for mut child in children {
            assert!(child.wait().unwrap().success());
        }

        let state = state_json(&env.state_dir());
        let active = state["active_context"].as_str().unwrap();
        assert!(active == "blue" || active == "green");
    }

    assert_eq!(state_json(&env.state_dir())["version"], 2 * rounds);
}

// ============================================================================
// Listing and merging
// ============================================================================

#[test]
fn test_list_contexts() {
    let env = Env::new(&[("config", &contexts_doc(&["dev", "prod-eu"]))]);
    env.cmd()
        .args(["list", "contexts"])
        .assert()
        .success()
        .stdout("dev\nprod-eu\n");

    env.cmd()
        .args(["list", "contexts", "--long"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://shared:6443"));
}

#[test]
fn test_first_kubeconfig_entry_wins() {
    let env = Env::new(&[
        ("a.yaml", &single_context_doc("x", "cluster-a")),
        ("b.yaml", &single_context_doc("x", "cluster-b")),
    ]);
    env.cmd()
        .args(["context", "-v", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster-a"))
        .stdout(predicate::str::contains("cluster-b").not());
}

#[test]
fn test_explicit_kubeconfig_overrides_search_path() {
    let env = Env::new(&[("config", &single_context_doc("x", "cluster-a"))]);
    let extra = env.path("extra.yaml");
    fs::write(&extra, single_context_doc("x", "cluster-z")).unwrap();

    env.cmd()
        .arg("--kubeconfig")
        .arg(&extra)
        .args(["context", "-v", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster-z"));
}

#[test]
fn test_missing_explicit_kubeconfig_fails() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    env.cmd()
        .arg("--kubeconfig")
        .arg(env.path("nope.yaml"))
        .args(["list", "contexts"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.yaml"));
}

#[test]
fn test_broken_document_is_skipped() {
    let env = Env::new(&[
        ("broken", "contexts: ["),
        ("config", DOCKER_DESKTOP),
    ]);
    env.cmd()
        .args(["list", "contexts"])
        .assert()
        .success()
        .stdout("docker-desktop\n")
        .stderr(predicate::str::contains("broken"));
}

#[test]
fn test_unwritable_state_dir_reports_store_unavailable() {
    let env = Env::new(&[("config", DOCKER_DESKTOP)]);
    // A regular file where the state directory should be
    fs::write(env.state_dir(), "not a directory").unwrap();

    env.cmd()
        .args(["context", "docker-desktop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KUBESESS_STATE_DIR"));
}

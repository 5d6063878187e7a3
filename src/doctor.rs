//! Diagnostic tool for kubesess.
//!
//! This module implements the `kubesess doctor` command, which checks the
//! setup for common issues:
//! - Which kubeconfig documents are found, and whether they parse.
//! - Contexts whose cluster or user is not defined anywhere.
//! - Health of the session state file.
//! - Whether the active selection still points at a usable context.
//!
//! It reports issues to the user with a pass/fail/warn status.

use anstyle::AnsiColor;
use std::env;

use crate::merge::{self, Diagnostic};
use crate::paths::{Paths, STATE_DIR_ENV};
use crate::registry::{DEFAULT_NAMESPACE, Registry};
use crate::resolver::Resolver;
use crate::shell::{CONTEXT_VAR, NAMESPACE_VAR};
use crate::state::{StateHealth, StateStore};
use crate::ui::{Status, Ui};

/// Run the doctor diagnostics. Returns true when no issues were found.
pub fn run_doctor(paths: &Paths, ui: &Ui) -> bool {
    ui.section("kubesess Doctor");
    ui.newline();

    let mut healthy = true;
    let sources = paths.document_sources();

    // 1. Kubeconfig documents
    healthy &= check_step(ui, "Kubeconfig Documents", || {
        if sources.is_empty() {
            ui.println(format!("  {} No kubeconfig locations to search", ui.icon(Status::Warn)));
            return true;
        }
        let mut ok = true;
        for source in &sources {
            let label = if source.required { " (--kubeconfig)" } else { "" };
            if !source.path.exists() {
                let icon = if source.required {
                    ok = false;
                    ui.icon(Status::Err)
                } else {
                    ui.icon(Status::Info)
                };
                ui.println(format!(
                    "  {} Missing{}: {}",
                    icon,
                    label,
                    source.path.display()
                ));
                continue;
            }
            match merge::load_one(&source.path) {
                Ok(merged) if merged.diagnostics.iter().any(is_parse) => {
                    for diagnostic in merged.diagnostics.iter().filter(|d| is_parse(d)) {
                        ui.println(format!("  {} {}", ui.icon(Status::Err), diagnostic));
                    }
                    ok = false;
                }
                Ok(_) => ui.println(format!(
                    "  {} Parsed{}: {}",
                    ui.icon(Status::Ok),
                    label,
                    source.path.display()
                )),
                Err(e) => {
                    ui.println(format!("  {} {}", ui.icon(Status::Err), e));
                    ok = false;
                }
            }
        }
        ok
    });

    // The remaining checks need the merged view
    let registry = match merge::load(&sources) {
        Ok(merged) => Registry::new(merged),
        Err(e) => {
            ui.println(ui.colored(format!("Cannot merge kubeconfig: {}", e), AnsiColor::Red));
            return false;
        }
    };

    // 2. Contexts
    healthy &= check_step(ui, "Contexts", || {
        let contexts = registry.list_contexts();
        if contexts.is_empty() {
            ui.println(format!("  {} No contexts defined", ui.icon(Status::Warn)));
            return true;
        }

        ui.println(format!(
            "  Merged {} documents, found {} contexts ({} usable):",
            registry.sources().len(),
            contexts.len(),
            registry.valid_contexts().len()
        ));
        let mut all_valid = true;
        for entry in contexts {
            match &entry.invalid {
                None => {
                    let auth = registry
                        .user(&entry.context.user)
                        .map(|u| u.credential_kind().display_name())
                        .unwrap_or("unknown");
                    ui.println(format!(
                        "    {} {} (cluster: {}, user: {}, auth: {})",
                        ui.icon(Status::Ok),
                        entry.name(),
                        entry.context.cluster,
                        entry.context.user,
                        auth
                    ));
                }
                Some(missing) => {
                    ui.println(format!(
                        "    {} {} ({})",
                        ui.icon(Status::Err),
                        entry.name(),
                        missing
                    ));
                    all_valid = false;
                }
            }
        }
        match registry.source_current_context() {
            Some(name) => ui.println(format!("  {} kubeconfig current-context: {}", ui.icon(Status::Info), name)),
            None => ui.println(format!("  {} No kubeconfig sets current-context", ui.icon(Status::Info))),
        }
        all_valid
    });

    // 3. State file
    let store = StateStore::from_paths(paths);
    healthy &= check_step(ui, "State File", || match store.inspect() {
        Ok(StateHealth::Missing) => {
            ui.println(format!(
                "  {} No state file yet: {}",
                ui.icon(Status::Info),
                store.path().display()
            ));
            true
        }
        Ok(StateHealth::Valid(state)) => {
            ui.println(format!(
                "  {} State file readable (version {})",
                ui.icon(Status::Ok),
                state.version
            ));
            if let Some(updated) = state.updated_at {
                ui.println(format!(
                    "  {} Last updated: {}",
                    ui.icon(Status::Info),
                    updated.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            true
        }
        Ok(StateHealth::Corrupt(reason)) => {
            ui.println(format!("  {} State file corrupt: {}", ui.icon(Status::Err), reason));
            ui.println(format!(
                "  {} The next switch will overwrite it",
                ui.icon(Status::Info)
            ));
            false
        }
        Err(e) => {
            ui.println(format!("  {} {}", ui.icon(Status::Err), e));
            false
        }
    });

    // 4. Active selection
    healthy &= check_step(ui, "Active Selection", || {
        let report = match Resolver::new(&registry, &store).show_current(true) {
            Ok(report) => report,
            Err(e) => {
                ui.println(format!("  {} {}", ui.icon(Status::Err), e));
                return false;
            }
        };
        let Some(context) = report.selection.context() else {
            ui.println(format!("  {} No context selected", ui.icon(Status::Info)));
            return true;
        };
        ui.println(format!(
            "  {} Context: {}, namespace: {}",
            ui.icon(Status::Info),
            context,
            report.selection.namespace().unwrap_or(DEFAULT_NAMESPACE)
        ));
        match report.stale {
            Some(stale) => {
                ui.println(format!("  {} {}", ui.icon(Status::Err), stale.into_error()));
                false
            }
            None => {
                ui.println(format!("  {} Context is usable", ui.icon(Status::Ok)));
                true
            }
        }
    });

    // 5. Environment
    check_step(ui, "Environment", || {
        for var in ["KUBECONFIG", STATE_DIR_ENV, CONTEXT_VAR, NAMESPACE_VAR] {
            match env::var(var) {
                Ok(value) => ui.println(format!("  {} {} set to: {}", ui.icon(Status::Ok), var, value)),
                Err(_) => ui.println(format!("  {} {} not set", ui.icon(Status::Info), var)),
            }
        }
        if env::var_os(CONTEXT_VAR).is_none() {
            ui.println(format!(
                "  {} Shell integration not loaded? Add `eval \"$(kubesess init <shell>)\"` to your shell profile",
                ui.icon(Status::Warn)
            ));
        }
        true
    });

    healthy
}

fn is_parse(diagnostic: &Diagnostic) -> bool {
    matches!(diagnostic, Diagnostic::Parse { .. })
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}

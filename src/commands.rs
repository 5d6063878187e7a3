//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`context`,
//! `namespace`, `init`, `list`, ...). It serves as the coordination layer,
//! interacting with:
//! - `crate::ui` for user interaction (output, prompts).
//! - `crate::paths` for filesystem locations.
//! - `crate::merge` / `crate::registry` for the kubeconfig view.
//! - `crate::resolver` for switching logic.
//! - `crate::shell` for generated shell code.
//!
//! Each function here generally corresponds to a subcommand in `main.rs`.

use anyhow::{Context, Result};
use comfy_table::Color as TableColor;
use inquire::Select;
use tracing::debug;

use crate::doctor::run_doctor;
use crate::error::Error;
use crate::merge::{self, ContextEntry};
use crate::paths::Paths;
use crate::registry::{DEFAULT_NAMESPACE, Registry};
use crate::resolver::{CurrentReport, Resolver, Selection};
use crate::shell::{self, Shell};
use crate::state::StateStore;
use crate::ui::{Status, Ui};

/// What a `context` or `namespace` invocation should do
#[derive(Debug, Clone, Default)]
pub struct SwitchArgs {
    /// Target to switch to; show the current selection when absent
    pub name: Option<String>,
    pub verbose: bool,
    pub interactive: bool,
    /// Fall back to the kubeconfig's own default
    pub default: bool,
}

/// Load and merge every kubeconfig document.
///
/// Unusable documents and contexts are logged by `merge::load` and left out.
pub fn open_registry(paths: &Paths) -> Result<Registry> {
    let merged = merge::load(&paths.document_sources()).context("Failed to load kubeconfig")?;
    Ok(Registry::new(merged))
}

/// `kubesess context`
pub fn context(paths: &Paths, args: SwitchArgs, ui: &Ui) -> Result<()> {
    let registry = open_registry(paths)?;
    let store = StateStore::from_paths(paths);
    let resolver = Resolver::new(&registry, &store);

    let selection = if args.default {
        resolver.reset_context()?
    } else if args.interactive {
        let choice = pick_context(&registry, &resolver)?;
        resolver.select_context(&choice)?
    } else if let Some(name) = &args.name {
        resolver.select_context(name)?
    } else {
        let report = resolver.show_current(args.verbose)?;
        match report.selection.context() {
            Some(name) => ui.println(name),
            None => ui.warn("No context selected"),
        }
        if args.verbose {
            print_details(&registry, &report, ui);
        }
        return Ok(());
    };

    if let Some(name) = selection.context() {
        ui.println(ui.highlight(name));
    }
    if args.verbose {
        let report = resolver.show_current(true)?;
        print_details(&registry, &report, ui);
    }
    Ok(())
}

/// `kubesess namespace`
pub fn namespace(paths: &Paths, args: SwitchArgs, ui: &Ui) -> Result<()> {
    let registry = open_registry(paths)?;
    let store = StateStore::from_paths(paths);
    let resolver = Resolver::new(&registry, &store);

    let selection = if args.default {
        resolver.reset_namespace()?
    } else if args.interactive {
        let choice = pick_namespace(&resolver)?;
        resolver.select_namespace(&choice)?
    } else if let Some(name) = &args.name {
        resolver.select_namespace(name)?
    } else {
        let report = resolver.show_current(args.verbose)?;
        print_namespace(&report.selection, ui);
        if args.verbose {
            print_details(&registry, &report, ui);
        }
        return Ok(());
    };

    print_namespace(&selection, ui);
    if args.verbose {
        let report = resolver.show_current(true)?;
        print_details(&registry, &report, ui);
    }
    Ok(())
}

/// `kubesess init <shell>`
pub fn init(shell_name: &str, ui: &Ui) -> Result<()> {
    let shell: Shell = shell_name.parse()?;
    ui.print(shell::init_script(shell));
    Ok(())
}

/// `kubesess env <shell>`
///
/// A stale selection is still exported, with a warning on stderr.
pub fn env(paths: &Paths, shell_name: &str, ui: &Ui) -> Result<()> {
    let shell: Shell = shell_name.parse()?;
    let store = StateStore::from_paths(paths);
    let selection = Selection::from_state(&store.load()?);

    if selection.context().is_some() {
        match open_registry(paths) {
            Ok(registry) => {
                if let Some(stale) = Resolver::new(&registry, &store).show_current(true)?.stale {
                    ui.warn(stale.into_error().to_string());
                }
            }
            Err(e) => debug!("skipping staleness check: {:#}", e),
        }
    }

    ui.print(shell::env_script(shell, &selection));
    Ok(())
}

/// `kubesess list contexts`
pub fn list_contexts(paths: &Paths, long: bool, ui: &Ui) -> Result<()> {
    let registry = open_registry(paths)?;
    let store = StateStore::from_paths(paths);
    let listing = Resolver::new(&registry, &store).list_all()?;

    if !long {
        for entry in listing.contexts.iter().filter(|c| c.is_valid()) {
            ui.println(entry.name());
        }
        return Ok(());
    }

    if listing.contexts.is_empty() {
        ui.warn("No contexts found.");
        return Ok(());
    }

    let active = listing.selection.context();
    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Context"),
        ui.header_cell("Cluster"),
        ui.header_cell("Server"),
        ui.header_cell("User"),
        ui.header_cell("Namespace"),
        ui.header_cell("Source"),
        ui.header_cell("Status"),
    ]);

    for entry in &listing.contexts {
        let is_active = Some(entry.name()) == active;
        let icon = if is_active { ui.icon(Status::Ok) } else { " " };
        let status = match &entry.invalid {
            Some(missing) => ui.colored_cell(format!("invalid: {}", missing), TableColor::Red),
            None if is_active => ui.colored_cell("active", TableColor::Green),
            None => ui.cell("-"),
        };
        let server = registry
            .cluster(&entry.context.cluster)
            .map(|c| c.server.clone())
            .unwrap_or_else(|| "?".to_string());
        let user = match registry.user(&entry.context.user) {
            Some(user) => format!("{} ({})", user.name, user.credential_kind().display_name()),
            None => entry.context.user.clone(),
        };

        table.add_row(vec![
            ui.cell(icon),
            ui.cell(entry.name()),
            ui.cell(&entry.context.cluster),
            ui.cell(server),
            ui.cell(user),
            ui.cell(entry.context.namespace.as_deref().unwrap_or("-")),
            ui.cell(entry.source.display().to_string()),
            status,
        ]);
    }

    ui.println(table.to_string());
    Ok(())
}

/// `kubesess list namespaces`
pub fn list_namespaces(paths: &Paths, context: Option<&str>, ui: &Ui) -> Result<()> {
    let registry = open_registry(paths)?;
    let store = StateStore::from_paths(paths);
    let namespaces = Resolver::new(&registry, &store).namespaces_for(context)?;
    for ns in namespaces {
        ui.println(ns);
    }
    Ok(())
}

/// `kubesess doctor`
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, ui) {
        anyhow::bail!("Doctor found issues");
    }
    Ok(())
}

fn print_namespace(selection: &Selection, ui: &Ui) {
    match selection {
        Selection::NoContext => ui.warn("No context selected"),
        Selection::ContextSelected { .. } => ui.println(ui.dim(DEFAULT_NAMESPACE)),
        Selection::ContextAndNamespaceSelected { namespace, .. } => {
            ui.println(ui.highlight(namespace))
        }
    }
}

/// Verbose view of the active selection
fn print_details(registry: &Registry, report: &CurrentReport, ui: &Ui) {
    if let Some(stale) = &report.stale {
        ui.warn(stale.clone().into_error().to_string());
    }

    let entry: &ContextEntry = match &report.entry {
        Some(entry) => entry,
        None => return,
    };

    let mut table = ui.details_table();
    table.add_row(vec![ui.cell("Context:"), ui.header_cell(entry.name())]);
    table.add_row(vec![ui.cell("Cluster:"), ui.cell(&entry.context.cluster)]);
    if let Some(cluster) = registry.cluster(&entry.context.cluster) {
        table.add_row(vec![ui.cell("Server:"), ui.cell(&cluster.server)]);
        if cluster.insecure_skip_tls_verify {
            table.add_row(vec![
                ui.cell("TLS:"),
                ui.colored_cell("verification disabled", TableColor::Yellow),
            ]);
        }
    }
    table.add_row(vec![ui.cell("User:"), ui.cell(&entry.context.user)]);
    if let Some(user) = registry.user(&entry.context.user) {
        table.add_row(vec![
            ui.cell("Auth:"),
            ui.cell(user.credential_kind().display_name()),
        ]);
    }
    table.add_row(vec![
        ui.cell("Namespace:"),
        ui.cell(report.selection.namespace().unwrap_or(DEFAULT_NAMESPACE)),
    ]);
    table.add_row(vec![
        ui.cell("Source:"),
        ui.cell(entry.source.display().to_string()),
    ]);
    ui.println(table.to_string());
}

fn pick_context(registry: &Registry, resolver: &Resolver) -> Result<String> {
    let options: Vec<String> = registry
        .valid_contexts()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let active = resolver.show_current(false)?.selection;
    let cursor = active
        .context()
        .and_then(|name| options.iter().position(|o| o == name))
        .unwrap_or(0);

    pick("Context", "context", options, cursor)
}

fn pick_namespace(resolver: &Resolver) -> Result<String> {
    let current = resolver.show_current(false)?.selection;
    if current.context().is_none() {
        return Err(Error::NoContextSelected.into());
    }
    let options: Vec<String> = resolver.namespaces_for(None)?.into_iter().collect();
    let cursor = current
        .namespace()
        .and_then(|name| options.iter().position(|o| o == name))
        .unwrap_or(0);

    pick("Namespace", "namespace", options, cursor)
}

fn pick(message: &str, prompt: &'static str, options: Vec<String>, cursor: usize) -> Result<String> {
    if options.is_empty() {
        return Err(Error::NoSelection { prompt }.into());
    }
    Select::new(message, options)
        .with_starting_cursor(cursor)
        .prompt_skippable()
        .with_context(|| format!("Failed to prompt for a {}", prompt))?
        .ok_or_else(|| Error::NoSelection { prompt }.into())
}

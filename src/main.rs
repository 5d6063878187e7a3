use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use kubesess::{
    commands::{self, SwitchArgs},
    logging,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "kubesess")]
#[command(about = "Per-shell Kubernetes context and namespace sessions")]
#[command(version)]
struct Cli {
    /// Additional kubeconfig file, taking precedence over the search path (repeatable)
    #[arg(long = "kubeconfig", global = true, value_name = "PATH")]
    kubeconfig: Vec<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SwitchOpts {
    /// Show extra detail about the selection
    #[arg(short, long)]
    verbose: bool,

    /// Pick from a list
    #[arg(short, long, conflicts_with = "default")]
    interactive: bool,

    /// Reset to the kubeconfig default
    #[arg(long)]
    default: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or switch the active context
    #[command(visible_alias = "ctx")]
    Context {
        /// Context name or fuzzy query
        #[arg(conflicts_with_all = ["interactive", "default"])]
        name: Option<String>,

        #[command(flatten)]
        opts: SwitchOpts,
    },

    /// Show or switch the namespace of the active context
    #[command(visible_alias = "ns")]
    Namespace {
        /// Namespace name or fuzzy query
        #[arg(conflicts_with_all = ["interactive", "default"])]
        name: Option<String>,

        #[command(flatten)]
        opts: SwitchOpts,
    },

    /// Print shell integration code (bash, zsh, fish, powershell)
    Init {
        /// Target shell
        shell: String,
    },

    /// Print statements exporting the active selection into a shell
    Env {
        /// Target shell
        shell: String,
    },

    /// List contexts or namespaces
    List {
        #[command(subcommand)]
        target: ListTarget,
    },

    /// Run diagnostics on kubeconfig and session state
    Doctor,
}

#[derive(Subcommand)]
enum ListTarget {
    /// Usable context names, one per line
    Contexts {
        /// Show a table with clusters, users and sources
        #[arg(short, long)]
        long: bool,
    },

    /// Known namespaces of a context
    Namespaces {
        /// Context to list for (defaults to the active one)
        #[arg(long)]
        context: Option<String>,
    },
}

impl SwitchOpts {
    fn into_args(self, name: Option<String>) -> SwitchArgs {
        SwitchArgs {
            name,
            verbose: self.verbose,
            interactive: self.interactive,
            default: self.default,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let paths = Paths::new(cli.kubeconfig)?;
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::Context { name, opts } => commands::context(&paths, opts.into_args(name), &ui),
        Commands::Namespace { name, opts } => {
            commands::namespace(&paths, opts.into_args(name), &ui)
        }
        Commands::Init { shell } => commands::init(&shell, &ui),
        Commands::Env { shell } => commands::env(&paths, &shell, &ui),
        Commands::List { target } => match target {
            ListTarget::Contexts { long } => commands::list_contexts(&paths, long, &ui),
            ListTarget::Namespaces { context } => {
                commands::list_namespaces(&paths, context.as_deref(), &ui)
            }
        },
        Commands::Doctor => commands::doctor(&paths, &ui),
    }
}

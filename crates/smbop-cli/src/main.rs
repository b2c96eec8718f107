mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use smbop_core::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "smbop",
    version,
    about = "Plan and converge shared SMB server configuration"
)]
struct Cli {
    /// Path to the smbop object store directory.
    #[arg(long, default_value = "~/.local/share/smbop")]
    store: String,

    /// Operator config TOML file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update resources from a TOML or JSON manifest.
    Apply {
        /// Manifest file holding one resource or a bundle.
        file: PathBuf,
    },
    /// Request deletion of a resource.
    Delete {
        /// Resource kind (e.g. share, security, common, secret).
        kind: String,
        /// Resource location as <namespace>/<name>.
        target: String,
    },
    /// Converge one share.
    Reconcile {
        /// Share location as <namespace>/<name>.
        target: String,
        /// Keep going until the share settles instead of running one pass.
        #[arg(long, default_value_t = false)]
        until_done: bool,
        /// Upper bound on passes with --until-done.
        #[arg(long, default_value_t = 100)]
        max_passes: u32,
    },
    /// Converge every share in the store, or in one namespace.
    ReconcileAll {
        #[arg(long)]
        namespace: Option<String>,
        /// Upper bound on passes per share.
        #[arg(long, default_value_t = 100)]
        max_passes: u32,
    },
    /// List stored objects of one kind.
    List {
        /// Resource kind (e.g. share, deployment, svc, cm).
        kind: String,
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Print the merged configuration document of a namespace.
    ShowConfig {
        namespace: String,
    },
    /// List warning events recorded in a namespace.
    Events {
        namespace: String,
    },
    /// Verify store integrity.
    VerifyStore,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SMBOP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let store_path = expand_tilde(&cli.store);
    let json_output = cli.json;
    let config_path = cli.config.as_deref();
    tracing::debug!(store = %store_path.display(), command = ?cli.command, "starting");

    let result = match cli.command {
        Commands::Apply { file } => commands::apply::run(&store_path, &file, json_output),
        Commands::Delete { kind, target } => {
            commands::delete::run(&store_path, &kind, &target, json_output)
        }
        Commands::Reconcile {
            target,
            until_done,
            max_passes,
        } => commands::reconcile::run(
            &store_path,
            config_path,
            &target,
            until_done.then_some(max_passes),
            json_output,
        ),
        Commands::ReconcileAll {
            namespace,
            max_passes,
        } => commands::reconcile::run_all(
            &store_path,
            config_path,
            namespace.as_deref(),
            max_passes,
            json_output,
        ),
        Commands::List { kind, namespace } => {
            commands::list::run(&store_path, &kind, namespace.as_deref(), json_output)
        }
        Commands::ShowConfig { namespace } => {
            commands::show_config::run(&store_path, config_path, &namespace, json_output)
        }
        Commands::Events { namespace } => {
            commands::events::run(&store_path, &namespace, json_output)
        }
        Commands::VerifyStore => commands::verify_store::run(&store_path, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") || msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use migralock_core::{install_signal_handler, LockConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "migralock",
    version,
    about = "Table-backed change log lock for serializing schema migrations"
)]
struct Cli {
    /// Path to a migralock TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the lock table (overrides database.path).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

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
    #[command(flatten)]
    Lock(LockCommand),
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

/// Commands that work on the lock table.
#[derive(Debug, Subcommand)]
enum LockCommand {
    /// Show whether the lock table exists and who holds the lock.
    Status,
    /// Take the change log lock.
    Acquire {
        /// Retry until the configured wait time runs out.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// Release the change log lock.
    Release,
    /// List the locks currently held.
    List,
    /// Release the lock whoever holds it, creating the table if needed.
    ForceRelease,
    /// Drop the lock table.
    Destroy,
    /// Run a command while holding the lock (pass it after --).
    Run {
        /// Command and arguments to run.
        #[arg(required = true, last = true)]
        command: Vec<String>,
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
            tracing_subscriber::EnvFilter::try_from_env("MIGRALOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
        Commands::Lock(command) => {
            run_locked(command, cli.config.as_deref(), cli.database, cli.json)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

/// Resolve config, open the database, dispatch.
fn run_locked(
    command: LockCommand,
    config_path: Option<&Path>,
    database: Option<PathBuf>,
    json: bool,
) -> Result<u8, String> {
    let config = LockConfig::resolve(config_path).map_err(|e| format!("config error: {e}"))?;
    let database = database
        .or_else(|| config.database.path.clone())
        .ok_or_else(|| {
            "config error: no database given; pass --database or set database.path".to_owned()
        })?;
    let mut svc = commands::open_service(&config, &database)?;

    match command {
        LockCommand::Status => commands::status::run(&mut svc, &database, json),
        LockCommand::Acquire { wait } => commands::acquire::run(&mut svc, wait, json),
        LockCommand::Release => commands::release::run(&mut svc, json),
        LockCommand::List => commands::list::run(&mut svc, json),
        LockCommand::ForceRelease => commands::force_release::run(&mut svc, json),
        LockCommand::Destroy => commands::destroy::run(&mut svc, json),
        LockCommand::Run { command } => commands::run::run(&mut svc, &command, json),
    }
}

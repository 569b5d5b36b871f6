mod commands;

use clap::{Args, Parser, Subcommand};
use commands::exit_code_for;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "packlock",
    version,
    about = "Deterministic governance pack resolution and lock files"
)]
struct Cli {
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

/// Candidate lists and policy files shared by `lock` and `verify`.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Candidate list supplied by the workspace (JSON array or TOML `[[packs]]`).
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Candidate list supplied by the installer.
    #[arg(long)]
    installer: Option<PathBuf>,
    /// Candidate list supplied by the user.
    #[arg(long)]
    user: Option<PathBuf>,
    /// Repo policy file (default: .packlock/policy.{json,toml}).
    #[arg(long)]
    repo_policy: Option<PathBuf>,
    /// Global policy file (default: ~/.config/packlock/policy.{json,toml}).
    #[arg(long)]
    global_policy: Option<PathBuf>,
    /// Runtime workspace override (true/false); falls back to PACKLOCK_WORKSPACE_OVERRIDES.
    #[arg(long)]
    workspace_overrides: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve selected packs and write a lock file.
    Lock {
        /// Pack ids to install (repeatable).
        #[arg(long = "select", required = true, num_args = 1..)]
        select: Vec<String>,
        /// Engine version packs must be compatible with.
        #[arg(long)]
        engine_version: String,
        #[command(flatten)]
        sources: SourceArgs,
        /// Lock file to write.
        #[arg(long, default_value = "governance.lock.json")]
        out: PathBuf,
        /// Resolve and print without writing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Check a lock file's integrity, and drift against candidates if given.
    Verify {
        /// Lock file to check.
        #[arg(default_value = "governance.lock.json")]
        lock: PathBuf,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Screen a pack directory's artifacts against the content policy.
    Scan {
        /// Pack directory.
        dir: PathBuf,
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
            tracing_subscriber::EnvFilter::try_from_env("PACKLOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::Lock {
            select,
            engine_version,
            sources,
            out,
            dry_run,
        } => commands::lock::run(
            &select,
            &engine_version,
            &sources,
            &out,
            dry_run,
            json_output,
        ),
        Commands::Verify { lock, sources } => commands::verify::run(&lock, &sources, json_output),
        Commands::Scan { dir } => commands::scan::run(&dir, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

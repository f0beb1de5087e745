//! Code property graph type propagation CLI.
//!
//! Provides the `cpg` binary. `propagate` runs a JSON graph script (see
//! [`script`]) through the propagation engine and prints the resulting
//! types as JSON; `profile` prints the default language profile as a
//! starting point for custom profiles.

mod script;
mod type_syntax;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cpg_typeprop::{LanguageProfile, PropagationMode};

use script::Script;

/// Type propagation over code property graphs.
#[derive(Parser)]
#[command(name = "cpg", about = "Type propagation over code property graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a graph script and print the propagated types.
    Propagate {
        /// Path to the JSON script.
        #[arg(short, long)]
        input: PathBuf,

        /// Language profile JSON (default: C family).
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Queue updates and run them in one batch at the end.
        #[arg(long)]
        deferred: bool,

        /// Exit with status 2 when propagation recorded diagnostics.
        #[arg(long)]
        strict: bool,
    },

    /// Print the default language profile.
    Profile,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Propagate {
            input,
            profile,
            deferred,
            strict,
        } => run_propagate(&input, profile.as_deref(), deferred, strict),
        Commands::Profile => run_profile(),
    };
    process::exit(exit_code);
}

/// Execute the propagate subcommand.
///
/// Returns exit code: 0 = success, 1 = script error,
/// 2 = diagnostics recorded (with `--strict`), 3 = I/O error.
fn run_propagate(input: &Path, profile: Option<&Path>, deferred: bool, strict: bool) -> i32 {
    let profile = match profile {
        Some(path) => match LanguageProfile::load(path) {
            Ok(p) => p,
            Err(cpg_typeprop::ProfileError::Io { path, source }) => {
                eprintln!("Error: failed to read profile '{}': {}", path, source);
                return 3;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => LanguageProfile::default(),
    };
    let mode = if deferred {
        PropagationMode::Deferred
    } else {
        PropagationMode::Live
    };

    let text = match std::fs::read_to_string(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read script '{}': {}", input.display(), e);
            return 3;
        }
    };

    let report = match Script::from_json(&text).and_then(|s| script::run(&s, profile, mode)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let json = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize report: {}\"}}", e));
    println!("{}", json);

    if strict && !report.diagnostics.is_empty() {
        eprintln!("Propagation recorded {} diagnostic(s):", report.diagnostics.len());
        for d in &report.diagnostics {
            eprintln!("  - {}", d);
        }
        return 2;
    }
    0
}

fn run_profile() -> i32 {
    match LanguageProfile::default().to_json() {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

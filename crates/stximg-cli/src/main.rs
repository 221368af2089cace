//! `stximg` — drives the image-processing stage of a spatial
//! transcriptomics pipeline.
//!
//! The binary resolves stage parameters from a parameter document and
//! direct flags, sizes the job, and invokes the external processing
//! executable in an isolated run directory. Exit codes are deterministic
//! so workflow engines can branch on them (see [`exit_codes`]).

mod commands;
mod exit_codes;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stximg",
    version,
    about = "Coordinate the external image-processing stage"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve parameters and invoke the processing executable.
    Run(commands::run::RunArgs),
    /// Resolve parameters and print the invocation plan without running.
    Plan(commands::plan::PlanArgs),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => commands::run::run_run(&args),
        Command::Plan(args) => commands::plan::run_plan(&args),
    };
    std::process::exit(i32::from(code));
}

/// Logs go to stderr so stdout stays parseable (`--json` output in
/// particular). `RUST_LOG` overrides the default `info` filter.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_direct_flags() {
        let cli = Cli::try_parse_from([
            "stximg",
            "run",
            "--input-dir",
            "/data/exp",
            "--clip-min",
            "0.95",
            "--is-volume",
            "--work-root",
            "/scratch",
        ])
        .expect("arguments must parse");
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.stage.clip_min, Some(0.95));
                assert!(args.stage.is_volume);
                assert_eq!(args.work_root, std::path::PathBuf::from("/scratch"));
            },
            Command::Plan(_) => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn test_plan_rejects_unknown_flag() {
        let result = Cli::try_parse_from(["stximg", "plan", "--input-dir", "/d", "--bogus"]);
        assert!(result.is_err());
    }
}

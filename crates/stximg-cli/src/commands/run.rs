//! `stximg run` — resolve parameters, size the job, and invoke the
//! processing executable in an isolated run directory.

use std::path::PathBuf;

use clap::Args;
use stximg_core::{run_stage, ProcessRunner, StageOutcome};

use crate::commands::StageArgs;
use crate::exit_codes::{codes, map_stage_error};

/// Arguments for `stximg run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Parent directory under which isolated run directories are created.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub work_root: PathBuf,

    /// Processing executable to invoke.
    #[arg(long, value_name = "PATH", default_value = "imgproc")]
    pub program: PathBuf,

    /// Emit the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the run command, returning the process exit code.
pub fn run_run(args: &RunArgs) -> u8 {
    let request = args
        .stage
        .to_request(args.work_root.clone(), args.program.clone());
    let runner = ProcessRunner::new();

    match run_stage(&request, &runner) {
        Ok(outcome) => {
            if args.json {
                print_json(&outcome)
            } else {
                print_text(&outcome);
                codes::SUCCESS
            }
        },
        Err(error) => {
            eprintln!("error: {error}");
            map_stage_error(&error)
        },
    }
}

fn print_json(outcome: &StageOutcome) -> u8 {
    let report = serde_json::json!({
        "run_token": outcome.run_token.as_str(),
        "work_dir": outcome.work_dir,
        "output_dir": outcome.output_dir,
        "plan": outcome.plan,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            codes::SUCCESS
        },
        Err(error) => {
            eprintln!("error: failed to serialize outcome: {error}");
            codes::GENERIC_ERROR
        },
    }
}

fn print_text(outcome: &StageOutcome) {
    println!("run {} complete", outcome.run_token);
    println!("work dir:   {}", outcome.work_dir.display());
    println!("output dir: {}", outcome.output_dir.display());
}

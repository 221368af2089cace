//! `stximg plan` — resolve parameters and print the invocation plan
//! without creating a workspace or invoking anything.

use clap::Args;
use stximg_core::{plan_stage, StagePlan};

use crate::commands::StageArgs;
use crate::exit_codes::{codes, map_stage_error};

/// Arguments for `stximg plan`.
#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Emit the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the plan command, returning the process exit code.
pub fn run_plan(args: &PlanArgs) -> u8 {
    let request = args.stage.to_request(".".into(), "imgproc".into());

    match plan_stage(&request) {
        Ok(plan) => {
            if args.json {
                print_json(&plan)
            } else {
                print_text(&plan);
                codes::SUCCESS
            }
        },
        Err(error) => {
            eprintln!("error: {error}");
            map_stage_error(&error)
        },
    }
}

fn print_json(plan: &StagePlan) -> u8 {
    match serde_json::to_string_pretty(plan) {
        Ok(json) => {
            println!("{json}");
            codes::SUCCESS
        },
        Err(error) => {
            eprintln!("error: failed to serialize plan: {error}");
            codes::GENERIC_ERROR
        },
    }
}

fn print_text(plan: &StagePlan) {
    println!("parameters:");
    if plan.resolved.iter().next().is_none() {
        println!("  (all defaults)");
    }
    for (spec, value) in plan.resolved.iter() {
        println!("  {} = {value}", spec.name);
    }

    println!("reservations:");
    match plan.reservations.temporary_storage_mib {
        Some(mib) => println!("  temporary storage: {mib} MiB"),
        None => println!("  temporary storage: unknown"),
    }
    println!(
        "  output storage:    {} MiB",
        plan.reservations.output_storage_mib
    );
    match plan.reservations.cpu_cores {
        Some(cores) => println!("  cpu cores:         {cores}"),
        None => println!("  cpu cores:         unreserved"),
    }
    match plan.reservations.memory_mib {
        Some(mib) => println!("  memory:            {mib} MiB"),
        None => println!("  memory:            unknown"),
    }

    println!("arguments: {}", plan.args.join(" "));
}

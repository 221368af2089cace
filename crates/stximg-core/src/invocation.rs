//! The executable boundary.
//!
//! The external processing executable is an opaque collaborator: it receives
//! the input directory plus one flag per resolved parameter, applies its own
//! defaults for omitted flags, and writes its output to a fixed relative
//! subpath of the working directory. Resource reservations ride alongside
//! the invocation as data for the surrounding execution environment; they
//! are never executable arguments.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::params::{ParamValue, ResolvedParams};
use crate::resources::ResourceEstimate;

/// Relative path under the working directory where the executable writes
/// its output.
pub const OUTPUT_SUBPATH: &str = "3_processed";

/// How much captured stderr to surface on failure.
const MAX_STDERR_BYTES: usize = 16 * 1024;

/// Errors raised while spawning or waiting on the executable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvocationError {
    /// The executable could not be spawned at all.
    #[error("cannot spawn stage executable {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Waiting on the spawned executable failed.
    #[error("cannot collect stage executable {program}: {source}")]
    Wait {
        /// Program that was being waited on.
        program: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// One fully-assembled invocation of the external processing executable.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    /// Path or name of the executable.
    pub program: PathBuf,
    /// Flattened argument vector, `--input-dir` first, then resolved flags
    /// in field-table order.
    pub args: Vec<String>,
    /// Isolated working directory for this run.
    pub work_dir: PathBuf,
    /// Reservations for the execution environment (not arguments).
    pub reservations: ResourceEstimate,
}

impl StageInvocation {
    /// Assembles the invocation from the resolved parameter set.
    ///
    /// Absent fields contribute no flag. Booleans emit a bare flag when
    /// true and nothing otherwise (the executable's boolean flags are
    /// store-true). Lists expand to repeated values after their flag.
    #[must_use]
    pub fn assemble(
        program: PathBuf,
        input_dir: &Path,
        work_dir: PathBuf,
        resolved: &ResolvedParams,
        reservations: ResourceEstimate,
    ) -> Self {
        let mut args = vec![
            "--input-dir".to_string(),
            input_dir.display().to_string(),
        ];
        args.extend(flag_args(resolved));
        Self {
            program,
            args,
            work_dir,
            reservations,
        }
    }

    /// The output directory the executable is expected to produce.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_SUBPATH)
    }
}

/// Emits the flag arguments for every resolved field, in table order.
#[must_use]
pub fn flag_args(resolved: &ResolvedParams) -> Vec<String> {
    let mut args = Vec::new();
    for (spec, value) in resolved.iter() {
        match value {
            ParamValue::Bool(true) => args.push(spec.flag.to_string()),
            // A resolved false is behaviorally identical to an omitted
            // store-true flag at the executable boundary.
            ParamValue::Bool(false) => {},
            ParamValue::IntList(items) => {
                args.push(spec.flag.to_string());
                args.extend(items.iter().map(ToString::to_string));
            },
            other => {
                args.push(spec.flag.to_string());
                args.push(other.to_string());
            },
        }
    }
    args
}

/// Exit information from one executable run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageExit {
    /// Exit code; killed-by-signal is reported as -1.
    pub exit_code: i32,
    /// Captured stderr, truncated to a bounded tail.
    pub stderr: String,
}

impl StageExit {
    /// True when the executable exited zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between orchestration and the execution environment.
///
/// The orchestrator drives exactly one `run` per pipeline invocation and
/// blocks until it returns; cancellation and timeouts belong to the
/// environment behind this trait, not to the core.
pub trait StageRunner {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when the process cannot be spawned or
    /// collected. A non-zero exit is NOT an error at this seam; it is
    /// reported through [`StageExit`] and classified by the orchestrator.
    fn run(&self, invocation: &StageInvocation) -> Result<StageExit, InvocationError>;
}

/// Runs the executable as a local child process.
///
/// Reservations are logged for the surrounding scheduler and applied
/// nowhere locally; this runner stays ignorant of how the environment
/// enforces them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new local process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StageRunner for ProcessRunner {
    fn run(&self, invocation: &StageInvocation) -> Result<StageExit, InvocationError> {
        let program = invocation.program.display().to_string();
        info!(
            program = %program,
            work_dir = %invocation.work_dir.display(),
            reservations = ?invocation.reservations,
            "invoking stage executable"
        );
        debug!(args = ?invocation.args, "stage argument vector");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                program: program.clone(),
                source,
            })?
            .wait_with_output()
            .map_err(|source| InvocationError::Wait {
                program: program.clone(),
                source,
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = tail_utf8(&output.stderr, MAX_STDERR_BYTES);
        Ok(StageExit { exit_code, stderr })
    }
}

/// Keeps the last `max` bytes of captured output as lossy UTF-8.
fn tail_utf8(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

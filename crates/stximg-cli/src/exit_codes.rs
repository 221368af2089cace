//! Deterministic exit codes for pipeline tooling.
//!
//! The surrounding workflow engine parses exit codes, so the mapping must be
//! stable: client-side validation failures live in 10-19, invocation-level
//! failures in 20-29, and a non-zero exit from the processing executable is
//! mirrored through unchanged.

use stximg_core::StageError;

/// Exit code constants.
pub mod codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;

    /// Generic error (fallback for unmapped errors).
    pub const GENERIC_ERROR: u8 = 1;

    /// Parameter document failed schema validation.
    pub const VALIDATION_ERROR: u8 = 10;

    /// Run workspace could not be created.
    pub const WORKSPACE_ERROR: u8 = 12;

    /// Run directory collision (two runs sharing a workspace is fatal).
    pub const COLLISION_ERROR: u8 = 13;

    /// Stage executable could not be spawned or collected.
    pub const SPAWN_ERROR: u8 = 20;

    /// Stage executable exited zero but produced no output.
    pub const MISSING_OUTPUT: u8 = 21;
}

/// Maps a stage error to its exit code.
///
/// An executable failure mirrors the executable's own exit code when it fits
/// in 1..=255; anything else degrades to [`codes::GENERIC_ERROR`].
#[must_use]
pub fn map_stage_error(error: &StageError) -> u8 {
    match error {
        StageError::Document(_) => codes::VALIDATION_ERROR,
        StageError::Workspace { .. } => codes::WORKSPACE_ERROR,
        StageError::RunDirCollision { .. } => codes::COLLISION_ERROR,
        StageError::Invocation(_) => codes::SPAWN_ERROR,
        StageError::MissingOutput { .. } => codes::MISSING_OUTPUT,
        StageError::ExecutableFailed { exit_code, .. } => mirror_exit_code(*exit_code),
        _ => codes::GENERIC_ERROR,
    }
}

/// Mirrors the executable's exit code through when representable.
#[must_use]
pub fn mirror_exit_code(exit_code: i32) -> u8 {
    match u8::try_from(exit_code) {
        Ok(code) if code != 0 => code,
        _ => codes::GENERIC_ERROR,
    }
}

/// Returns a human-readable description for an exit code.
#[must_use]
pub const fn exit_code_description(code: u8) -> &'static str {
    match code {
        codes::SUCCESS => "success",
        codes::VALIDATION_ERROR => "validation error (parameter document rejected)",
        codes::WORKSPACE_ERROR => "workspace error (cannot create run directory)",
        codes::COLLISION_ERROR => "run directory collision",
        codes::SPAWN_ERROR => "spawn error (stage executable did not start)",
        codes::MISSING_OUTPUT => "missing output (executable exited zero without output)",
        _ => "error",
    }
}

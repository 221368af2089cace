//! End-to-end coordination of one stage run.
//!
//! The orchestrator sequences the decision layer: document parse, per-field
//! resolution, channels-per-registration derivation, resource estimation,
//! run isolation, and the single executable invocation. It holds no state
//! between runs; concurrent runs are independent by construction because
//! each owns its token-namespaced working directory exclusively.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::document::{DocumentError, StageDocument};
use crate::invocation::{InvocationError, StageInvocation, StageRunner, flag_args};
use crate::params::{
    derive_ch_per_reg, resolve, FieldId, ParamValue, ResolvedParams, FIELDS,
};
use crate::resources::{estimate, ResourceEstimate};
use crate::run_token::RunToken;

/// Directory name prefix for isolated run directories.
const RUN_DIR_PREFIX: &str = "proc-";

/// Errors that abort a stage run.
///
/// Absence during resolution and degradation during estimation are normal
/// control flow and never surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageError {
    /// The parameter document failed schema validation. Fatal before any
    /// resource allocation or invocation.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The run workspace could not be created.
    #[error("cannot create run workspace {path}: {source}")]
    Workspace {
        /// Path that failed to create.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The token-namespaced run directory already exists. Two runs sharing a
    /// directory would corrupt each other, so this is fatal rather than
    /// recovered.
    #[error("run directory collision at {path}")]
    RunDirCollision {
        /// The colliding path.
        path: String,
    },

    /// The executable could not be spawned or collected.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The executable exited non-zero. No retry; stderr is surfaced
    /// verbatim.
    #[error("stage executable failed with exit code {exit_code}: {stderr}")]
    ExecutableFailed {
        /// The executable's exit code, mirrored to the caller.
        exit_code: i32,
        /// Captured stderr tail.
        stderr: String,
    },

    /// The executable exited zero but produced no output directory.
    #[error("stage executable produced no output at {path}")]
    MissingOutput {
        /// Expected output path.
        path: String,
    },
}

/// Direct caller-supplied parameter values, all optional.
///
/// These are the second candidate source for every field; the parameter
/// document, when present, outranks them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectParams {
    /// Subset of field-of-view indices to process.
    pub selected_fovs: Option<Vec<i64>>,
    /// Lower clip percentile.
    pub clip_min: Option<f64>,
    /// Upper clip percentile.
    pub clip_max: Option<f64>,
    /// Normalization strategy for clipping.
    pub level_method: Option<String>,
    /// Treat z-planes as a 3D volume.
    pub is_volume: Option<bool>,
    /// Skip the final clip-and-scale.
    pub rescale: Option<bool>,
    /// Auxiliary view to register against.
    pub register_aux_view: Option<String>,
    /// Register the auxiliary view to the primary images.
    pub register_to_primary: Option<bool>,
    /// Primary channels per registration channel.
    pub ch_per_reg: Option<i64>,
    /// Background view to subtract.
    pub background_view: Option<String>,
    /// Register the background view before subtraction.
    pub register_background: Option<bool>,
    /// Anchor view processed alongside the primary.
    pub anchor_view: Option<String>,
    /// Gaussian high-pass sigma.
    pub high_sigma: Option<i64>,
    /// Deconvolution iteration count.
    pub decon_iter: Option<i64>,
    /// Deconvolution sigma.
    pub decon_sigma: Option<i64>,
    /// Gaussian low-pass sigma.
    pub low_sigma: Option<i64>,
    /// Rolling-ball radius.
    pub rolling_radius: Option<i64>,
    /// Match image histograms to the dimmest image.
    pub match_histogram: Option<bool>,
    /// White top-hat radius.
    pub tophat_radius: Option<i64>,
    /// Worker process count.
    pub n_processes: Option<i64>,
}

impl DirectParams {
    /// Returns the direct candidate value for a field.
    #[must_use]
    pub fn candidate(&self, field: FieldId) -> Option<ParamValue> {
        match field {
            FieldId::SelectedFovs => self.selected_fovs.clone().map(ParamValue::IntList),
            FieldId::ClipMin => self.clip_min.map(ParamValue::Float),
            FieldId::ClipMax => self.clip_max.map(ParamValue::Float),
            FieldId::LevelMethod => self.level_method.clone().map(ParamValue::Str),
            FieldId::IsVolume => self.is_volume.map(ParamValue::Bool),
            FieldId::Rescale => self.rescale.map(ParamValue::Bool),
            FieldId::RegisterAuxView => self.register_aux_view.clone().map(ParamValue::Str),
            FieldId::RegisterToPrimary => self.register_to_primary.map(ParamValue::Bool),
            FieldId::ChPerReg => self.ch_per_reg.map(ParamValue::Int),
            FieldId::BackgroundView => self.background_view.clone().map(ParamValue::Str),
            FieldId::RegisterBackground => self.register_background.map(ParamValue::Bool),
            FieldId::AnchorView => self.anchor_view.clone().map(ParamValue::Str),
            FieldId::HighSigma => self.high_sigma.map(ParamValue::Int),
            FieldId::DeconIter => self.decon_iter.map(ParamValue::Int),
            FieldId::DeconSigma => self.decon_sigma.map(ParamValue::Int),
            FieldId::LowSigma => self.low_sigma.map(ParamValue::Int),
            FieldId::RollingRadius => self.rolling_radius.map(ParamValue::Int),
            FieldId::MatchHistogram => self.match_histogram.map(ParamValue::Bool),
            FieldId::TophatRadius => self.tophat_radius.map(ParamValue::Int),
            FieldId::NProcesses => self.n_processes.map(ParamValue::Int),
        }
    }
}

/// Everything needed to drive one stage run.
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// Experiment input directory (required).
    pub input_dir: PathBuf,
    /// Optional structured parameter document.
    pub document_path: Option<PathBuf>,
    /// Direct caller-supplied parameter values.
    pub direct: DirectParams,
    /// Last-resort channels-per-registration value, consulted only when
    /// neither explicit values nor tileset metadata yield one.
    pub ch_per_reg_fallback: Option<i64>,
    /// Input directory size in MiB, when known upstream.
    pub dir_size_mib: Option<u64>,
    /// Parent directory under which isolated run directories are created.
    pub work_root: PathBuf,
    /// The external processing executable.
    pub program: PathBuf,
}

/// The resolved decision set for a run, before anything touches the
/// filesystem. This is also what a dry run reports.
#[derive(Debug, Clone, Serialize)]
pub struct StagePlan {
    /// Effective parameter values, one per field that resolved.
    pub resolved: ResolvedParams,
    /// Reservations for the execution environment.
    pub reservations: ResourceEstimate,
    /// The flag vector the executable would receive after `--input-dir`.
    pub args: Vec<String>,
}

/// A completed stage run.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The run's isolation token.
    pub run_token: RunToken,
    /// The isolated working directory (exclusively owned by this run).
    pub work_dir: PathBuf,
    /// The executable's output directory; the run's sole product.
    pub output_dir: PathBuf,
    /// The decision set the run executed with.
    pub plan: StagePlan,
}

/// Resolves every parameter and sizes the job without touching the
/// filesystem or invoking anything.
///
/// # Errors
///
/// Returns [`StageError::Document`] when the parameter document is supplied
/// and fails validation.
pub fn plan_stage(request: &StageRequest) -> Result<StagePlan, StageError> {
    let document = request
        .document_path
        .as_deref()
        .map(StageDocument::load)
        .transpose()?;

    let resolved = resolve_params(document.as_ref(), request);
    let reservations = estimate(request.dir_size_mib, resolved_n_processes(&resolved));
    let args = flag_args(&resolved);

    info!(
        fields_resolved = resolved.len(),
        ?reservations,
        "stage plan computed"
    );
    Ok(StagePlan {
        resolved,
        reservations,
        args,
    })
}

/// Drives one stage run end to end.
///
/// On success the returned outcome's `output_dir` exists and belongs
/// exclusively to this run. Failures abort immediately; the executable is
/// never retried.
///
/// # Errors
///
/// Returns [`StageError`] per the failure taxonomy on the variants.
pub fn run_stage(
    request: &StageRequest,
    runner: &dyn StageRunner,
) -> Result<StageOutcome, StageError> {
    let plan = plan_stage(request)?;

    let run_token = RunToken::generate();
    let work_dir = request
        .work_root
        .join(format!("{RUN_DIR_PREFIX}{run_token}"));

    fs::create_dir_all(&request.work_root).map_err(|source| StageError::Workspace {
        path: request.work_root.display().to_string(),
        source,
    })?;
    create_run_dir(&work_dir)?;
    info!(run_token = %run_token, work_dir = %work_dir.display(), "run workspace created");

    let invocation = StageInvocation::assemble(
        request.program.clone(),
        &request.input_dir,
        work_dir.clone(),
        &plan.resolved,
        plan.reservations,
    );

    let exit = runner.run(&invocation)?;
    if !exit.success() {
        warn!(exit_code = exit.exit_code, "stage executable failed");
        return Err(StageError::ExecutableFailed {
            exit_code: exit.exit_code,
            stderr: exit.stderr,
        });
    }

    let output_dir = invocation.output_dir();
    if !output_dir.is_dir() {
        return Err(StageError::MissingOutput {
            path: output_dir.display().to_string(),
        });
    }

    info!(output_dir = %output_dir.display(), "stage run complete");
    Ok(StageOutcome {
        run_token,
        work_dir,
        output_dir,
        plan,
    })
}

/// Claims the isolated run directory.
///
/// Uses `create_dir` (not `create_dir_all`) so an existing directory
/// surfaces as a collision instead of being silently shared between runs.
fn create_run_dir(work_dir: &Path) -> Result<(), StageError> {
    match fs::create_dir(work_dir) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(StageError::RunDirCollision {
                path: work_dir.display().to_string(),
            })
        },
        Err(source) => Err(StageError::Workspace {
            path: work_dir.display().to_string(),
            source,
        }),
    }
}

/// Resolves all fields, routing channels-per-registration through
/// derivation.
fn resolve_params(document: Option<&StageDocument>, request: &StageRequest) -> ResolvedParams {
    let mut resolved = ResolvedParams::new();
    for spec in &FIELDS {
        if spec.id == FieldId::ChPerReg {
            continue;
        }
        let effective = resolve(
            document.and_then(|doc| doc.candidate(spec.id)),
            request.direct.candidate(spec.id),
            spec.policy,
        );
        resolved.set(spec.id, effective);
    }

    let explicit = resolve(
        document.and_then(|doc| doc.candidate(FieldId::ChPerReg)),
        request.direct.candidate(FieldId::ChPerReg),
        crate::params::ResolvePolicy::Truthiness,
    )
    .and_then(|value| value.as_int());

    // The resolved aux view already prefers the document over the direct
    // value, which is exactly the preference derivation wants.
    let chosen_aux = resolved
        .get(FieldId::RegisterAuxView)
        .and_then(ParamValue::as_str)
        .map(ToString::to_string);

    let derived = derive_ch_per_reg(
        explicit,
        document.and_then(|doc| doc.channel_count),
        chosen_aux.as_deref(),
        document.and_then(|doc| doc.aux_names.as_deref()),
        document.and_then(|doc| doc.aux_channel_count.as_deref()),
        request.ch_per_reg_fallback,
    );
    resolved.set(FieldId::ChPerReg, derived.map(ParamValue::Int));

    resolved
}

/// Extracts the resolved process count for the resource estimator.
fn resolved_n_processes(resolved: &ResolvedParams) -> Option<u32> {
    resolved
        .get(FieldId::NProcesses)
        .and_then(ParamValue::as_int)
        .and_then(|count| u32::try_from(count).ok())
}

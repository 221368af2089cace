//! Coordination core for the image-processing stage of a spatial
//! transcriptomics pipeline.
//!
//! The actual pixel work (deconvolution, registration, clipping/scaling) is
//! delegated to an external executable; this crate owns the decision layer in
//! front of it:
//!
//! - **Parameter resolution**: each of the ~20 optional stage parameters may
//!   arrive from a structured parameter document, from direct caller input,
//!   or from neither. [`params::resolve`] picks exactly one effective value
//!   (or explicit absence) per field under a fixed precedence policy.
//! - **Derivation**: the channels-per-registration value is computed from
//!   auxiliary tileset metadata when not supplied ([`params::derive_ch_per_reg`]).
//! - **Resource sizing**: temporary storage, output storage, CPU cores and
//!   memory reservations are estimated from input size and requested
//!   parallelism ([`resources::estimate`]).
//! - **Run isolation**: every invocation gets a collision-resistant
//!   [`run_token::RunToken`] that namespaces its working directory.
//! - **Orchestration**: [`orchestrator::run_stage`] sequences the above and
//!   invokes the executable once through the [`invocation::StageRunner`] seam.
//!
//! Everything up to the invocation is pure and synchronous; absence and
//! estimation degradation are normal control flow, never errors.

pub mod document;
pub mod invocation;
pub mod orchestrator;
pub mod params;
pub mod resources;
pub mod run_token;

pub use document::{DocumentError, StageDocument};
pub use invocation::{
    InvocationError, ProcessRunner, StageExit, StageInvocation, StageRunner, OUTPUT_SUBPATH,
};
pub use orchestrator::{
    plan_stage, run_stage, DirectParams, StageError, StageOutcome, StagePlan, StageRequest,
};
pub use params::{FieldId, FieldSpec, ParamValue, ResolvePolicy, ResolvedParams, FIELDS};
pub use resources::{estimate, measure_dir_size_mib, ResourceEstimate};
pub use run_token::RunToken;

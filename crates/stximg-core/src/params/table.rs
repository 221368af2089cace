//! The parameter field table.
//!
//! One row per optional stage setting. The table is the single source of
//! truth for field names (document keys), executable flag names, and which
//! resolve policy applies. Everything downstream (document candidate
//! extraction, flag emission, CLI plumbing) iterates this table rather than
//! naming fields ad hoc.

use serde::Serialize;

use super::ResolvePolicy;

/// Identifies one optional stage parameter.
///
/// Variant order matches [`FIELDS`] and fixes the order in which flags are
/// emitted to the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    /// Subset of field-of-view indices to process.
    SelectedFovs,
    /// Lower percentile for clip-to-zero scaling.
    ClipMin,
    /// Upper percentile for clip-to-zero scaling.
    ClipMax,
    /// Normalization strategy for clipping (per-chunk vs per-image).
    LevelMethod,
    /// Treat z-planes as a single 3D volume.
    IsVolume,
    /// Skip the final clip-and-scale (rescaling happens downstream).
    Rescale,
    /// Name of the auxiliary view to register against.
    RegisterAuxView,
    /// Register the auxiliary view to the primary images.
    RegisterToPrimary,
    /// Primary channels per registration channel.
    ChPerReg,
    /// Name of the background view to subtract.
    BackgroundView,
    /// Register the background view before subtraction.
    RegisterBackground,
    /// Name of the anchor view processed alongside the primary.
    AnchorView,
    /// Sigma for the gaussian high-pass filter.
    HighSigma,
    /// Iteration count for point-spread-function deconvolution.
    DeconIter,
    /// Sigma for point-spread-function deconvolution.
    DeconSigma,
    /// Sigma for the gaussian low-pass filter.
    LowSigma,
    /// Radius for rolling-ball background subtraction.
    RollingRadius,
    /// Match image histograms to the dimmest image.
    MatchHistogram,
    /// Radius for the white top-hat filter.
    TophatRadius,
    /// Worker process count for the executable.
    NProcesses,
}

/// One row of the field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field identifier.
    pub id: FieldId,
    /// Snake-case name, also the key in the parameter document.
    pub name: &'static str,
    /// Flag name on the external executable.
    pub flag: &'static str,
    /// Which resolve policy applies when two sources compete.
    pub policy: ResolvePolicy,
}

/// All stage parameters, in executable flag order.
///
/// Presence policy is reserved for the clip thresholds, where `0` is a
/// meaningful setting; every other field only overrides the executable's
/// default when meaningfully set (truthiness policy).
pub const FIELDS: [FieldSpec; 20] = [
    FieldSpec {
        id: FieldId::SelectedFovs,
        name: "selected_fovs",
        flag: "--selected-fovs",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::ClipMin,
        name: "clip_min",
        flag: "--clip-min",
        policy: ResolvePolicy::Presence,
    },
    FieldSpec {
        id: FieldId::ClipMax,
        name: "clip_max",
        flag: "--clip-max",
        policy: ResolvePolicy::Presence,
    },
    FieldSpec {
        id: FieldId::LevelMethod,
        name: "level_method",
        flag: "--level-method",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::IsVolume,
        name: "is_volume",
        flag: "--is-volume",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::Rescale,
        name: "rescale",
        flag: "--rescale",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::RegisterAuxView,
        name: "register_aux_view",
        flag: "--register-aux-view",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::RegisterToPrimary,
        name: "register_to_primary",
        flag: "--register-to-primary",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::ChPerReg,
        name: "ch_per_reg",
        flag: "--ch-per-reg",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::BackgroundView,
        name: "background_view",
        flag: "--background-view",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::RegisterBackground,
        name: "register_background",
        flag: "--register-background",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::AnchorView,
        name: "anchor_view",
        flag: "--anchor-view",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::HighSigma,
        name: "high_sigma",
        flag: "--high-sigma",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::DeconIter,
        name: "decon_iter",
        flag: "--decon-iter",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::DeconSigma,
        name: "decon_sigma",
        flag: "--decon-sigma",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::LowSigma,
        name: "low_sigma",
        flag: "--low-sigma",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::RollingRadius,
        name: "rolling_radius",
        flag: "--rolling-radius",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::MatchHistogram,
        name: "match_histogram",
        flag: "--match-histogram",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::TophatRadius,
        name: "tophat_radius",
        flag: "--tophat-radius",
        policy: ResolvePolicy::Truthiness,
    },
    FieldSpec {
        id: FieldId::NProcesses,
        name: "n_processes",
        flag: "--n-processes",
        policy: ResolvePolicy::Truthiness,
    },
];

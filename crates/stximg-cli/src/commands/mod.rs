//! Subcommand implementations.
//!
//! Each command takes its parsed arguments and returns a process exit code;
//! errors are reported on stderr and mapped through
//! [`crate::exit_codes::map_stage_error`].

pub mod plan;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use stximg_core::{measure_dir_size_mib, DirectParams, StageRequest};

/// Parameter and sizing inputs shared by `run` and `plan`.
///
/// Flag names mirror the processing executable's own interface so operators
/// can move values between the two without translation. Boolean flags are
/// bare switches; leaving one off means "unset", not "false".
#[derive(Debug, Args)]
pub struct StageArgs {
    /// Experiment input directory.
    #[arg(long, value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Structured parameter document (JSON). Values here outrank the
    /// flags below.
    #[arg(long, value_name = "FILE")]
    pub parameter_file: Option<PathBuf>,

    /// Subset of field-of-view indices to process.
    #[arg(long, value_name = "FOV", num_args = 1..)]
    pub selected_fovs: Option<Vec<i64>>,

    /// Lower clip percentile.
    #[arg(long, value_name = "PCT")]
    pub clip_min: Option<f64>,

    /// Upper clip percentile.
    #[arg(long, value_name = "PCT")]
    pub clip_max: Option<f64>,

    /// Normalization strategy for clipping.
    #[arg(long, value_name = "METHOD")]
    pub level_method: Option<String>,

    /// Treat z-planes as a 3D volume.
    #[arg(long)]
    pub is_volume: bool,

    /// Skip the final clip-and-scale.
    #[arg(long)]
    pub rescale: bool,

    /// Auxiliary view to register against.
    #[arg(long, value_name = "VIEW")]
    pub register_aux_view: Option<String>,

    /// Register the auxiliary view to the primary images.
    #[arg(long)]
    pub register_to_primary: bool,

    /// Primary channels per registration channel.
    #[arg(long, value_name = "N")]
    pub ch_per_reg: Option<i64>,

    /// Background view to subtract.
    #[arg(long, value_name = "VIEW")]
    pub background_view: Option<String>,

    /// Register the background view before subtraction.
    #[arg(long)]
    pub register_background: bool,

    /// Anchor view processed alongside the primary images.
    #[arg(long, value_name = "VIEW")]
    pub anchor_view: Option<String>,

    /// Gaussian high-pass sigma.
    #[arg(long, value_name = "SIGMA")]
    pub high_sigma: Option<i64>,

    /// Deconvolution iteration count.
    #[arg(long, value_name = "N")]
    pub decon_iter: Option<i64>,

    /// Deconvolution sigma.
    #[arg(long, value_name = "SIGMA")]
    pub decon_sigma: Option<i64>,

    /// Gaussian low-pass sigma.
    #[arg(long, value_name = "SIGMA")]
    pub low_sigma: Option<i64>,

    /// Rolling-ball radius.
    #[arg(long, value_name = "RADIUS")]
    pub rolling_radius: Option<i64>,

    /// Match image histograms to the dimmest image.
    #[arg(long)]
    pub match_histogram: bool,

    /// White top-hat radius.
    #[arg(long, value_name = "RADIUS")]
    pub tophat_radius: Option<i64>,

    /// Worker process count.
    #[arg(long, value_name = "N")]
    pub n_processes: Option<i64>,

    /// Fallback channels-per-registration, consulted only when neither
    /// explicit values nor tileset metadata yield one.
    #[arg(long, value_name = "N")]
    pub ch_per_reg_fallback: Option<i64>,

    /// Input directory size in MiB. Measured from --input-dir when omitted.
    #[arg(long, value_name = "MIB")]
    pub dir_size_mib: Option<u64>,
}

impl StageArgs {
    fn direct(&self) -> DirectParams {
        DirectParams {
            selected_fovs: self.selected_fovs.clone(),
            clip_min: self.clip_min,
            clip_max: self.clip_max,
            level_method: self.level_method.clone(),
            is_volume: self.is_volume.then_some(true),
            rescale: self.rescale.then_some(true),
            register_aux_view: self.register_aux_view.clone(),
            register_to_primary: self.register_to_primary.then_some(true),
            ch_per_reg: self.ch_per_reg,
            background_view: self.background_view.clone(),
            register_background: self.register_background.then_some(true),
            anchor_view: self.anchor_view.clone(),
            high_sigma: self.high_sigma,
            decon_iter: self.decon_iter,
            decon_sigma: self.decon_sigma,
            low_sigma: self.low_sigma,
            rolling_radius: self.rolling_radius,
            match_histogram: self.match_histogram.then_some(true),
            tophat_radius: self.tophat_radius,
            n_processes: self.n_processes,
        }
    }

    /// Builds the stage request, measuring the input directory when no size
    /// was given. Measurement failure degrades the size estimate to unknown
    /// rather than aborting.
    pub fn to_request(&self, work_root: PathBuf, program: PathBuf) -> StageRequest {
        let dir_size_mib = self.dir_size_mib.or_else(|| {
            match measure_dir_size_mib(&self.input_dir) {
                Ok(mib) => Some(mib),
                Err(error) => {
                    tracing::warn!(
                        input_dir = %self.input_dir.display(),
                        %error,
                        "cannot measure input directory; storage and memory \
                         estimates degrade to unknown"
                    );
                    None
                },
            }
        });

        StageRequest {
            input_dir: self.input_dir.clone(),
            document_path: self.parameter_file.clone(),
            direct: self.direct(),
            ch_per_reg_fallback: self.ch_per_reg_fallback,
            dir_size_mib,
            work_root,
            program,
        }
    }
}

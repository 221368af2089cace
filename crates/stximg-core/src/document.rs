//! The structured parameter document.
//!
//! An optional JSON file whose keys correspond 1:1 to the parameter fields,
//! plus the auxiliary tileset metadata used to derive channels-per-
//! registration. The document is validated against this fixed schema before
//! any of its values participate in resolution; a malformed document is a
//! fatal error, never a silent field-by-field fallback.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::params::{FieldId, ParamValue};

/// Maximum size of a parameter document on disk.
///
/// Documents are tiny in practice; the bound protects against reading an
/// arbitrarily large file into memory by mistake.
pub const MAX_DOCUMENT_SIZE: u64 = 64 * 1024;

/// Errors raised while loading or validating a parameter document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocumentError {
    /// The document file could not be read.
    #[error("cannot read parameter document {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The document exceeds [`MAX_DOCUMENT_SIZE`].
    #[error("parameter document {path} is {size} bytes, exceeds max {max}")]
    TooLarge {
        /// Offending path.
        path: String,
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// The document is not valid JSON or contains unknown keys.
    #[error("parameter document does not match schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// `aux_names` and `aux_channel_count` have different lengths.
    #[error("aux metadata misaligned: {names} aux_names vs {counts} aux_channel_count entries")]
    AuxMetadataMisaligned {
        /// Number of aux view names.
        names: usize,
        /// Number of channel-count entries.
        counts: usize,
    },

    /// A numeric field is outside its valid range.
    #[error("{field} out of range: {detail}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong.
        detail: String,
    },
}

/// Parsed parameter document.
///
/// Every stage parameter is optional; absent keys simply contribute no
/// document-side candidate. Unknown keys are rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDocument {
    /// Subset of field-of-view indices to process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_fovs: Option<Vec<i64>>,
    /// Lower clip percentile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_min: Option<f64>,
    /// Upper clip percentile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_max: Option<f64>,
    /// Normalization strategy for clipping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_method: Option<String>,
    /// Treat z-planes as a 3D volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_volume: Option<bool>,
    /// Skip the final clip-and-scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescale: Option<bool>,
    /// Auxiliary view to register against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_aux_view: Option<String>,
    /// Register the auxiliary view to the primary images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_to_primary: Option<bool>,
    /// Primary channels per registration channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch_per_reg: Option<i64>,
    /// Background view to subtract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_view: Option<String>,
    /// Register the background view before subtraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_background: Option<bool>,
    /// Anchor view processed alongside the primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_view: Option<String>,
    /// Gaussian high-pass sigma.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_sigma: Option<i64>,
    /// Deconvolution iteration count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decon_iter: Option<i64>,
    /// Deconvolution sigma.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decon_sigma: Option<i64>,
    /// Gaussian low-pass sigma.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_sigma: Option<i64>,
    /// Rolling-ball radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_radius: Option<i64>,
    /// Match image histograms to the dimmest image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_histogram: Option<bool>,
    /// White top-hat radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tophat_radius: Option<i64>,
    /// Worker process count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_processes: Option<i64>,

    /// Ordered auxiliary view names, aligned with `aux_channel_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_names: Option<Vec<String>>,
    /// Channel count per auxiliary view, aligned with `aux_names`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_channel_count: Option<Vec<i64>>,
    /// Total primary channel count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<i64>,
}

impl StageDocument {
    /// Loads and validates a document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the file cannot be read, exceeds
    /// [`MAX_DOCUMENT_SIZE`], fails schema parsing, or fails validation.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let metadata = fs::metadata(path).map_err(|source| DocumentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if metadata.len() > MAX_DOCUMENT_SIZE {
            return Err(DocumentError::TooLarge {
                path: path.display().to_string(),
                size: metadata.len(),
                max: MAX_DOCUMENT_SIZE,
            });
        }

        let raw = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let document = Self::from_json(&raw)?;
        info!(path = %path.display(), "parameter document accepted");
        Ok(document)
    }

    /// Parses and validates a document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] on schema or validation failure.
    pub fn from_json(raw: &str) -> Result<Self, DocumentError> {
        let document: Self = serde_json::from_str(raw)?;
        document.validate()?;
        Ok(document)
    }

    /// Validates cross-field constraints the serde schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] on the first violated constraint.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if let (Some(names), Some(counts)) = (&self.aux_names, &self.aux_channel_count) {
            if names.len() != counts.len() {
                return Err(DocumentError::AuxMetadataMisaligned {
                    names: names.len(),
                    counts: counts.len(),
                });
            }
        }

        for (field, value) in [("clip_min", self.clip_min), ("clip_max", self.clip_max)] {
            if let Some(value) = value {
                if !(0.0..=100.0).contains(&value) {
                    return Err(DocumentError::OutOfRange {
                        field,
                        detail: format!("{value} is not a percentile in 0..=100"),
                    });
                }
            }
        }

        if let Some(n_processes) = self.n_processes {
            if n_processes < 1 {
                return Err(DocumentError::OutOfRange {
                    field: "n_processes",
                    detail: format!("{n_processes} must be at least 1"),
                });
            }
        }

        for (field, value) in [
            ("channel_count", self.channel_count),
            ("ch_per_reg", self.ch_per_reg),
        ] {
            if let Some(value) = value {
                if value < 0 {
                    return Err(DocumentError::OutOfRange {
                        field,
                        detail: format!("{value} must be non-negative"),
                    });
                }
            }
        }

        if let Some(counts) = &self.aux_channel_count {
            if counts.iter().any(|count| *count < 0) {
                return Err(DocumentError::OutOfRange {
                    field: "aux_channel_count",
                    detail: "entries must be non-negative".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the document-side candidate value for a field.
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

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_document_is_valid() {
        let document = StageDocument::from_json("{}").unwrap();
        assert_eq!(document, StageDocument::default());
        for spec in &crate::params::FIELDS {
            assert!(document.candidate(spec.id).is_none());
        }
    }

    #[test]
    fn test_unknown_key_is_fatal() {
        let result = StageDocument::from_json(r#"{"clip_minimum": 0.5}"#);
        assert!(matches!(result, Err(DocumentError::Schema(_))));
    }

    #[test]
    fn test_misaligned_aux_metadata_is_fatal() {
        let raw = r#"{"aux_names": ["nuclei", "cell"], "aux_channel_count": [4]}"#;
        let result = StageDocument::from_json(raw);
        assert!(matches!(
            result,
            Err(DocumentError::AuxMetadataMisaligned { names: 2, counts: 1 })
        ));
    }

    #[test]
    fn test_clip_percentile_bounds() {
        let result = StageDocument::from_json(r#"{"clip_min": 101.0}"#);
        assert!(matches!(
            result,
            Err(DocumentError::OutOfRange { field: "clip_min", .. })
        ));

        let zero = StageDocument::from_json(r#"{"clip_min": 0.0}"#).unwrap();
        assert_eq!(zero.clip_min, Some(0.0));
    }

    #[test]
    fn test_n_processes_must_be_positive() {
        let result = StageDocument::from_json(r#"{"n_processes": 0}"#);
        assert!(matches!(
            result,
            Err(DocumentError::OutOfRange { field: "n_processes", .. })
        ));
    }

    #[test]
    fn test_negative_aux_channel_count_rejected() {
        let raw = r#"{"aux_names": ["nuclei"], "aux_channel_count": [-1]}"#;
        let result = StageDocument::from_json(raw);
        assert!(matches!(
            result,
            Err(DocumentError::OutOfRange { field: "aux_channel_count", .. })
        ));
    }

    #[test]
    fn test_candidate_preserves_falsy_values() {
        let raw = r#"{"clip_min": 0.0, "rescale": false, "selected_fovs": []}"#;
        let document = StageDocument::from_json(raw).unwrap();
        assert_eq!(
            document.candidate(FieldId::ClipMin),
            Some(ParamValue::Float(0.0))
        );
        assert_eq!(
            document.candidate(FieldId::Rescale),
            Some(ParamValue::Bool(false))
        );
        assert_eq!(
            document.candidate(FieldId::SelectedFovs),
            Some(ParamValue::IntList(vec![]))
        );
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let filler = vec![b' '; (MAX_DOCUMENT_SIZE + 1) as usize];
        file.write_all(&filler).unwrap();
        let result = StageDocument::load(file.path());
        assert!(matches!(result, Err(DocumentError::TooLarge { .. })));
    }

    #[test]
    fn test_load_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"register_aux_view": "nuclei", "channel_count": 12,
                "aux_names": ["nuclei"], "aux_channel_count": [4]}}"#
        )
        .unwrap();
        let document = StageDocument::load(file.path()).unwrap();
        assert_eq!(document.register_aux_view.as_deref(), Some("nuclei"));
        assert_eq!(document.channel_count, Some(12));
    }
}

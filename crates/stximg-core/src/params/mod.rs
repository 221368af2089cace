//! Parameter model for the image-processing stage.
//!
//! The stage accepts ~20 optional settings. Each setting is described once in
//! the [`FIELDS`] table (name, CLI flag, resolve policy) and every
//! candidate value flows through the same two-source resolution in
//! [`resolve`]. This keeps the presence-vs-truthiness distinction an explicit,
//! auditable property per field instead of hand-duplicated branching.

mod derive;
mod resolve;
mod table;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use derive::derive_ch_per_reg;
pub use resolve::{resolve, ResolvePolicy};
pub use table::{FieldId, FieldSpec, FIELDS};

/// One candidate or effective parameter value.
///
/// Absence is carried as `Option<ParamValue>` by callers; a legitimate falsy
/// value (`0`, `false`, empty list) is therefore always distinguishable from
/// "not provided".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean feature toggle (emitted as a bare flag when true).
    Bool(bool),
    /// Integer setting.
    Int(i64),
    /// Floating-point setting.
    Float(f64),
    /// String setting (view names, level method).
    Str(String),
    /// List of integers (selected field-of-view indices).
    IntList(Vec<i64>),
}

impl ParamValue {
    /// Returns false for the falsy values the truthiness policy treats as
    /// absent: `false`, `0`, `0.0`, `""`, and the empty list.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::IntList(v) => !v.is_empty(),
        }
    }

    /// Returns the inner integer, if this value is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the inner string, if this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::IntList(v) => {
                let joined = v
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                f.write_str(&joined)
            },
        }
    }
}

/// The effective parameter set for one stage run.
///
/// Fields that resolved to absence are simply not present; iteration follows
/// the [`FIELDS`] table order so the flag vector handed to the executable is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedParams {
    values: BTreeMap<FieldId, ParamValue>,
}

impl ResolvedParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the effective value for a field; a `None` outcome records
    /// explicit absence (no entry).
    pub fn set(&mut self, field: FieldId, value: Option<ParamValue>) {
        match value {
            Some(value) => {
                self.values.insert(field, value);
            },
            None => {
                self.values.remove(&field);
            },
        }
    }

    /// Returns the effective value for a field, if one resolved.
    #[must_use]
    pub fn get(&self, field: FieldId) -> Option<&ParamValue> {
        self.values.get(&field)
    }

    /// Returns true when no field resolved to a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of fields that resolved to a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterates resolved `(spec, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldSpec, &ParamValue)> {
        FIELDS
            .iter()
            .filter_map(|spec| self.values.get(&spec.id).map(|value| (spec, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_of_falsy_values() {
        assert!(!ParamValue::Bool(false).is_truthy());
        assert!(!ParamValue::Int(0).is_truthy());
        assert!(!ParamValue::Float(0.0).is_truthy());
        assert!(!ParamValue::Str(String::new()).is_truthy());
        assert!(!ParamValue::IntList(vec![]).is_truthy());
    }

    #[test]
    fn test_truthiness_of_set_values() {
        assert!(ParamValue::Bool(true).is_truthy());
        assert!(ParamValue::Int(-3).is_truthy());
        assert!(ParamValue::Float(0.95).is_truthy());
        assert!(ParamValue::Str("nuclei".to_string()).is_truthy());
        assert!(ParamValue::IntList(vec![0]).is_truthy());
    }

    #[test]
    fn test_resolved_params_iterate_in_table_order() {
        let mut resolved = ResolvedParams::new();
        resolved.set(FieldId::NProcesses, Some(ParamValue::Int(4)));
        resolved.set(FieldId::ClipMin, Some(ParamValue::Float(0.95)));

        let order: Vec<FieldId> = resolved.iter().map(|(spec, _)| spec.id).collect();
        assert_eq!(order, vec![FieldId::ClipMin, FieldId::NProcesses]);
    }

    #[test]
    fn test_set_none_clears_previous_value() {
        let mut resolved = ResolvedParams::new();
        resolved.set(FieldId::Rescale, Some(ParamValue::Bool(true)));
        resolved.set(FieldId::Rescale, None);
        assert!(resolved.get(FieldId::Rescale).is_none());
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_display_formats_for_flag_emission() {
        assert_eq!(ParamValue::Float(0.95).to_string(), "0.95");
        assert_eq!(ParamValue::Int(4).to_string(), "4");
        assert_eq!(ParamValue::IntList(vec![1, 2, 3]).to_string(), "1 2 3");
    }
}

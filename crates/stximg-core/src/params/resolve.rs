//! Two-source value resolution.
//!
//! At resolution time each field has at most two candidates: one parsed from
//! the structured parameter document and one supplied directly by the caller.
//! The document always outranks the direct value; the two policies differ
//! only in what counts as "set".

use super::ParamValue;

/// Precedence policy applied when two candidate sources compete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// The document wins whenever it carries a value at all, even a falsy one
    /// (`0`, `false`, empty list). Used where falsy values are meaningful,
    /// e.g. clip thresholds.
    Presence,
    /// A candidate only wins when it is present AND truthy. An explicit
    /// `false`/`0`/empty value is indistinguishable from absence under this
    /// policy; that conflation is inherited from the source pipeline and is
    /// preserved deliberately.
    Truthiness,
}

/// Resolves the effective value for one field.
///
/// Pure and total: every combination of present/absent candidates yields
/// either a concrete value or `None`, never a panic.
#[must_use]
pub fn resolve(
    document: Option<ParamValue>,
    direct: Option<ParamValue>,
    policy: ResolvePolicy,
) -> Option<ParamValue> {
    match policy {
        ResolvePolicy::Presence => document.or(direct),
        ResolvePolicy::Truthiness => document
            .filter(ParamValue::is_truthy)
            .or_else(|| direct.filter(ParamValue::is_truthy)),
    }
}

//! Derivation of the channels-per-registration value.
//!
//! When registration images are not duplicated to match the primary
//! dimensions, the number of primary channels covered by each registration
//! channel can be computed from the experiment metadata instead of being
//! supplied explicitly.

use tracing::debug;

/// Derives the channels-per-registration value.
///
/// Priority order, strictly:
///
/// 1. `explicit` — the value already resolved from document/direct input —
///    is returned unchanged when present.
/// 2. When `total_channels`, `aux_names` and `aux_channel_counts` are all
///    available, `chosen_aux` is looked up in `aux_names`; on a hit with a
///    non-zero channel count the result is `total_channels / aux_channels`,
///    rounded half-to-even (matching the source pipeline's rounding).
/// 3. Otherwise `fallback`, a plain caller-supplied integer, when present.
/// 4. Otherwise absent; the executable applies its own default of 1.
///
/// A missing aux view name or a zero channel count never divides: the
/// metadata branch is skipped and control falls through to 3/4.
#[must_use]
pub fn derive_ch_per_reg(
    explicit: Option<i64>,
    total_channels: Option<i64>,
    chosen_aux: Option<&str>,
    aux_names: Option<&[String]>,
    aux_channel_counts: Option<&[i64]>,
    fallback: Option<i64>,
) -> Option<i64> {
    if explicit.is_some() {
        return explicit;
    }

    if let (Some(total), Some(names), Some(counts)) =
        (total_channels, aux_names, aux_channel_counts)
    {
        if let Some(derived) = lookup_and_divide(total, chosen_aux, names, counts) {
            return Some(derived);
        }
    }

    if fallback.is_some() {
        debug!("ch_per_reg not derivable from metadata, using caller fallback");
    }
    fallback
}

/// Metadata branch: returns `None` when the aux view is unknown or its
/// channel count is zero, so the caller falls through.
fn lookup_and_divide(
    total_channels: i64,
    chosen_aux: Option<&str>,
    aux_names: &[String],
    aux_channel_counts: &[i64],
) -> Option<i64> {
    let name = chosen_aux?;
    let index = aux_names.iter().position(|candidate| candidate == name)?;
    let aux_channels = *aux_channel_counts.get(index)?;
    if aux_channels == 0 {
        debug!(aux_view = name, "aux view has zero channels, skipping derivation");
        return None;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let derived = (total_channels as f64 / aux_channels as f64).round_ties_even() as i64;
    debug!(
        aux_view = name,
        total_channels, aux_channels, derived, "derived ch_per_reg from aux tileset metadata"
    );
    Some(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_explicit_value_short_circuits() {
        let derived = derive_ch_per_reg(
            Some(2),
            Some(12),
            Some("nuclei"),
            Some(&names(&["nuclei"])),
            Some(&[4]),
            Some(9),
        );
        assert_eq!(derived, Some(2));
    }

    #[test]
    fn test_derives_from_metadata() {
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            Some("nuclei"),
            Some(&names(&["nuclei", "cell"])),
            Some(&[4, 2]),
            None,
        );
        assert_eq!(derived, Some(3));
    }

    #[test]
    fn test_unknown_aux_view_resolves_absent() {
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            Some("membrane"),
            Some(&names(&["nuclei", "cell"])),
            Some(&[4, 2]),
            None,
        );
        assert_eq!(derived, None);
    }

    #[test]
    fn test_unknown_aux_view_falls_through_to_fallback() {
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            Some("membrane"),
            Some(&names(&["nuclei"])),
            Some(&[4]),
            Some(2),
        );
        assert_eq!(derived, Some(2));
    }

    #[test]
    fn test_zero_aux_channels_never_divides() {
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            Some("nuclei"),
            Some(&names(&["nuclei"])),
            Some(&[0]),
            Some(5),
        );
        assert_eq!(derived, Some(5));
    }

    #[test]
    fn test_missing_metadata_skips_derivation() {
        let derived = derive_ch_per_reg(None, None, Some("nuclei"), None, None, None);
        assert_eq!(derived, None);
    }

    #[test]
    fn test_no_chosen_aux_view_skips_derivation() {
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            None,
            Some(&names(&["nuclei"])),
            Some(&[4]),
            None,
        );
        assert_eq!(derived, None);
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        // 10 / 4 = 2.5 rounds to 2, 14 / 4 = 3.5 rounds to 4.
        let half_down = derive_ch_per_reg(
            None,
            Some(10),
            Some("reg"),
            Some(&names(&["reg"])),
            Some(&[4]),
            None,
        );
        assert_eq!(half_down, Some(2));

        let half_up = derive_ch_per_reg(
            None,
            Some(14),
            Some("reg"),
            Some(&names(&["reg"])),
            Some(&[4]),
            None,
        );
        assert_eq!(half_up, Some(4));
    }

    #[test]
    fn test_misaligned_counts_fall_through() {
        // Name found at index 1 but counts list is shorter; no panic, no value.
        let derived = derive_ch_per_reg(
            None,
            Some(12),
            Some("cell"),
            Some(&names(&["nuclei", "cell"])),
            Some(&[4]),
            None,
        );
        assert_eq!(derived, None);
    }
}

//! Ready-made variant filters for [`crate::SessionBuilder::play`].

use super::Variant;

/// Keeps the single highest-bandwidth variant. I-frame only renditions are
/// never chosen.
pub fn max_bandwidth(variants: Vec<Variant>) -> Vec<Variant> {
    variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .reduce(|best, v| if v.bandwidth > best.bandwidth { v } else { best })
        .into_iter()
        .collect()
}

/// Keeps every variant.
pub fn all(variants: Vec<Variant>) -> Vec<Variant> {
    variants
}

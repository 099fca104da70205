//! Support Matrix: which (platform, medium) pairs can be published at all.

use crate::models::{Combo, Medium, Platform};

/// Instagram has no organic publishing path through the delivery transport.
pub fn is_valid(platform: Platform, medium: Medium) -> bool {
    !matches!((platform, medium), (Platform::Instagram, Medium::Organic))
}

/// Valid combos in selection order: platforms outer, mediums inner.
pub fn valid_combos(platforms: &[Platform], mediums: &[Medium]) -> Vec<Combo> {
    platforms
        .iter()
        .flat_map(|&platform| mediums.iter().map(move |&medium| Combo::new(platform, medium)))
        .filter(|c| is_valid(c.platform, c.medium))
        .collect()
}

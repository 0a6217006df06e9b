//! Pixel-counting kernels for color depth scoring.
//!
//! A kernel counts, for one variant list, how many mask pixels find a
//! matching target pixel at the variant's index. The matcher keeps the
//! best count over all variants.

use crate::image::DecodedImage;
use crate::metrics::{MatchThresholds, PixelClass};

/// Counting strategy over a set of variant lists.
pub trait Kernel {
    /// Returns the highest match count over `variants`, or 0 when empty.
    fn best_count<'a, I>(
        classes: &[PixelClass],
        variants: I,
        target: &DecodedImage,
        thresholds: MatchThresholds,
    ) -> usize
    where
        I: IntoIterator<Item = &'a [u32]>;
}

pub mod scalar;

#[cfg(feature = "rayon")]
pub mod rayon;

pub use scalar::{count_matches, Scalar};

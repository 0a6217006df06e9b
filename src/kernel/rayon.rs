//! Rayon-parallel kernel (feature-gated).
//!
//! Variant lists are independent, so each one is counted on its own task.
//! The result is identical to [`Scalar`](crate::kernel::Scalar).

use crate::image::DecodedImage;
use crate::kernel::{count_matches, Kernel};
use crate::metrics::{MatchThresholds, PixelClass};
use rayon::prelude::*;

/// Kernel counting variant lists in parallel.
pub struct Parallel;

impl Kernel for Parallel {
    fn best_count<'a, I>(
        classes: &[PixelClass],
        variants: I,
        target: &DecodedImage,
        thresholds: MatchThresholds,
    ) -> usize
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        let variants: Vec<&[u32]> = variants.into_iter().collect();
        variants
            .par_iter()
            .map(|variant| count_matches(classes, variant, target, thresholds))
            .max()
            .unwrap_or(0)
    }
}

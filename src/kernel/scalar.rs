//! Scalar reference kernel.

use crate::image::DecodedImage;
use crate::kernel::Kernel;
use crate::mask::OUTSIDE_CANVAS;
use crate::metrics::{MatchThresholds, PixelClass};

/// Sequential kernel; one variant after another.
pub struct Scalar;

/// Counts mask pixels whose target pixel at the variant index matches.
///
/// `classes[i]` is the query pixel class for entry `i`; `variant[i]` is where
/// it lands in the target. Sentinel entries and target pixels outside the
/// decoded window never count.
#[inline]
pub fn count_matches(
    classes: &[PixelClass],
    variant: &[u32],
    target: &DecodedImage,
    thresholds: MatchThresholds,
) -> usize {
    classes
        .iter()
        .zip(variant)
        .filter(|&(&class, &index)| {
            index != OUTSIDE_CANVAS
                && target
                    .pixel(index as usize)
                    .is_some_and(|px| thresholds.matches(class, px))
        })
        .count()
}

impl Kernel for Scalar {
    fn best_count<'a, I>(
        classes: &[PixelClass],
        variants: I,
        target: &DecodedImage,
        thresholds: MatchThresholds,
    ) -> usize
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        variants
            .into_iter()
            .map(|variant| count_matches(classes, variant, target, thresholds))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_and_undecoded_pixels_never_count() {
        let target = DecodedImage::from_prefix(vec![0, 0, 200, 0, 0, 200], 2, 2).unwrap();
        let class = PixelClass::of([0, 0, 200]);
        let classes = [class, class, class];
        let thresholds = MatchThresholds {
            data_threshold: 100,
            z_tolerance: 0.02,
        };
        // Pure blue has a zero runner-up ratio, which never compares.
        assert_eq!(count_matches(&classes, &[0, 1, 2], &target, thresholds), 0);

        let target = DecodedImage::from_prefix(vec![0, 100, 200, 0, 100, 200], 2, 2).unwrap();
        let class = PixelClass::of([0, 100, 200]);
        let classes = [class, class, class];
        assert_eq!(count_matches(&classes, &[0, 1, 2], &target, thresholds), 2);
        assert_eq!(
            count_matches(&classes, &[OUTSIDE_CANVAS, 1, 3], &target, thresholds),
            1
        );
    }
}

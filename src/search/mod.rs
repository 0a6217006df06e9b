//! Scoring a color depth mask against one target image.
//!
//! The matcher counts matching pixels for the base mask and every shifted
//! variant, keeps the best count, subtracts the scaled negative-mask count
//! when a negative mask is present, and repeats the whole procedure for the
//! mirrored variants. The mirrored pass only replaces the direct result when
//! its ratio is strictly higher.

use crate::config::SearchParams;
use crate::image::DecodedImage;
use crate::kernel::{Kernel, Scalar};
use crate::mask::{ColorDepthMask, MaskLayer};
use crate::metrics::MatchThresholds;
use crate::util::math::round_half_up;

#[cfg(feature = "rayon")]
use crate::kernel::rayon::Parallel;

/// Outcome of scoring one mask against one target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchScore {
    /// Matching pixel count, reduced by the negative mask when present.
    pub matching_pixels: i64,
    /// Fraction of mask pixels matched, in `[-1, 1]`.
    pub matching_ratio: f32,
    /// True when the mirrored pass produced this score.
    pub mirrored: bool,
}

/// Scores masks against decoded targets.
#[derive(Clone, Debug)]
pub struct ColorDepthMatcher {
    thresholds: MatchThresholds,
    min_ratio: f64,
    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    parallel: bool,
}

impl ColorDepthMatcher {
    /// Creates a matcher from validated search parameters.
    pub fn new(params: &SearchParams) -> Self {
        Self {
            thresholds: params.thresholds(),
            min_ratio: f64::from(params.min_matching_pix_ratio) / 100.0,
            parallel: params.parallel,
        }
    }

    /// Returns the pixel match thresholds in use.
    pub fn thresholds(&self) -> MatchThresholds {
        self.thresholds
    }

    /// Scores `mask` against `target`; `None` unless the ratio exceeds the
    /// minimum matching ratio.
    pub fn score(&self, mask: &ColorDepthMask, target: &DecodedImage) -> Option<MatchScore> {
        let (pixels, ratio, mirrored) = self.best_pass(mask, target);
        (ratio > self.min_ratio).then_some(MatchScore {
            matching_pixels: pixels,
            matching_ratio: ratio as f32,
            mirrored,
        })
    }

    /// Scores without applying the minimum ratio filter.
    pub fn evaluate(&self, mask: &ColorDepthMask, target: &DecodedImage) -> MatchScore {
        let (pixels, ratio, mirrored) = self.best_pass(mask, target);
        MatchScore {
            matching_pixels: pixels,
            matching_ratio: ratio as f32,
            mirrored,
        }
    }

    fn best_pass(&self, mask: &ColorDepthMask, target: &DecodedImage) -> (i64, f64, bool) {
        #[cfg(feature = "rayon")]
        {
            if self.parallel {
                return self.passes::<Parallel>(mask, target);
            }
        }
        self.passes::<Scalar>(mask, target)
    }

    fn passes<K: Kernel>(&self, mask: &ColorDepthMask, target: &DecodedImage) -> (i64, f64, bool) {
        let layer = mask.layer();
        let negative = mask.negative();

        let direct = self.pass::<K, _, _>(
            layer,
            layer.direct_variants(),
            negative.map(|neg| (neg, neg.direct_variants())),
            target,
        );
        let Some(variants) = layer.mirrored_variants() else {
            return (direct.0, direct.1, false);
        };
        let negative_mirrored =
            negative.and_then(|neg| neg.mirrored_variants().map(|variants| (neg, variants)));
        let mirrored = self.pass::<K, _, _>(layer, variants, negative_mirrored, target);
        if direct.1 < mirrored.1 {
            (mirrored.0, mirrored.1, true)
        } else {
            (direct.0, direct.1, false)
        }
    }

    fn pass<'a, K, I, N>(
        &self,
        layer: &MaskLayer,
        variants: I,
        negative: Option<(&MaskLayer, N)>,
        target: &DecodedImage,
    ) -> (i64, f64)
    where
        K: Kernel,
        I: IntoIterator<Item = &'a [u32]>,
        N: IntoIterator<Item = &'a [u32]>,
    {
        let size = layer.len() as f64;
        let best = K::best_count(layer.classes(), variants, target, self.thresholds) as f64;
        let ratio = best / size;
        let Some((neg, neg_variants)) = negative else {
            return (best as i64, ratio);
        };
        let neg_size = neg.len() as f64;
        let neg_best = K::best_count(neg.classes(), neg_variants, target, self.thresholds) as f64;
        let adjusted = round_half_up(best - neg_best * (size / neg_size));
        (adjusted, ratio - neg_best / neg_size)
    }
}

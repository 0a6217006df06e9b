//! Color depth mask construction.
//!
//! A mask is the sorted list of pixel indices of a query MIP that clear the
//! mask threshold, plus the shifted and mirrored copies of that list that the
//! matcher scores against a target. Shifted and mirrored lists stay aligned
//! with the base list: entry `i` of every variant is where query pixel
//! `positions[i]` lands in the target.

use crate::image::{DecodeRange, DecodedImage};
use crate::metrics::PixelClass;
use crate::trace::{trace_event, trace_warn};
use crate::util::{CdsError, CdsResult};

/// Sentinel for a shifted position that falls outside the canvas.
pub const OUTSIDE_CANVAS: u32 = u32::MAX;

/// Translation step between consecutive shift rings.
pub const SHIFT_STEP: u32 = 2;

/// Options controlling mask generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskOptions {
    /// A query pixel belongs to the mask when some channel exceeds this.
    pub mask_threshold: u8,
    /// Same threshold for the negative image.
    pub negative_threshold: u8,
    /// Largest translation, in pixels, tried in each direction.
    pub xy_shift: u32,
    /// Also generate left-right mirrored variants of the mask.
    pub mirror_mask: bool,
    /// Also generate mirrored variants of the negative mask.
    pub mirror_negative_mask: bool,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            mask_threshold: 100,
            negative_threshold: 0,
            xy_shift: 0,
            mirror_mask: false,
            mirror_negative_mask: false,
        }
    }
}

/// Position lists for one query image (the mask or its negative).
#[derive(Clone, Debug, PartialEq)]
pub struct MaskLayer {
    positions: Vec<u32>,
    classes: Vec<PixelClass>,
    shifted: Vec<Vec<u32>>,
    mirrored: Option<Vec<Vec<u32>>>,
}

impl MaskLayer {
    fn new(
        image: &DecodedImage,
        positions: Vec<u32>,
        xy_shift: u32,
        mirror: bool,
    ) -> Self {
        let (width, height) = (image.width(), image.height());
        let classes = positions
            .iter()
            .map(|&p| {
                image
                    .pixel(p as usize)
                    .map(PixelClass::of)
                    .unwrap_or(PixelClass::UNCLASSIFIED)
            })
            .collect();
        let shifted: Vec<Vec<u32>> = shift_offsets(xy_shift)
            .into_iter()
            .map(|(dx, dy)| shift_positions(&positions, dx, dy, width, height))
            .collect();
        let mirrored = mirror.then(|| {
            std::iter::once(&positions)
                .chain(shifted.iter())
                .map(|list| mirror_positions(list, width))
                .collect()
        });
        Self {
            positions,
            classes,
            shifted,
            mirrored,
        }
    }

    /// Returns the sorted base positions.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Returns the color class of the query pixel at each base position.
    pub fn classes(&self) -> &[PixelClass] {
        &self.classes
    }

    /// Returns the number of base positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the layer has no positions.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the shifted variants, one per lattice offset.
    pub fn shifted(&self) -> &[Vec<u32>] {
        &self.shifted
    }

    /// Returns the mirrored variants: the mirrored base list first, then the
    /// mirror of every shifted variant.
    pub fn mirrored(&self) -> Option<&[Vec<u32>]> {
        self.mirrored.as_deref()
    }

    /// Lists scored in the direct pass: the base list and every shift.
    pub fn direct_variants(&self) -> impl Iterator<Item = &[u32]> + '_ {
        std::iter::once(self.positions.as_slice()).chain(self.shifted.iter().map(Vec::as_slice))
    }

    /// Lists scored in the mirrored pass, if mirroring was requested.
    pub fn mirrored_variants(&self) -> Option<impl Iterator<Item = &[u32]> + '_> {
        self.mirrored
            .as_ref()
            .map(|lists| lists.iter().map(Vec::as_slice))
    }

    fn all_lists(&self) -> impl Iterator<Item = &[u32]> + '_ {
        self.direct_variants()
            .chain(self.mirrored.iter().flatten().map(Vec::as_slice))
    }
}

/// Immutable mask ready for scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorDepthMask {
    width: usize,
    height: usize,
    layer: MaskLayer,
    negative: Option<MaskLayer>,
    bounds_start: u32,
    bounds_end: u32,
}

impl ColorDepthMask {
    /// Returns the mask image width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the mask image height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the positive mask layer.
    pub fn layer(&self) -> &MaskLayer {
        &self.layer
    }

    /// Returns the sorted base positions of the positive mask.
    pub fn positions(&self) -> &[u32] {
        self.layer.positions()
    }

    /// Returns the number of positive mask pixels.
    pub fn size(&self) -> usize {
        self.layer.len()
    }

    /// Returns the negative mask layer, if any.
    pub fn negative(&self) -> Option<&MaskLayer> {
        self.negative.as_ref()
    }

    /// Smallest and largest target index any variant looks at.
    pub fn bounds(&self) -> (u32, u32) {
        (self.bounds_start, self.bounds_end)
    }

    /// Part of a target image that scoring this mask needs decoded.
    pub fn decode_range(&self) -> DecodeRange {
        DecodeRange::ThroughPixel(self.bounds_end as usize)
    }

    /// Returns true if the target has the same geometry as the mask.
    pub fn fits(&self, target: &DecodedImage) -> bool {
        target.width() == self.width && target.height() == self.height
    }
}

/// Builds [`ColorDepthMask`] values from query images.
#[derive(Clone, Debug, Default)]
pub struct MaskBuilder {
    options: MaskOptions,
}

impl MaskBuilder {
    /// Creates a builder with the given options.
    pub fn new(options: MaskOptions) -> Self {
        Self { options }
    }

    /// Returns the builder options.
    pub fn options(&self) -> &MaskOptions {
        &self.options
    }

    /// Thresholds the query image (and optional negative image) and
    /// generates all variants.
    pub fn build(
        &self,
        image: &DecodedImage,
        negative: Option<&DecodedImage>,
    ) -> CdsResult<ColorDepthMask> {
        check_complete(image)?;
        let positions = threshold_positions(image, self.options.mask_threshold);
        let negative = match negative {
            Some(neg) => {
                check_complete(neg)?;
                Some((neg, threshold_positions(neg, self.options.negative_threshold)))
            }
            None => None,
        };
        self.assemble(image, positions, negative)
    }

    /// Builds a mask from an explicit, strictly ascending position list.
    pub fn from_positions(
        &self,
        image: &DecodedImage,
        positions: Vec<u32>,
        negative: Option<(&DecodedImage, Vec<u32>)>,
    ) -> CdsResult<ColorDepthMask> {
        check_complete(image)?;
        check_positions(&positions, image)?;
        if let Some((neg, neg_positions)) = &negative {
            check_complete(neg)?;
            check_positions(neg_positions, neg)?;
        }
        self.assemble(image, positions, negative)
    }

    fn assemble(
        &self,
        image: &DecodedImage,
        positions: Vec<u32>,
        negative: Option<(&DecodedImage, Vec<u32>)>,
    ) -> CdsResult<ColorDepthMask> {
        let opts = &self.options;
        if positions.is_empty() {
            return Err(CdsError::EmptyMask {
                threshold: opts.mask_threshold,
            });
        }
        let layer = MaskLayer::new(image, positions, opts.xy_shift, opts.mirror_mask);

        let negative = match negative {
            Some((neg, _)) if neg.width() != image.width() || neg.height() != image.height() => {
                return Err(CdsError::InvalidInput(
                    "negative mask size differs from mask size",
                ));
            }
            Some((_, neg_positions)) if neg_positions.is_empty() => {
                trace_warn!(
                    "dropping empty negative mask",
                    threshold = opts.negative_threshold
                );
                None
            }
            Some((neg, neg_positions)) => Some(MaskLayer::new(
                neg,
                neg_positions,
                opts.xy_shift,
                opts.mirror_negative_mask,
            )),
            None => None,
        };

        let (bounds_start, bounds_end) = layer
            .all_lists()
            .chain(negative.iter().flat_map(|neg| neg.all_lists()))
            .flat_map(|list| list.iter().copied())
            .filter(|&p| p != OUTSIDE_CANVAS)
            .fold((u32::MAX, 0), |(lo, hi), p| (lo.min(p), hi.max(p)));

        trace_event!(
            "mask_built",
            positions = layer.len(),
            variants = layer.shifted().len() + 1,
            bounds_start = bounds_start,
            bounds_end = bounds_end
        );

        Ok(ColorDepthMask {
            width: image.width(),
            height: image.height(),
            layer,
            negative,
            bounds_start,
            bounds_end,
        })
    }
}

/// Returns the ascending indices of pixels outside the label regions with
/// some channel above `threshold`.
pub fn threshold_positions(image: &DecodedImage, threshold: u8) -> Vec<u32> {
    let width = image.width();
    image
        .as_rgb()
        .chunks_exact(3)
        .enumerate()
        .filter(|&(i, px)| {
            !in_label_region(i % width, i / width) && px.iter().any(|&c| c > threshold)
        })
        .map(|(i, _)| i as u32)
        .collect()
}

/// Returns true for the overlay regions where MIPs carry text labels.
#[inline]
pub fn in_label_region(x: usize, y: usize) -> bool {
    (x < 330 && y < 100) || (x >= 950 && y < 85)
}

/// Offsets of every shift variant: for each even ring `s` up to `xy_shift`,
/// all nine combinations of `dx, dy` in `{-s, 0, s}`.
pub fn shift_offsets(xy_shift: u32) -> Vec<(i64, i64)> {
    let mut out = Vec::new();
    let mut s = SHIFT_STEP as i64;
    while s <= xy_shift as i64 {
        for dx in [-s, 0, s] {
            for dy in [-s, 0, s] {
                out.push((dx, dy));
            }
        }
        s += SHIFT_STEP as i64;
    }
    out
}

/// Translates every position by `(dx, dy)`; positions leaving the canvas
/// become [`OUTSIDE_CANVAS`].
pub fn shift_positions(src: &[u32], dx: i64, dy: i64, width: usize, height: usize) -> Vec<u32> {
    let (w, h) = (width as i64, height as i64);
    src.iter()
        .map(|&p| {
            if p == OUTSIDE_CANVAS {
                return OUTSIDE_CANVAS;
            }
            let x = p as i64 % w + dx;
            let y = p as i64 / w + dy;
            if (0..w).contains(&x) && (0..h).contains(&y) {
                (y * w + x) as u32
            } else {
                OUTSIDE_CANVAS
            }
        })
        .collect()
}

/// Reflects every position across the vertical centerline.
pub fn mirror_positions(src: &[u32], width: usize) -> Vec<u32> {
    let w = width as u32;
    src.iter()
        .map(|&p| {
            if p == OUTSIDE_CANVAS {
                p
            } else {
                let x = p % w;
                p - x + (w - 1 - x)
            }
        })
        .collect()
}

fn check_complete(image: &DecodedImage) -> CdsResult<()> {
    if image.is_partial() {
        return Err(CdsError::InvalidInput("mask image must be fully decoded"));
    }
    if image.pixel_count() >= OUTSIDE_CANVAS as usize {
        return Err(CdsError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(())
}

fn check_positions(positions: &[u32], image: &DecodedImage) -> CdsResult<()> {
    if positions.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CdsError::InvalidInput("mask positions must be strictly ascending"));
    }
    if positions
        .last()
        .is_some_and(|&p| p as usize >= image.pixel_count())
    {
        return Err(CdsError::InvalidInput("mask position outside the image"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_offsets_cover_nine_per_ring() {
        assert!(shift_offsets(0).is_empty());
        assert!(shift_offsets(1).is_empty());
        assert_eq!(shift_offsets(2).len(), 9);
        assert_eq!(shift_offsets(5).len(), 18);
        assert_eq!(shift_offsets(2)[0], (-2, -2));
        assert_eq!(shift_offsets(2)[4], (0, 0));
    }

    #[test]
    fn shift_marks_positions_leaving_the_canvas() {
        // 4x3 canvas, positions (0,0) and (3,2).
        let src = [0, 11];
        assert_eq!(shift_positions(&src, 1, 0, 4, 3), vec![1, OUTSIDE_CANVAS]);
        assert_eq!(shift_positions(&src, 0, -1, 4, 3), vec![OUTSIDE_CANVAS, 7]);
    }

    #[test]
    fn mirror_keeps_rows_and_sentinels() {
        assert_eq!(mirror_positions(&[0, 5, OUTSIDE_CANVAS], 4), vec![3, 6, OUTSIDE_CANVAS]);
    }

    #[test]
    fn label_regions() {
        assert!(in_label_region(0, 0));
        assert!(in_label_region(329, 99));
        assert!(!in_label_region(330, 0));
        assert!(in_label_region(950, 84));
        assert!(!in_label_region(950, 85));
    }
}

//! Perceptual color-gap metric between two RGB pixels.
//!
//! Every pixel is classified by its strictly dominant channel and the
//! runner-up channel into one of six hue sectors, together with the ratio
//! `runner_up / dominant`. Pixels in the same sector are compared by ratio;
//! pixels in neighbouring sectors are compared by their distance to the
//! sector boundary; everything else is maximally dissimilar.

/// Gap reported for pixels that cannot be compared.
pub const NO_MATCH_GAP: f32 = 10000.0;

/// Gap reported when both ratios sit at the saturation value.
pub const SATURATED_GAP: f32 = 1000.0;

const SATURATED_RATIO: f32 = 255.0;

// Sector boundaries of roughly equal 60 degree hue divisions on a 0-255 scale.
const BLUE_RED_BLUE_GREEN: f32 = 0.354_862_745;
const BLUE_GREEN_GREEN_BLUE: f32 = 0.996_078_431;
const GREEN_BLUE_GREEN_RED: f32 = 0.505_882_353;
const GREEN_RED_RED_GREEN: f32 = 0.996_078_431;
const RED_GREEN_RED_BLUE: f32 = 0.505_882_353;

/// Hue sector named by dominant and runner-up channel, in hue-wheel order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HueSector {
    BlueRed,
    BlueGreen,
    GreenBlue,
    GreenRed,
    RedGreen,
    RedBlue,
}

/// Classification of a single pixel used by the gap computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelClass {
    sector: Option<HueSector>,
    ratio: f32,
}

impl PixelClass {
    /// Class of a pixel without a strictly dominant channel.
    pub const UNCLASSIFIED: PixelClass = PixelClass {
        sector: None,
        ratio: 0.0,
    };

    /// Classifies an RGB pixel.
    #[inline]
    pub fn of(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb;
        let (sector, dominant, runner_up) = if b > r && b > g {
            if r > g {
                (HueSector::BlueRed, b, r)
            } else {
                (HueSector::BlueGreen, b, g)
            }
        } else if g > b && g > r {
            if b > r {
                (HueSector::GreenBlue, g, b)
            } else {
                (HueSector::GreenRed, g, r)
            }
        } else if r > b && r > g {
            if g > b {
                (HueSector::RedGreen, r, g)
            } else {
                (HueSector::RedBlue, r, b)
            }
        } else {
            return Self::UNCLASSIFIED;
        };
        let ratio = if runner_up != 0 {
            runner_up as f32 / dominant as f32
        } else {
            0.0
        };
        Self {
            sector: Some(sector),
            ratio,
        }
    }

    /// Returns the hue sector, if the pixel has a dominant channel.
    pub fn sector(&self) -> Option<HueSector> {
        self.sector
    }

    /// Returns `runner_up / dominant`, or 0 when the runner-up channel is 0.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

/// Thresholds deciding whether a target pixel matches a mask pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchThresholds {
    /// A target pixel needs some channel above this value to be considered.
    pub data_threshold: u8,
    /// Largest color gap accepted as a match.
    pub z_tolerance: f32,
}

impl MatchThresholds {
    /// Returns true when the target pixel is bright enough and close enough
    /// in hue to the mask pixel.
    #[inline]
    pub fn matches(&self, mask: PixelClass, target: [u8; 3]) -> bool {
        let [r, g, b] = target;
        let t = self.data_threshold;
        if r <= t && g <= t && b <= t {
            return false;
        }
        class_gap(mask, PixelClass::of(target)) <= self.z_tolerance
    }
}

/// Color gap between two RGB pixels; `mask` is the query side.
pub fn pixel_gap(mask: [u8; 3], target: [u8; 3]) -> f32 {
    class_gap(PixelClass::of(mask), PixelClass::of(target))
}

/// Color gap between two classified pixels.
#[inline]
pub fn class_gap(mask: PixelClass, target: PixelClass) -> f32 {
    let (Some(ms), Some(ts)) = (mask.sector, target.sector) else {
        return NO_MATCH_GAP;
    };
    let (r1, r2) = (mask.ratio, target.ratio);
    if ms == ts {
        if r1 <= 0.0 || r2 <= 0.0 {
            return NO_MATCH_GAP;
        }
        if r1 == SATURATED_RATIO && r2 == SATURATED_RATIO {
            return SATURATED_GAP;
        }
        return (r2 - r1).abs();
    }

    use HueSector::*;
    let gap = match (ms, ts) {
        (BlueRed, BlueGreen) => below_boundary(r1, 0.44, r2, 0.54, BLUE_RED_BLUE_GREEN),
        (BlueGreen, BlueRed) => below_boundary(r1, 0.54, r2, 0.44, BLUE_RED_BLUE_GREEN),
        (BlueGreen, GreenBlue) | (GreenBlue, BlueGreen) => {
            above_boundary(r1, r2, BLUE_GREEN_GREEN_BLUE)
        }
        (GreenBlue, GreenRed) | (GreenRed, GreenBlue) => {
            below_boundary(r1, 0.7, r2, 0.7, GREEN_BLUE_GREEN_RED)
        }
        (GreenRed, RedGreen) | (RedGreen, GreenRed) => {
            above_boundary(r1, r2, GREEN_RED_RED_GREEN)
        }
        (RedGreen, RedBlue) | (RedBlue, RedGreen) => {
            below_boundary(r1, 0.7, r2, 0.7, RED_GREEN_RED_BLUE)
        }
        _ => None,
    };
    gap.unwrap_or(NO_MATCH_GAP)
}

#[inline]
fn below_boundary(r1: f32, max1: f32, r2: f32, max2: f32, boundary: f32) -> Option<f32> {
    (r1 < max1 && r2 < max2).then(|| (r1 - boundary) + (r2 - boundary))
}

#[inline]
fn above_boundary(r1: f32, r2: f32, boundary: f32) -> Option<f32> {
    (r1 > 0.8 && r2 > 0.8).then(|| (boundary - r1) + (boundary - r2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_picks_dominant_and_runner_up() {
        let class = PixelClass::of([100, 50, 200]);
        assert_eq!(class.sector(), Some(HueSector::BlueRed));
        assert!((class.ratio() - 0.5).abs() < 1e-6);

        let class = PixelClass::of([0, 200, 0]);
        assert_eq!(class.sector(), Some(HueSector::GreenRed));
        assert_eq!(class.ratio(), 0.0);
    }

    #[test]
    fn ties_on_the_dominant_channel_are_unclassified() {
        assert_eq!(PixelClass::of([200, 200, 10]), PixelClass::UNCLASSIFIED);
        assert_eq!(PixelClass::of([0, 0, 0]), PixelClass::UNCLASSIFIED);
    }
}

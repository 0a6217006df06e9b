//! Search parameters shared by every batch of a job.

use serde::{Deserialize, Serialize};

use crate::mask::MaskOptions;
use crate::metrics::MatchThresholds;
use crate::util::{CdsError, CdsResult};

/// Matching parameters, validated once when a job starts.
///
/// Percent-valued fields are converted to fractions by the accessors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    /// A target pixel needs some channel above this value.
    pub data_threshold: u8,
    /// Color-gap tolerance in percent.
    pub pix_color_fluctuation: f32,
    /// Largest XY translation tried, in pixels.
    pub xy_shift: u32,
    /// Also score the left-right mirrored mask.
    pub mirror_mask: bool,
    /// Also mirror the negative mask.
    pub mirror_negative_mask: bool,
    /// Minimum percentage of mask pixels that must match.
    pub min_matching_pix_ratio: f32,
    /// Keep at most this many results per mask; `None` keeps all.
    pub max_results_per_mask: Option<usize>,
    /// Count variants in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            data_threshold: 100,
            pix_color_fluctuation: 2.0,
            xy_shift: 0,
            mirror_mask: false,
            mirror_negative_mask: false,
            min_matching_pix_ratio: 2.0,
            max_results_per_mask: None,
            parallel: false,
        }
    }
}

impl SearchParams {
    /// Checks that percentages are finite and within `[0, 100]`.
    pub fn validate(&self) -> CdsResult<()> {
        check_percent("pixColorFluctuation", self.pix_color_fluctuation)?;
        check_percent("minMatchingPixRatio", self.min_matching_pix_ratio)?;
        if self.max_results_per_mask == Some(0) {
            return Err(CdsError::InvalidParameter {
                name: "maxResultsPerMask",
                reason: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    /// Largest color gap accepted as a pixel match.
    pub fn z_tolerance(&self) -> f32 {
        self.pix_color_fluctuation / 100.0
    }

    /// Matching ratio a result must exceed to be reported.
    pub fn min_matching_ratio(&self) -> f32 {
        self.min_matching_pix_ratio / 100.0
    }

    /// Pixel match thresholds derived from these parameters.
    pub fn thresholds(&self) -> MatchThresholds {
        MatchThresholds {
            data_threshold: self.data_threshold,
            z_tolerance: self.z_tolerance(),
        }
    }

    /// Mask generation options for a mask with the given thresholds.
    pub fn mask_options(&self, mask_threshold: u8, negative_threshold: u8) -> MaskOptions {
        MaskOptions {
            mask_threshold,
            negative_threshold,
            xy_shift: self.xy_shift,
            mirror_mask: self.mirror_mask,
            mirror_negative_mask: self.mirror_negative_mask,
        }
    }
}

fn check_percent(name: &'static str, value: f32) -> CdsResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(CdsError::InvalidParameter {
            name,
            reason: format!("{value} is not a percentage"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_json() {
        let params: SearchParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, SearchParams::default());
        assert!((params.z_tolerance() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn camel_case_fields() {
        let params: SearchParams =
            serde_json::from_str(r#"{"xyShift": 4, "mirrorMask": true, "maxResultsPerMask": 10}"#)
                .unwrap();
        assert_eq!(params.xy_shift, 4);
        assert!(params.mirror_mask);
        assert_eq!(params.max_results_per_mask, Some(10));
    }

    #[test]
    fn validate_rejects_out_of_range_percentages() {
        let params = SearchParams {
            pix_color_fluctuation: f32::NAN,
            ..SearchParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(CdsError::InvalidParameter {
                name: "pixColorFluctuation",
                ..
            })
        ));
        let params = SearchParams {
            min_matching_pix_ratio: 101.0,
            ..SearchParams::default()
        };
        assert!(params.validate().is_err());
        assert!(SearchParams::default().validate().is_ok());
    }
}

//! Match documents exchanged between batch workers and the aggregator.
//!
//! Field names follow the camelCase JSON layout of persisted match lists.

use serde::{Deserialize, Serialize};

use crate::search::MatchScore;

pub mod keys;
pub mod payload;
pub mod target;

pub use payload::{BatchPayload, COMPRESSION_THRESHOLD, GZIP_MIME_TYPE, JSON_MIME_TYPE};
pub use target::TargetMetadata;

/// All matches found for one mask.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskMatches {
    pub mask_id: String,
    pub mask_library_name: Option<String>,
    pub mask_published_name: Option<String>,
    #[serde(rename = "maskImageURL")]
    pub mask_image_url: String,
    #[serde(default)]
    pub results: Vec<TargetMatch>,
}

impl MaskMatches {
    /// Creates an empty match list for a mask key.
    pub fn for_mask(mask_key: &str, mask_image_url: String) -> Self {
        Self {
            mask_id: keys::search_mask_id(mask_key),
            mask_library_name: None,
            mask_published_name: None,
            mask_image_url,
            results: Vec::new(),
        }
    }

    /// Sorts matches by descending matching pixels and keeps at most `limit`.
    ///
    /// The sort is stable, so equal scores keep their merge order.
    pub fn rank(&mut self, limit: Option<usize>) {
        self.results
            .sort_by(|a, b| b.matching_pixels.cmp(&a.matching_pixels));
        if let Some(limit) = limit.filter(|&l| l > 0) {
            self.results.truncate(limit);
        }
    }
}

/// One library image matching a mask.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMatch {
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: String,
    pub id: String,
    pub library_name: Option<String>,
    pub published_name: Option<String>,
    pub image_name: String,
    pub alignment_space: Option<String>,
    pub slide_code: Option<String>,
    pub gender: Option<String>,
    pub objective: Option<String>,
    pub anatomical_area: Option<String>,
    pub channel: Option<String>,
    pub matching_pixels: i64,
    pub matching_ratio: f32,
    #[serde(default)]
    pub mirrored: bool,
    pub normalized_score: i64,
    #[serde(rename = "skeletonSWC", default, skip_serializing_if = "Option::is_none")]
    pub skeleton_swc: Option<String>,
    #[serde(rename = "skeletonOBJ", default, skip_serializing_if = "Option::is_none")]
    pub skeleton_obj: Option<String>,
}

impl TargetMatch {
    /// Combines library metadata with a score.
    pub fn new(meta: &TargetMetadata, score: MatchScore) -> Self {
        Self {
            image_url: meta.image_url.clone(),
            thumbnail_url: meta.thumbnail_url.clone(),
            id: meta.id.clone(),
            library_name: meta.library_name.clone(),
            published_name: meta.published_name.clone(),
            image_name: meta.image_name.clone(),
            alignment_space: meta.alignment_space.clone(),
            slide_code: meta.slide_code.clone(),
            gender: meta.gender.clone(),
            objective: meta.objective.clone(),
            anatomical_area: meta.anatomical_area.clone(),
            channel: meta.channel.clone(),
            matching_pixels: score.matching_pixels,
            matching_ratio: score.matching_ratio,
            mirrored: score.mirrored,
            normalized_score: score.matching_pixels,
            skeleton_swc: None,
            skeleton_obj: None,
        }
    }
}

/// Public address of a stored object.
pub fn object_url(url_base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", url_base.trim_end_matches('/'), bucket, key)
}

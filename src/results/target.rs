//! Library image metadata derived from its storage key.
//!
//! Library keys follow `<alignmentSpace>/<libraryName>/.../<name>.<ext>`.
//! Light microscopy names carry `-`-separated fields
//! (`line-slide-?-gender-objective-area-space-CDM_n-...`); EM library names
//! start with the body id.

use crate::results::{keys, object_url};

/// Metadata of one library image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetMetadata {
    pub id: String,
    pub image_name: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub library_name: Option<String>,
    pub published_name: Option<String>,
    pub alignment_space: Option<String>,
    pub slide_code: Option<String>,
    pub gender: Option<String>,
    pub objective: Option<String>,
    pub anatomical_area: Option<String>,
    pub channel: Option<String>,
}

impl TargetMetadata {
    /// Derives metadata from a library key. Image URLs point at the
    /// displayable PNG in `image_bucket` and the JPEG in `thumbnail_bucket`.
    pub fn from_library_key(
        key: &str,
        url_base: &str,
        image_bucket: &str,
        thumbnail_bucket: &str,
    ) -> Self {
        let name = keys::search_mask_id(key);
        let image_key = displayable_key(key);
        let thumbnail_key = with_extension(&image_key, "jpg");
        let dirs: Vec<&str> = key.split('/').collect();

        let mut meta = TargetMetadata {
            id: name.clone(),
            image_name: key.to_string(),
            image_url: object_url(url_base, image_bucket, &image_key),
            thumbnail_url: object_url(url_base, thumbnail_bucket, &thumbnail_key),
            ..TargetMetadata::default()
        };
        if dirs.len() > 3 {
            meta.alignment_space = Some(dirs[0].to_string());
            meta.library_name = Some(dirs[1].to_string());
        } else if dirs.len() > 1 {
            meta.library_name = Some(dirs[0].to_string());
        }

        let fields: Vec<&str> = name.split('-').collect();
        let field = |i: usize| fields.get(i).map(|s| s.to_string());
        meta.published_name = field(0);
        if meta.library_name.as_deref().is_some_and(is_em_library) {
            meta.gender = Some("f".to_string());
            return meta;
        }
        meta.slide_code = field(1);
        meta.gender = field(3);
        meta.objective = field(4);
        meta.anatomical_area = field(5);
        if let Some(space) = field(6) {
            meta.alignment_space = Some(space);
        }
        meta.channel = fields.get(7).and_then(|f| cdm_channel(f));
        meta
    }
}

/// EM libraries are named after the FlyEM hemibrain release.
pub fn is_em_library(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("flyem") && lower.contains("hemibrain")
}

/// Key of the displayable PNG for a searchable library image.
///
/// Drops the `searchable_neurons` folder, strips the segment suffix that
/// follows `-CDM[_n]` in the file name and switches the extension to `.png`.
pub fn displayable_key(key: &str) -> String {
    let stripped = match key.rsplit_once('/') {
        Some((dir, file)) if !dir.is_empty() => format!("{dir}/{}", strip_cdm_suffix(file)),
        _ => key.to_string(),
    };
    let cleaned = stripped
        .replacen("searchable_neurons", "", 1)
        .replacen("//", "/", 1);
    with_extension(&cleaned, "png")
}

fn strip_cdm_suffix(file: &str) -> String {
    let Some(dot) = file.rfind('.') else {
        return file.to_string();
    };
    let Some(cdm) = file[..dot].rfind("-CDM") else {
        return file.to_string();
    };
    let after = cdm + "-CDM".len();
    let rest = &file[after..dot];
    let suffix_start = if rest.starts_with('_') {
        rest.find('-')
    } else if rest.starts_with('-') {
        Some(0)
    } else {
        None
    };
    match suffix_start {
        Some(start) => format!("{}{}", &file[..after + start], &file[dot..]),
        None => file.to_string(),
    }
}

fn with_extension(key: &str, ext: &str) -> String {
    format!("{}.{ext}", keys::key_without_ext(key))
}

fn cdm_channel(field: &str) -> Option<String> {
    let lower = field.to_ascii_lowercase();
    let start = lower.find("cdm_")? + "cdm_".len();
    let digits: String = field[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lm_fields_come_from_the_name() {
        let key = "JRC2018_Unisex_20x_HR/FlyLight_Split-GAL4_Drivers/searchable_neurons/12/\
                   LH173-20160629_66_A5-SS-f-20x-brain-JRC2018_Unisex_20x_HR-CDM_2-01.tif";
        let meta = TargetMetadata::from_library_key(key, "https://s3.amazonaws.com", "lib", "thumbs");
        assert_eq!(meta.id, "LH173-20160629_66_A5-SS-f-20x-brain-JRC2018_Unisex_20x_HR-CDM_2-01");
        assert_eq!(meta.library_name.as_deref(), Some("FlyLight_Split-GAL4_Drivers"));
        assert_eq!(meta.published_name.as_deref(), Some("LH173"));
        assert_eq!(meta.slide_code.as_deref(), Some("20160629_66_A5"));
        assert_eq!(meta.gender.as_deref(), Some("f"));
        assert_eq!(meta.objective.as_deref(), Some("20x"));
        assert_eq!(meta.anatomical_area.as_deref(), Some("brain"));
        assert_eq!(meta.alignment_space.as_deref(), Some("JRC2018_Unisex_20x_HR"));
        assert_eq!(meta.channel.as_deref(), Some("2"));
        assert_eq!(
            meta.image_url,
            "https://s3.amazonaws.com/lib/JRC2018_Unisex_20x_HR/FlyLight_Split-GAL4_Drivers/12/\
             LH173-20160629_66_A5-SS-f-20x-brain-JRC2018_Unisex_20x_HR-CDM_2.png"
        );
        assert!(meta.thumbnail_url.ends_with("-CDM_2.jpg"));
        assert!(meta.thumbnail_url.starts_with("https://s3.amazonaws.com/thumbs/"));
    }

    #[test]
    fn em_names_carry_the_body_id() {
        let key = "JRC2018_Unisex_20x_HR/FlyEM_Hemibrain_v1.2.1/searchable_neurons/3/\
                   1077847238-RT-JRC2018_Unisex_20x_HR-CDM.tif";
        let meta = TargetMetadata::from_library_key(key, "u", "b", "t");
        assert_eq!(meta.published_name.as_deref(), Some("1077847238"));
        assert_eq!(meta.gender.as_deref(), Some("f"));
        assert_eq!(meta.slide_code, None);
        assert_eq!(meta.alignment_space.as_deref(), Some("JRC2018_Unisex_20x_HR"));
    }

    #[test]
    fn short_keys_have_no_alignment_space() {
        let meta = TargetMetadata::from_library_key("lib/x/a-b.png", "u", "b", "t");
        assert_eq!(meta.library_name.as_deref(), Some("lib"));
        assert_eq!(meta.alignment_space, None);
        let meta = TargetMetadata::from_library_key("a.png", "u", "b", "t");
        assert_eq!(meta.library_name, None);
        assert_eq!(meta.image_url, "u/b/a.png");
    }
}

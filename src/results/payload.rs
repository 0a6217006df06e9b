//! Encoding of a batch's match list as stored in the task store.
//!
//! Small lists are stored as raw JSON text; lists whose JSON exceeds
//! [`COMPRESSION_THRESHOLD`] bytes are gzip-compressed and flagged with
//! [`GZIP_MIME_TYPE`].

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::results::MaskMatches;
use crate::util::{CdsError, CdsResult};

/// JSON larger than this many bytes is compressed.
pub const COMPRESSION_THRESHOLD: usize = 4096;

/// Marker of a compressed payload.
pub const GZIP_MIME_TYPE: &str = "application/gzip";

/// Marker of a plain JSON payload.
pub const JSON_MIME_TYPE: &str = "application/json";

/// Stored form of a batch match list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchPayload {
    Json(String),
    Gzip(Vec<u8>),
}

impl BatchPayload {
    /// Serializes the match list, compressing it when it is large.
    pub fn encode(matches: &[MaskMatches]) -> CdsResult<Self> {
        let json = serde_json::to_string(matches)?;
        if json.len() <= COMPRESSION_THRESHOLD {
            return Ok(BatchPayload::Json(json));
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).map_err(CdsError::payload)?;
        let bytes = encoder.finish().map_err(CdsError::payload)?;
        Ok(BatchPayload::Gzip(bytes))
    }

    /// Restores the match list.
    pub fn decode(&self) -> CdsResult<Vec<MaskMatches>> {
        match self {
            BatchPayload::Json(text) => Ok(serde_json::from_str(text)?),
            BatchPayload::Gzip(bytes) => {
                let mut text = String::new();
                GzDecoder::new(bytes.as_slice())
                    .read_to_string(&mut text)
                    .map_err(CdsError::payload)?;
                Ok(serde_json::from_str(&text)?)
            }
        }
    }

    /// Content type marker for this payload.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BatchPayload::Json(_) => JSON_MIME_TYPE,
            BatchPayload::Gzip(_) => GZIP_MIME_TYPE,
        }
    }

    /// Raw stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BatchPayload::Json(text) => text.as_bytes(),
            BatchPayload::Gzip(bytes) => bytes,
        }
    }

    /// True for a payload carrying no matches.
    pub fn is_empty_list(&self) -> bool {
        matches!(self, BatchPayload::Json(text) if text == "[]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::TargetMatch;

    fn matches_with(n: usize) -> Vec<MaskMatches> {
        let mut m = MaskMatches::for_mask("masks/m1.png", "http://x/m1.png".to_string());
        m.results = (0..n)
            .map(|i| TargetMatch {
                id: format!("target-{i}"),
                image_name: format!("lib/target-{i}.tif"),
                matching_pixels: i as i64,
                ..TargetMatch::default()
            })
            .collect();
        vec![m]
    }

    #[test]
    fn small_lists_stay_plain_json() {
        let payload = BatchPayload::encode(&matches_with(1)).unwrap();
        assert_eq!(payload.mime_type(), JSON_MIME_TYPE);
        assert_eq!(payload.decode().unwrap(), matches_with(1));
        assert!(BatchPayload::encode(&[]).unwrap().is_empty_list());
    }

    #[test]
    fn large_lists_are_gzipped() {
        let payload = BatchPayload::encode(&matches_with(100)).unwrap();
        assert_eq!(payload.mime_type(), GZIP_MIME_TYPE);
        assert_eq!(&payload.as_bytes()[..2], &[0x1f, 0x8b]);
        assert_eq!(payload.decode().unwrap(), matches_with(100));
    }

    #[test]
    fn garbage_gzip_is_a_payload_error() {
        let err = BatchPayload::Gzip(vec![1, 2, 3]).decode().unwrap_err();
        assert!(matches!(err, CdsError::Payload { .. }));
    }
}

//! Decoded MIP images and range-limited decoding.
//!
//! `DecodedImage` stores packed interleaved RGB. A range-limited decode only
//! materializes a prefix of the pixel rows; pixels past the decoded prefix
//! are reported as absent so that lookups outside the decoded window can
//! never count as matches.

use crate::util::{CdsError, CdsResult};

pub mod io;
pub mod packbits;
pub mod tiff;

/// Owned packed RGB image, possibly holding only a prefix of its rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Creates an image from a full packed RGB buffer.
    pub fn from_rgb(pixels: Vec<u8>, width: usize, height: usize) -> CdsResult<Self> {
        let needed = rgb_len(width, height)?;
        if pixels.len() < needed {
            return Err(CdsError::BufferTooSmall {
                needed,
                got: pixels.len(),
            });
        }
        if pixels.len() > needed {
            return Err(CdsError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Creates an image holding only the first `pixels.len() / 3` pixels.
    pub(crate) fn from_prefix(mut pixels: Vec<u8>, width: usize, height: usize) -> CdsResult<Self> {
        let full = rgb_len(width, height)?;
        let len = pixels.len().min(full);
        pixels.truncate(len - len % 3);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of pixels in the full image.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Returns the number of pixels actually decoded.
    pub fn decoded_pixels(&self) -> usize {
        self.pixels.len() / 3
    }

    /// Returns true when only a prefix of the rows was decoded.
    pub fn is_partial(&self) -> bool {
        self.decoded_pixels() < self.pixel_count()
    }

    /// Returns the packed RGB bytes that were decoded.
    pub fn as_rgb(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the RGB value at linear index `y * width + x`.
    #[inline]
    pub fn pixel(&self, index: usize) -> Option<[u8; 3]> {
        let p = index.checked_mul(3)?;
        let px = self.pixels.get(p..p + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Returns the RGB value at `(x, y)`.
    pub fn pixel_xy(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixel(y * self.width + x)
    }
}

/// Container format of a stored MIP, derived from its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Tiff,
}

impl ImageFormat {
    /// Maps a blob key's extension to a format.
    pub fn from_key(key: &str) -> CdsResult<Self> {
        let file = key.rsplit('/').next().unwrap_or(key);
        let ext = file
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(ImageFormat::Png),
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            _ => Err(CdsError::UnsupportedFormat {
                reason: format!("unknown extension for {key}"),
            }),
        }
    }
}

/// How much of an image must be decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeRange {
    /// Decode every pixel.
    #[default]
    Full,
    /// Decode every row up to and including the row holding this pixel index.
    ThroughPixel(usize),
}

impl DecodeRange {
    /// Output byte cutoff for an RGB image of the given size.
    pub fn rgb_cutoff(&self, width: usize, height: usize) -> usize {
        let full = width.saturating_mul(height).saturating_mul(3);
        match *self {
            DecodeRange::Full => full,
            DecodeRange::ThroughPixel(end) if width > 0 => {
                let rows = end / width + 1;
                rows.saturating_mul(width).saturating_mul(3).min(full)
            }
            DecodeRange::ThroughPixel(_) => full,
        }
    }

    /// Merges two ranges into one covering both.
    pub fn union(self, other: DecodeRange) -> DecodeRange {
        match (self, other) {
            (DecodeRange::ThroughPixel(a), DecodeRange::ThroughPixel(b)) => {
                DecodeRange::ThroughPixel(a.max(b))
            }
            _ => DecodeRange::Full,
        }
    }
}

/// Decodes a MIP into packed RGB, honouring the range hint where the format
/// allows partial decoding.
pub fn decode_range(bytes: &[u8], format: ImageFormat, range: DecodeRange) -> CdsResult<DecodedImage> {
    match format {
        ImageFormat::Png => io::decode_png(bytes),
        ImageFormat::Tiff => tiff::decode(bytes, range),
    }
}

fn rgb_len(width: usize, height: usize) -> CdsResult<usize> {
    if width == 0 || height == 0 {
        return Err(CdsError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .ok_or(CdsError::InvalidDimensions { width, height })
}

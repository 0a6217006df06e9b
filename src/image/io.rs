//! PNG decoding via the `image` crate.
//!
//! PNG offers no cheap partial decode, so library images stored as PNG are
//! always decoded in full and converted to RGB8 (alpha dropped).

use crate::image::DecodedImage;
use crate::util::{CdsError, CdsResult};

/// Decodes PNG bytes into a full packed RGB image.
pub fn decode_png(bytes: &[u8]) -> CdsResult<DecodedImage> {
    let img = ::image::load_from_memory_with_format(bytes, ::image::ImageFormat::Png)
        .map_err(|err| CdsError::corrupt(err.to_string()))?;
    owned_from_dynamic_image(&img)
}

/// Creates an owned RGB image from a dynamic image.
pub fn owned_from_dynamic_image(img: &::image::DynamicImage) -> CdsResult<DecodedImage> {
    let rgb = img.to_rgb8();
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    DecodedImage::from_rgb(rgb.into_raw(), width, height)
}

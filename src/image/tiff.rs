//! Minimal baseline TIFF reader and writer for 8-bit RGB(A) MIPs.
//!
//! Only the first image file directory is read. Strips are decoded in order
//! until the requested output cutoff is reached, so a caller that only needs
//! the top rows of a large image never touches the remaining strips.

use crate::image::{packbits, DecodeRange, DecodedImage};
use crate::util::{CdsError, CdsResult};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

/// Strip compression schemes understood by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    PackBits,
}

impl Compression {
    fn from_tag(value: u32) -> CdsResult<Self> {
        match value {
            1 => Ok(Compression::None),
            32773 => Ok(Compression::PackBits),
            other => Err(CdsError::UnsupportedFormat {
                reason: format!("tiff compression {other}"),
            }),
        }
    }

    fn tag(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::PackBits => 32773,
        }
    }
}

/// Fields of the first IFD needed to decode pixel data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiffLayout {
    pub width: usize,
    pub height: usize,
    pub samples_per_pixel: usize,
    pub compression: Compression,
    pub strip_offsets: Vec<u32>,
    pub strip_byte_counts: Vec<u32>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Reader<'_> {
    fn u16_at(&self, offset: usize) -> CdsResult<u16> {
        let b = self
            .bytes
            .get(offset..offset + 2)
            .ok_or_else(|| CdsError::corrupt("tiff field outside buffer"))?;
        let raw = [b[0], b[1]];
        Ok(if self.big_endian {
            u16::from_be_bytes(raw)
        } else {
            u16::from_le_bytes(raw)
        })
    }

    fn u32_at(&self, offset: usize) -> CdsResult<u32> {
        let b = self
            .bytes
            .get(offset..offset + 4)
            .ok_or_else(|| CdsError::corrupt("tiff field outside buffer"))?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    /// Reads the values of a SHORT or LONG directory entry.
    fn values(&self, entry: usize) -> CdsResult<Vec<u32>> {
        let kind = self.u16_at(entry + 2)?;
        let count = self.u32_at(entry + 4)? as usize;
        let size = match kind {
            TYPE_SHORT => 2,
            TYPE_LONG => 4,
            other => {
                return Err(CdsError::corrupt(format!("unexpected tiff field type {other}")));
            }
        };
        let total = count
            .checked_mul(size)
            .ok_or_else(|| CdsError::corrupt("tiff field count overflows"))?;
        let base = if total <= 4 {
            entry + 8
        } else {
            self.u32_at(entry + 8)? as usize
        };
        if base.checked_add(total).map_or(true, |end| end > self.bytes.len()) {
            return Err(CdsError::corrupt("tiff field data outside buffer"));
        }
        (0..count)
            .map(|i| match kind {
                TYPE_SHORT => self.u16_at(base + i * 2).map(u32::from),
                _ => self.u32_at(base + i * 4),
            })
            .collect()
    }
}

/// Parses the header and first IFD.
pub fn read_layout(bytes: &[u8]) -> CdsResult<TiffLayout> {
    let big_endian = match bytes.get(0..2) {
        Some(b"II") => false,
        Some(b"MM") => true,
        _ => return Err(CdsError::corrupt("missing tiff byte order mark")),
    };
    let reader = Reader { bytes, big_endian };
    if reader.u16_at(2)? != 42 {
        return Err(CdsError::corrupt("bad tiff magic"));
    }
    let ifd = reader.u32_at(4)? as usize;
    let entries = reader.u16_at(ifd)? as usize;

    let mut width = None;
    let mut height = None;
    let mut bits = vec![1];
    let mut compression = 1;
    let mut samples = 1;
    let mut planar = 1;
    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for i in 0..entries {
        let entry = ifd + 2 + i * 12;
        let tag = reader.u16_at(entry)?;
        match tag {
            TAG_IMAGE_WIDTH => width = first(&reader.values(entry)?),
            TAG_IMAGE_LENGTH => height = first(&reader.values(entry)?),
            TAG_BITS_PER_SAMPLE => bits = reader.values(entry)?,
            TAG_COMPRESSION => compression = first(&reader.values(entry)?).unwrap_or(1),
            TAG_SAMPLES_PER_PIXEL => samples = first(&reader.values(entry)?).unwrap_or(1),
            TAG_PLANAR_CONFIG => planar = first(&reader.values(entry)?).unwrap_or(1),
            TAG_STRIP_OFFSETS => offsets = reader.values(entry)?,
            TAG_STRIP_BYTE_COUNTS => counts = reader.values(entry)?,
            _ => {}
        }
    }

    let (Some(width), Some(height)) = (width, height) else {
        return Err(CdsError::corrupt("tiff is missing image dimensions"));
    };
    if width == 0 || height == 0 {
        return Err(CdsError::corrupt("tiff has an empty image"));
    }
    if samples < 3 {
        return Err(CdsError::UnsupportedFormat {
            reason: format!("tiff with {samples} samples per pixel"),
        });
    }
    if bits.iter().any(|&b| b != 8) {
        return Err(CdsError::UnsupportedFormat {
            reason: "tiff samples are not 8-bit".to_string(),
        });
    }
    if planar != 1 {
        return Err(CdsError::UnsupportedFormat {
            reason: "planar tiff".to_string(),
        });
    }
    let compression = Compression::from_tag(compression)?;
    if offsets.is_empty() || offsets.len() != counts.len() {
        return Err(CdsError::corrupt("tiff strip tables are missing or mismatched"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(samples as usize))
        .ok_or_else(|| CdsError::corrupt("tiff dimensions overflow"))?;
    Ok(TiffLayout {
        width: width as usize,
        height: height as usize,
        samples_per_pixel: samples as usize,
        compression,
        strip_offsets: offsets,
        strip_byte_counts: counts,
    })
}

/// Decodes the first IFD into RGB, stopping once `range` is covered.
pub fn decode(bytes: &[u8], range: DecodeRange) -> CdsResult<DecodedImage> {
    let layout = read_layout(bytes)?;
    let spp = layout.samples_per_pixel;
    let rgb_cutoff = range.rgb_cutoff(layout.width, layout.height);
    let raw_cutoff = (rgb_cutoff / 3)
        .checked_mul(spp)
        .ok_or_else(|| CdsError::corrupt("tiff dimensions overflow"))?;

    let stored: usize = layout
        .strip_byte_counts
        .iter()
        .fold(0usize, |acc, &count| acc.saturating_add(count as usize))
        .min(bytes.len());
    let supply = match layout.compression {
        Compression::None => stored,
        Compression::PackBits => packbits::max_decoded_len(stored),
    };
    if supply < raw_cutoff {
        return Err(CdsError::corrupt("tiff strips are too short for the image"));
    }

    let mut raw = Vec::with_capacity(raw_cutoff);
    for (&offset, &count) in layout.strip_offsets.iter().zip(&layout.strip_byte_counts) {
        if raw.len() >= raw_cutoff {
            break;
        }
        let start = offset as usize;
        let strip = start
            .checked_add(count as usize)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| CdsError::corrupt("tiff strip outside buffer"))?;
        match layout.compression {
            Compression::None => {
                let take = strip.len().min(raw_cutoff - raw.len());
                raw.extend_from_slice(&strip[..take]);
            }
            Compression::PackBits => packbits::decode_into(strip, &mut raw, raw_cutoff)?,
        }
    }
    if raw.len() < raw_cutoff {
        return Err(CdsError::corrupt("tiff strips end before the image does"));
    }

    let rgb = if spp == 3 {
        raw
    } else {
        raw.chunks_exact(spp).flat_map(|px| [px[0], px[1], px[2]]).collect()
    };
    DecodedImage::from_prefix(rgb, layout.width, layout.height)
}

/// Encodes interleaved 8-bit samples as a little-endian baseline TIFF.
///
/// Strips hold `rows_per_strip` rows; with PackBits each row is packed on
/// its own.
pub fn encode(
    samples: &[u8],
    width: usize,
    height: usize,
    samples_per_pixel: usize,
    compression: Compression,
    rows_per_strip: usize,
) -> CdsResult<Vec<u8>> {
    if width == 0 || height == 0 || rows_per_strip == 0 || samples_per_pixel < 3 {
        return Err(CdsError::InvalidDimensions { width, height });
    }
    let row_len = width * samples_per_pixel;
    if samples.len() != row_len * height {
        return Err(CdsError::BufferTooSmall {
            needed: row_len * height,
            got: samples.len(),
        });
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for strip in samples.chunks(row_len * rows_per_strip) {
        let start = out.len();
        match compression {
            Compression::None => out.extend_from_slice(strip),
            Compression::PackBits => {
                for row in strip.chunks(row_len) {
                    out.extend_from_slice(&packbits::encode(row));
                }
            }
        }
        offsets.push(start as u32);
        counts.push((out.len() - start) as u32);
    }
    if out.len() % 2 == 1 {
        out.push(0);
    }

    let bits = vec![8u32; samples_per_pixel];
    let entries: Vec<(u16, u16, Vec<u32>)> = vec![
        (TAG_IMAGE_WIDTH, TYPE_LONG, vec![width as u32]),
        (TAG_IMAGE_LENGTH, TYPE_LONG, vec![height as u32]),
        (TAG_BITS_PER_SAMPLE, TYPE_SHORT, bits),
        (TAG_COMPRESSION, TYPE_SHORT, vec![u32::from(compression.tag())]),
        (TAG_PHOTOMETRIC, TYPE_SHORT, vec![2]),
        (TAG_STRIP_OFFSETS, TYPE_LONG, offsets),
        (TAG_SAMPLES_PER_PIXEL, TYPE_SHORT, vec![samples_per_pixel as u32]),
        (TAG_ROWS_PER_STRIP, TYPE_LONG, vec![rows_per_strip as u32]),
        (TAG_STRIP_BYTE_COUNTS, TYPE_LONG, counts),
        (TAG_PLANAR_CONFIG, TYPE_SHORT, vec![1]),
    ];

    let ifd = out.len();
    out[4..8].copy_from_slice(&(ifd as u32).to_le_bytes());
    let mut extra = ifd + 2 + entries.len() * 12 + 4;
    let mut overflow = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, values) in &entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&(values.len() as u32).to_le_bytes());
        let encoded = encode_values(*kind, values);
        if encoded.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..encoded.len()].copy_from_slice(&encoded);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(extra as u32).to_le_bytes());
            extra += encoded.len();
            overflow.extend_from_slice(&encoded);
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&overflow);
    Ok(out)
}

/// Encodes packed RGB as an uncompressed or PackBits TIFF.
pub fn encode_rgb(
    pixels: &[u8],
    width: usize,
    height: usize,
    compression: Compression,
) -> CdsResult<Vec<u8>> {
    encode(pixels, width, height, 3, compression, 16)
}

fn encode_values(kind: u16, values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        if kind == TYPE_SHORT {
            out.extend_from_slice(&(v as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

fn first(values: &[u32]) -> Option<u32> {
    values.first().copied()
}

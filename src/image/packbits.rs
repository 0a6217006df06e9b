//! PackBits run-length codec (TIFF compression 32773).
//!
//! A control byte `n` read as `i8` selects the run kind: `0..=127` copies the
//! next `n + 1` literal bytes, `-127..=-1` repeats the next byte `1 - n`
//! times, and `-128` is a no-op.

use crate::util::{CdsError, CdsResult};

const MAX_RUN: usize = 128;

/// Upper bound on the decoded size of `packed_len` PackBits bytes. A two byte
/// repeat run is the densest encoding.
pub fn max_decoded_len(packed_len: usize) -> usize {
    (packed_len / 2).saturating_mul(MAX_RUN)
}

/// Appends the decoded form of `src` to `out`, stopping as soon as `out`
/// holds `cutoff` bytes, even in the middle of a run.
pub fn decode_into(src: &[u8], out: &mut Vec<u8>, cutoff: usize) -> CdsResult<()> {
    let mut i = 0;
    while i < src.len() && out.len() < cutoff {
        let n = src[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let len = n as usize + 1;
                let literal = src
                    .get(i..i + len)
                    .ok_or_else(|| CdsError::corrupt("packbits literal run overruns strip"))?;
                let take = len.min(cutoff - out.len());
                out.extend_from_slice(&literal[..take]);
                i += len;
            }
            -127..=-1 => {
                let byte = *src
                    .get(i)
                    .ok_or_else(|| CdsError::corrupt("packbits repeat run overruns strip"))?;
                i += 1;
                let count = (1 - n as isize) as usize;
                let take = count.min(cutoff - out.len());
                out.resize(out.len() + take, byte);
            }
            -128 => {}
        }
    }
    Ok(())
}

/// Decodes a whole PackBits stream, optionally capped at `limit` bytes.
pub fn decode(src: &[u8], limit: Option<usize>) -> CdsResult<Vec<u8>> {
    let bound = max_decoded_len(src.len());
    let mut out = Vec::with_capacity(limit.map_or(bound, |limit| limit.min(bound)));
    decode_into(src, &mut out, limit.unwrap_or(usize::MAX))?;
    Ok(out)
}

/// Encodes bytes as PackBits. Runs of two or more equal bytes become repeat
/// runs; everything else is emitted as literal runs of at most 128 bytes.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / MAX_RUN + 1);
    let mut i = 0;
    while i < src.len() {
        let run = run_length(&src[i..]);
        if run >= 2 {
            out.push((1 - run as i16) as i8 as u8);
            out.push(src[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < src.len() && i - start < MAX_RUN && run_length(&src[i..]) < 2 {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&src[start..i]);
    }
    out
}

fn run_length(src: &[u8]) -> usize {
    let first = src[0];
    src.iter().take(MAX_RUN).take_while(|&&b| b == first).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_classic_example() {
        // Apple technical note example stream.
        let packed = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(decode(&packed, None).unwrap(), expected);
    }

    #[test]
    fn cutoff_stops_mid_run() {
        let packed = [0x81, 7, 0x02, 1, 2, 3];
        assert_eq!(decode(&packed, Some(5)).unwrap(), vec![7; 5]);
        assert_eq!(decode(&packed, Some(129)).unwrap().len(), 129);
        assert_eq!(decode(&packed, None).unwrap().len(), 128 + 3);
    }

    #[test]
    fn no_op_control_byte_is_skipped() {
        assert_eq!(decode(&[0x80, 0x00, 5, 0x80], None).unwrap(), vec![5]);
    }

    #[test]
    fn encode_then_decode_mixed_runs() {
        let data = [1, 2, 3, 3, 3, 3, 4, 5, 5, 6];
        let packed = encode(&data);
        assert_eq!(packed, vec![0x01, 1, 2, 0xFD, 3, 0x00, 4, 0xFF, 5, 0x00, 6]);
        assert_eq!(decode(&packed, None).unwrap(), data);
    }

    #[test]
    fn huge_limit_only_reserves_what_the_input_can_produce() {
        let out = decode(&[0x81, 3], Some(usize::MAX)).unwrap();
        assert_eq!(out, vec![3; 128]);
        assert!(out.len() <= max_decoded_len(2));
        assert_eq!(max_decoded_len(1), 0);
    }

    #[test]
    fn truncated_literal_is_corrupt() {
        let err = decode(&[0x04, 1, 2], None).unwrap_err();
        assert!(matches!(err, CdsError::CorruptImage { .. }));
    }

    #[test]
    fn long_runs_are_split() {
        let data = vec![9u8; 300];
        let packed = encode(&data);
        assert_eq!(packed, vec![0x81, 9, 0x81, 9, 0xD5, 9]);
        assert_eq!(decode(&packed, None).unwrap(), data);
    }
}

//! Run/span encoding of the rotated bitstream, plus the span-length
//! header shared with the frame layer.
//!
//! Bitstream headers are one byte. High bit clear: `(h & 0x7F) + 1`
//! zero bytes. High bit set: `(h & 0x7F) + 1` literal bytes follow.
//! There is no terminator; the decoder stops at the expected length.

use crate::error::CodecError;

/// Longest run one header can describe.
pub const MAX_RUN: usize = 128;

// ── Span-length header ───────────────────────────────────────────

/// Append the header announcing a span of `n` pixels (`n >= 1`).
///
/// `n < 128` is the single byte `n - 1`. Longer spans write `0x7F`
/// followed by `0xFF` once per 255 pixels beyond 128 and a final
/// remainder byte below `0xFF`. The first byte never has its high bit
/// set.
pub fn write_span_len(n: usize, out: &mut Vec<u8>) {
    debug_assert!(n >= 1, "span length must be positive");
    if n < MAX_RUN {
        out.push((n - 1) as u8);
        return;
    }
    out.push(0x7F);
    let mut rest = n - MAX_RUN;
    while rest >= 0xFF {
        out.push(0xFF);
        rest -= 0xFF;
    }
    out.push(rest as u8);
}

/// Parse a span-length header from the start of `src`.
///
/// Returns the span length and the number of header bytes. `base` is
/// the offset of `src` in the whole stream, used for error reporting.
pub fn read_span_len(src: &[u8], base: usize) -> Result<(usize, usize), CodecError> {
    let first = *src.first().ok_or(CodecError::Truncated { offset: base })?;
    let mut n = first as usize + 1;
    let mut used = 1;
    if n == MAX_RUN {
        loop {
            let b = *src.get(used).ok_or(CodecError::Truncated {
                offset: base + used,
            })?;
            used += 1;
            n += b as usize;
            if b != 0xFF {
                break;
            }
        }
    }
    Ok((n, used))
}

// ── Bitstream ────────────────────────────────────────────────────

fn push_zero_run(mut run: usize, out: &mut Vec<u8>) {
    while run > MAX_RUN {
        out.push(0x7F);
        run -= MAX_RUN;
    }
    out.push((run - 1) as u8);
}

/// Append the run/literal encoding of `data` to `out`.
pub fn encode_into(data: &[u8], out: &mut Vec<u8>) {
    let len = data.len();
    let mut i = 0;
    while i < len {
        if data[i] == 0 {
            let start = i;
            while i < len && data[i] == 0 {
                i += 1;
            }
            push_zero_run(i - start, out);
            continue;
        }

        // A literal swallows isolated zeros and ends before two in a row.
        let start = i;
        i += 1;
        while i - start < MAX_RUN
            && i < len
            && (data[i] != 0 || (i + 1 < len && data[i + 1] != 0))
        {
            i += 1;
        }
        out.push(0x80 | (i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
}

/// Run/literal encode `data`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 + 16);
    encode_into(data, &mut out);
    out
}

/// Decode exactly `expected_len` bytes from the front of `src`.
///
/// Returns the decoded bytes and how many input bytes were consumed.
/// `base` is the offset of `src` in the whole stream, used in errors.
pub fn decode(
    src: &[u8],
    expected_len: usize,
    base: usize,
) -> Result<(Vec<u8>, usize), CodecError> {
    let mut out = vec![0u8; expected_len];
    let mut pos = 0;
    let mut off = 0;

    while pos < expected_len {
        let header = *src.get(off).ok_or(CodecError::Truncated { offset: base + off })?;
        let n = (header & 0x7F) as usize + 1;
        if pos + n > expected_len {
            return Err(CodecError::Overrun {
                offset: base + off,
                limit: expected_len,
            });
        }
        off += 1;

        if header & 0x80 != 0 {
            let literal = src.get(off..off + n).ok_or(CodecError::Truncated {
                offset: base + src.len(),
            })?;
            out[pos..pos + n].copy_from_slice(literal);
            off += n;
        }
        pos += n;
    }
    Ok((out, off))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARIES: [usize; 6] = [127, 128, 129, 255, 256, 382];

    fn round_trip(data: &[u8]) -> Vec<u8> {
        let enc = encode(data);
        let (dec, used) = decode(&enc, data.len(), 0).unwrap();
        assert_eq!(used, enc.len());
        dec
    }

    #[test]
    fn span_len_header_shapes() {
        let mut out = Vec::new();
        write_span_len(1, &mut out);
        assert_eq!(out, [0x00]);

        out.clear();
        write_span_len(127, &mut out);
        assert_eq!(out, [0x7E]);

        out.clear();
        write_span_len(128, &mut out);
        assert_eq!(out, [0x7F, 0x00]);

        out.clear();
        write_span_len(383, &mut out);
        assert_eq!(out, [0x7F, 0xFF, 0x00]);

        out.clear();
        write_span_len(382, &mut out);
        assert_eq!(out, [0x7F, 0xFE]);
    }

    #[test]
    fn span_len_round_trip() {
        for n in [1, 2, 127, 128, 129, 255, 256, 382, 383, 384, 637, 638, 518_400] {
            let mut out = Vec::new();
            write_span_len(n, &mut out);
            assert!(out[0] & 0x80 == 0);
            assert_eq!(read_span_len(&out, 0).unwrap(), (n, out.len()), "n {n}");
        }
    }

    #[test]
    fn span_len_truncated() {
        assert_eq!(
            read_span_len(&[0x7F, 0xFF], 10),
            Err(CodecError::Truncated { offset: 12 })
        );
        assert_eq!(read_span_len(&[], 3), Err(CodecError::Truncated { offset: 3 }));
    }

    #[test]
    fn zero_runs_at_boundaries() {
        for n in BOUNDARIES {
            let data = vec![0u8; n];
            let enc = encode(&data);
            assert!(enc.iter().all(|&h| h & 0x80 == 0));
            assert_eq!(round_trip(&data), data, "run {n}");
        }
        assert_eq!(encode(&[0; 128]), [0x7F]);
        assert_eq!(encode(&[0; 129]), [0x7F, 0x00]);
    }

    #[test]
    fn literals_at_boundaries() {
        for n in BOUNDARIES {
            let data: Vec<u8> = (0..n).map(|i| (i % 255) as u8 + 1).collect();
            assert_eq!(round_trip(&data), data, "literal {n}");
        }
        let data = vec![9u8; 129];
        let enc = encode(&data);
        assert_eq!(enc[0], 0xFF);
        assert_eq!(enc[129], 0x80);
        assert_eq!(enc.len(), 131);
    }

    #[test]
    fn single_zero_is_absorbed() {
        let enc = encode(&[5, 0, 6]);
        assert_eq!(enc, [0x82, 5, 0, 6]);
    }

    #[test]
    fn double_zero_breaks_literal() {
        let enc = encode(&[5, 0, 0, 6]);
        assert_eq!(enc, [0x80, 5, 0x01, 0x80, 6]);
    }

    #[test]
    fn trailing_zero_after_literal() {
        let enc = encode(&[5, 0]);
        assert_eq!(enc, [0x80, 5, 0x00]);
        assert_eq!(round_trip(&[5, 0]), [5, 0]);
    }

    #[test]
    fn expansion_is_bounded() {
        let data: Vec<u8> = (0..4096).map(|i| if i % 3 == 0 { 7 } else { 0 }).collect();
        assert!(encode(&data).len() <= 2 * data.len());
        let noise: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 255) as u8 + 1).collect();
        assert!(encode(&noise).len() <= 2 * noise.len());
    }

    #[test]
    fn decode_rejects_truncation() {
        let err = decode(&[0x83, 1, 2], 4, 0).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));

        let err = decode(&[0x00], 4, 0).unwrap_err();
        assert_eq!(err, CodecError::Truncated { offset: 1 });
    }

    #[test]
    fn decode_rejects_overrun() {
        let err = decode(&[0x09], 4, 20).unwrap_err();
        assert_eq!(err, CodecError::Overrun { offset: 20, limit: 4 });
    }

    #[test]
    fn decode_stops_at_expected_len() {
        let (out, used) = decode(&[0x01, 0x80, 9, 0xAA, 0xBB], 3, 0).unwrap();
        assert_eq!(out, [0, 0, 9]);
        assert_eq!(used, 3);
    }
}

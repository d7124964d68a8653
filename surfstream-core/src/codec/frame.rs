//! Frame-level stream: a sequence of skip and span segments.
//!
//! ```text
//! skip (short)  11nnnnnn               (n & 63) + 1 zero pixels
//! skip (long)   10hhhhhh llllllll      ((h << 8) | l) + 65 zero pixels
//! span          span-length header     then the span-encoded,
//!                                      rotated, delta-folded pixels
//! ```
//!
//! A span header's first byte always has its high bit clear, so one
//! byte is enough to tell the segment kinds apart.

use super::{delta, rotate, span};
use crate::error::CodecError;

const SHORT_SKIP_MAX: usize = 64;
const LONG_SKIP_MIN: usize = 65;
const LONG_SKIP_MAX: usize = LONG_SKIP_MIN + 0x3FFF;

// ── Encoding ─────────────────────────────────────────────────────

fn push_skip(mut n: usize, out: &mut Vec<u8>) {
    while n > LONG_SKIP_MAX {
        out.push(0xBF);
        out.push(0xFF);
        n -= LONG_SKIP_MAX;
    }
    if n == 0 {
        return;
    }
    if n <= SHORT_SKIP_MAX {
        out.push(0xC0 | (n - 1) as u8);
    } else {
        let v = n - LONG_SKIP_MIN;
        out.push(0x80 | (v >> 8) as u8);
        out.push(v as u8);
    }
}

fn push_span(pixels: &[u8], row_len: usize, out: &mut Vec<u8>) {
    span::write_span_len(pixels.len(), out);
    let planes = rotate::rotate(&delta::encode(pixels, row_len));
    span::encode_into(&planes, out);
}

/// Encode the whole buffer as one span segment.
pub fn compress_dense(pixels: &[u8], row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 8 + 16);
    if !pixels.is_empty() {
        push_span(pixels, row_len, &mut out);
    }
    out
}

/// Encode zero runs of two or more pixels as skip segments and the
/// stretches between them as independent span segments.
pub fn compress_sparse(pixels: &[u8], row_len: usize) -> Vec<u8> {
    let len = pixels.len();
    let zero_pair = |i: usize| pixels[i] == 0 && i + 1 < len && pixels[i + 1] == 0;

    let mut out = Vec::with_capacity(len / 16 + 16);
    let mut i = 0;
    while i < len {
        let start = i;
        if zero_pair(i) {
            while i < len && pixels[i] == 0 {
                i += 1;
            }
            push_skip(i - start, &mut out);
        } else {
            i += 1;
            while i < len && !zero_pair(i) {
                i += 1;
            }
            push_span(&pixels[start..i], row_len, &mut out);
        }
    }
    out
}

// ── Decoding ─────────────────────────────────────────────────────

/// Decode a frame stream of either mode into exactly `expected_len`
/// pixels.
pub fn decompress(src: &[u8], expected_len: usize, row_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![0u8; expected_len];
    let mut pos = 0;
    let mut off = 0;

    while off < src.len() {
        let first = src[off];
        let (n, header_len) = if first & 0x80 == 0 {
            span::read_span_len(&src[off..], off)?
        } else if first & 0x40 != 0 {
            ((first & 0x3F) as usize + 1, 1)
        } else {
            let lo = *src.get(off + 1).ok_or(CodecError::Truncated { offset: off + 1 })?;
            let hi = ((first & 0x3F) as usize) << 8;
            ((hi | lo as usize) + LONG_SKIP_MIN, 2)
        };

        if pos + n > expected_len {
            return Err(CodecError::Overrun {
                offset: off,
                limit: expected_len,
            });
        }
        off += header_len;

        if first & 0x80 == 0 {
            let (planes, used) = span::decode(&src[off..], n, off)?;
            let mut pixels = rotate::unrotate(&planes);
            delta::decode_in_place(&mut pixels, row_len);
            out[pos..pos + n].copy_from_slice(&pixels);
            off += used;
        }
        pos += n;
    }

    if pos != expected_len {
        return Err(CodecError::LengthMismatch {
            expected: expected_len,
            actual: pos,
        });
    }
    Ok(out)
}

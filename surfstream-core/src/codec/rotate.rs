//! Bit-plane rotation.
//!
//! Groups of 8 bytes are transposed as an 8×8 bit matrix so output
//! byte `k` of a group collects bit `k` of each input byte. Byte `k` of
//! group `g` lands at `k * groups + g`, which lines up same-significance
//! bits of the whole span into eight contiguous planes. Delta-folded
//! pixel data is mostly small numbers, so the high planes come out as
//! long zero runs for the span encoder.

use super::tables::SHUFFLE;
use crate::parallel;

/// Butterfly over 8 bytes: nibbles of neighbouring bytes are merged,
/// then bit pairs, then single bits. Bits come out in the right byte
/// but with positions 1/4 and 3/6 exchanged; [`SHUFFLE`] puts them back.
#[inline]
fn butterfly8(src: [u8; 8]) -> [u8; 8] {
    let mut n = [0u8; 8];
    for p in 0..4 {
        let (lo, hi) = (src[2 * p], src[2 * p + 1]);
        n[p] = (lo & 0x0F) | (hi << 4);
        n[p + 4] = (hi & 0xF0) | (lo >> 4);
    }

    let mut q = [0u8; 8];
    for h in [0, 4] {
        let [a, b, c, d] = [n[h], n[h + 1], n[h + 2], n[h + 3]];
        q[h] = (a & 0x33) | ((b & 0x33) << 2);
        q[h + 1] = (c & 0x33) | ((d & 0x33) << 2);
        q[h + 2] = (b & 0xCC) | ((a & 0xCC) >> 2);
        q[h + 3] = (d & 0xCC) | ((c & 0xCC) >> 2);
    }

    let mut x = [0u8; 8];
    for p in [0, 2, 4, 6] {
        let (a, c) = (q[p], q[p + 1]);
        x[p] = (a & 0x55) | ((c & 0x55) << 1);
        x[p + 1] = (c & 0xAA) | ((a & 0xAA) >> 1);
    }
    x
}

/// 8×8 bit transpose: afterwards bit `j` of `x[k]` is the former bit
/// `k` of `x[j]`. Applying it twice restores the input.
#[inline]
pub fn transpose8(x: [u8; 8]) -> [u8; 8] {
    butterfly8(x).map(|b| SHUFFLE[b as usize])
}

fn group(bytes: &[u8]) -> [u8; 8] {
    let mut x = [0u8; 8];
    x.copy_from_slice(&bytes[..8]);
    x
}

/// Rotate `src` into bit planes. The output has the same length.
pub fn rotate(src: &[u8]) -> Vec<u8> {
    let groups = src.len() / 8;
    let bulk = groups * 8;
    let mut out = vec![0u8; src.len()];

    if groups > 0 {
        let transposed = parallel::map_chunks(&src[..bulk], 8, |_, chunk| {
            transpose8(group(chunk))
        });
        parallel::for_each_chunk_mut(&mut out[..bulk], groups, |k, plane| {
            for (dst, t) in plane.iter_mut().zip(&transposed) {
                *dst = t[k];
            }
        });
    }

    // Remainder: packed plane-major, one bit at a time.
    let tail = &src[bulk..];
    let mut pos = bulk * 8;
    for bit in 0..8 {
        for &b in tail {
            out[pos >> 3] |= ((b >> bit) & 1) << (pos & 7);
            pos += 1;
        }
    }
    out
}

/// Inverse of [`rotate`].
pub fn unrotate(src: &[u8]) -> Vec<u8> {
    let groups = src.len() / 8;
    let bulk = groups * 8;
    let mut out = vec![0u8; src.len()];

    if groups > 0 {
        let planes = &src[..bulk];
        parallel::for_each_chunk_mut(&mut out[..bulk], 8, |g, dst| {
            let mut x = [0u8; 8];
            for (k, b) in x.iter_mut().enumerate() {
                *b = planes[k * groups + g];
            }
            dst.copy_from_slice(&transpose8(x));
        });
    }

    let tail = &mut out[bulk..];
    let mut pos = bulk * 8;
    for bit in 0..8 {
        for b in tail.iter_mut() {
            *b |= ((src[pos >> 3] >> (pos & 7)) & 1) << bit;
            pos += 1;
        }
    }
    out
}

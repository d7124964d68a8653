//! Delta + sign-fold stage.
//!
//! Every byte is replaced by the folded difference to the byte before
//! it; the first byte of a span is diffed against an implicit zero.
//! Encoding is embarrassingly parallel because each row reads its
//! predecessor straight from the source. Decoding is a running sum, so
//! it runs in three passes: per-row local prefix sums, a sequential
//! carry over the row tails, then a per-row carry add.

use super::tables::{decode_byte, encode_byte};
use crate::parallel;

/// Delta-encode `src`, working on `row_len`-byte rows in parallel.
pub fn encode(src: &[u8], row_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let row_len = row_len.max(1);

    parallel::for_each_chunk_mut(&mut out, row_len, |row, dst| {
        let start = row * row_len;
        let mut prev = if start == 0 { 0 } else { src[start - 1] };
        for (d, &s) in dst.iter_mut().zip(&src[start..]) {
            *d = encode_byte(s.wrapping_sub(prev));
            prev = s;
        }
    });
    out
}

/// Undo [`encode`] in place.
pub fn decode_in_place(buf: &mut [u8], row_len: usize) {
    let row_len = row_len.max(1);

    // Local running sums; each row reports its final value.
    let tails = parallel::map_chunks_mut(buf, row_len, |_, row| {
        let mut acc = 0u8;
        for b in row.iter_mut() {
            acc = acc.wrapping_add(decode_byte(*b));
            *b = acc;
        }
        acc
    });

    let mut carries = Vec::with_capacity(tails.len());
    let mut carry = 0u8;
    for tail in tails {
        carries.push(carry);
        carry = carry.wrapping_add(tail);
    }

    parallel::for_each_chunk_mut(buf, row_len, |row, chunk| {
        let c = carries[row];
        if c != 0 {
            for b in chunk.iter_mut() {
                *b = b.wrapping_add(c);
            }
        }
    });
}

/// Owned variant of [`decode_in_place`].
pub fn decode(encoded: &[u8], row_len: usize) -> Vec<u8> {
    let mut buf = encoded.to_vec();
    decode_in_place(&mut buf, row_len);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential_encode(src: &[u8]) -> Vec<u8> {
        let mut prev = 0u8;
        src.iter()
            .map(|&b| {
                let d = encode_byte(b.wrapping_sub(prev));
                prev = b;
                d
            })
            .collect()
    }

    #[test]
    fn constant_input_encodes_to_zeros() {
        let src = vec![77u8; 4000];
        let enc = encode(&src, 960);
        assert_eq!(enc[0], encode_byte(77));
        assert!(enc[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn matches_sequential_reference() {
        let src: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 253) as u8).collect();
        assert_eq!(encode(&src, 960), sequential_encode(&src));
    }

    #[test]
    fn round_trip_large_frame() {
        let src: Vec<u8> = (0..518_400u32)
            .map(|i| if i % 97 < 5 { (i % 256) as u8 } else { 0 })
            .collect();
        let enc = encode(&src, 960);
        assert_eq!(decode(&enc, 960), src);
    }

    #[test]
    fn round_trip_ragged_last_row() {
        let src: Vec<u8> = (0..1001u32).map(|i| (i ^ (i >> 3)) as u8).collect();
        let enc = encode(&src, 64);
        assert_eq!(decode(&enc, 64), src);
    }

    #[test]
    fn empty_span() {
        assert!(encode(&[], 960).is_empty());
        assert!(decode(&[], 960).is_empty());
    }
}

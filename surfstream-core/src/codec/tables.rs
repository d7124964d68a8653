//! Constant lookup tables used by the codec.
//!
//! All three tables are built at compile time and are plain `static`
//! data, so any number of worker threads can read them at once.

// ── Sign folding ─────────────────────────────────────────────────

const fn build_fold() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b & 0x80 != 0 {
            ((b ^ 0x7F) << 1) | 1
        } else {
            b << 1
        };
        i += 1;
    }
    table
}

const fn invert(table: &[u8; 256]) -> [u8; 256] {
    let mut inverse = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        inverse[table[i] as usize] = i as u8;
        i += 1;
    }
    inverse
}

/// Maps a wrapping byte delta to a code where small magnitudes of
/// either sign become small values: `0, -1, 1, -2, 2, ...` fold onto
/// `0, 1, 2, 3, 4, ...`.
pub static FOLD: [u8; 256] = build_fold();

/// Exact inverse of [`FOLD`].
pub static UNFOLD: [u8; 256] = invert(&FOLD);

/// Fold a delta into its code.
#[inline]
pub fn encode_byte(delta: u8) -> u8 {
    FOLD[delta as usize]
}

/// Recover the delta from its folded code.
#[inline]
pub fn decode_byte(code: u8) -> u8 {
    UNFOLD[code as usize]
}

// ── Bit shuffle ──────────────────────────────────────────────────

const fn build_shuffle() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        let keep = b & 0xA5;
        let b1 = (b >> 1) & 1;
        let b3 = (b >> 3) & 1;
        let b4 = (b >> 4) & 1;
        let b6 = (b >> 6) & 1;
        table[i] = keep | (b4 << 1) | (b1 << 4) | (b6 << 3) | (b3 << 6);
        i += 1;
    }
    table
}

/// Bit permutation applied to every transposed byte: bits 1 and 4
/// trade places, as do bits 3 and 6. The permutation is its own
/// inverse.
pub static SHUFFLE: [u8; 256] = build_shuffle();

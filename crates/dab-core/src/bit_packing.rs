//! Bit Packing and Unpacking
//!
//! Everything on the DAB air interface is transmitted MSB first. The
//! Viterbi chainback packs its output that way, and the reference encoder
//! consumes packed bytes the same way.
//!
//! ```rust
//! use dab_core::bit_packing::{pack_bits, unpack_bits};
//!
//! let bits = unpack_bits(&[0b1010_0001], 8);
//! assert_eq!(bits, vec![true, false, true, false, false, false, false, true]);
//! assert_eq!(pack_bits(&bits), vec![0b1010_0001]);
//! ```

/// Unpack the first `nbits` bits of `bytes`, MSB first.
///
/// Bits past the end of `bytes` read as `false`.
pub fn unpack_bits(bytes: &[u8], nbits: usize) -> Vec<bool> {
    (0..nbits).map(|i| read_bit(bytes, i)).collect()
}

/// Pack bits MSB first; a trailing partial byte is zero padded.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

/// Read bit `index` (MSB first) from a packed buffer.
#[inline]
pub fn read_bit(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index / 8)
        .map(|b| b & (0x80 >> (index % 8)) != 0)
        .unwrap_or(false)
}

/// Read an unsigned field of `width` bits (<= 32) starting at bit `offset`.
#[inline]
pub fn read_bits(bytes: &[u8], offset: usize, width: usize) -> u32 {
    debug_assert!(width <= 32);
    (0..width).fold(0u32, |acc, i| (acc << 1) | read_bit(bytes, offset + i) as u32)
}

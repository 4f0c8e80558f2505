//! Time deinterleaving of MSC sub-channels (EN 300 401, clause 12)
//!
//! The transmitter delays bit `i` of every logical frame by `r(i)` CIFs,
//! with `r(i)` the 4-bit bit-reversal of `i mod 16`. The receiver delays the
//! same bit by `15 - r(i)`, so every bit ends up exactly 15 CIFs late.
//!
//! ```text
//!  i mod 16 : 0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
//!  r(i)     : 0  8  4 12  2 10  6 14  1  9  5 13  3 11  7 15
//! ```

use crate::types::{DabError, DabResult, SoftBit};

/// Interleaving depth in CIFs.
pub const DEPTH: usize = 16;

/// Transmit-side delay of bit `i`, in CIFs.
pub const fn interleave_delay(i: usize) -> usize {
    let v = i % DEPTH;
    ((v & 1) << 3) | ((v & 2) << 1) | ((v & 4) >> 1) | ((v & 8) >> 3)
}

/// Delay lines of one sub-channel.
#[derive(Debug, Clone)]
pub struct TimeDeinterleaver {
    nbits: usize,
    history: Vec<Vec<SoftBit>>,
    position: usize,
    seen: usize,
}

impl TimeDeinterleaver {
    /// Deinterleaver for logical frames of `nbits` soft bits.
    pub fn new(nbits: usize) -> Self {
        Self {
            nbits,
            history: vec![vec![0; nbits]; DEPTH],
            position: 0,
            seen: 0,
        }
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }

    /// Whether the delay lines have been filled once.
    pub fn is_primed(&self) -> bool {
        self.seen >= DEPTH
    }

    /// Feed the sub-channel bits of one CIF.
    ///
    /// Returns `true` once `out` holds a complete logical frame, which is
    /// the case from the 16th CIF on.
    pub fn push(&mut self, cif: &[SoftBit], out: &mut [SoftBit]) -> DabResult<bool> {
        if cif.len() != self.nbits || out.len() != self.nbits {
            return Err(DabError::SegmentLength {
                segment: "sub-channel",
                expected: self.nbits,
                actual: if cif.len() != self.nbits { cif.len() } else { out.len() },
            });
        }

        self.history[self.position].copy_from_slice(cif);
        for (i, o) in out.iter_mut().enumerate() {
            let delay = DEPTH - 1 - interleave_delay(i);
            let slot = (self.position + DEPTH - delay) % DEPTH;
            *o = self.history[slot][i];
        }
        self.position = (self.position + 1) % DEPTH;
        self.seen = self.seen.saturating_add(1);
        Ok(self.is_primed())
    }

    pub fn reset(&mut self) {
        for line in &mut self.history {
            line.fill(0);
        }
        self.position = 0;
        self.seen = 0;
    }
}

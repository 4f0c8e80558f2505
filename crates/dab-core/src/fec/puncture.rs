//! Puncturing vectors and depuncturing (EN 300 401, clause 11.1.2)
//!
//! DAB raises the rate of the 1/4 mother code by deleting bits according to
//! one of 24 puncturing vectors PI1..PI24. A vector covers 32 mother code
//! bits (8 data bits) and keeps `8 + V` of them. Vectors are applied to
//! blocks of 128 mother code bits, i.e. four times per block, and every
//! stream ends with 24 tail bits punctured by the fixed vector PI_X.
//!
//! On the receive side, depuncturing re-inserts erasures at the deleted
//! positions so the Viterbi decoder sees the full-rate stream again.
//!
//! ```text
//!   PI1  = 1100 1000 1000 1000 1000 1000 1000 1000   (rate 8/9)
//!   PI8  = 1100 1100 1100 1100 1100 1100 1100 1100   (rate 1/2)
//!   PI24 = 1111 1111 1111 1111 1111 1111 1111 1111   (rate 1/4)
//!   PI_X = 1100 1100 1100 1100 1100 1100             (tail)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use dab_core::fec::puncture::PunctureSchedule;
//!
//! // The FIC of mode I: 768 data bits per FIC group
//! let schedule = PunctureSchedule::fic(768);
//! assert_eq!(schedule.punctured_bits(), 2304);
//! assert_eq!(schedule.mother_bits(), (768 + 6) * 4);
//! ```

use crate::types::{DabError, DabResult, SoftBit, SOFT_DECISION_ERASURE};

/// Mother code bits covered by one puncturing vector.
pub const VECTOR_BITS: usize = 32;

/// Mother code bits per puncturing block.
pub const BLOCK_BITS: usize = 4 * VECTOR_BITS;

/// Mother code bits in the trellis termination tail.
pub const TAIL_BITS: usize = 24;

/// Tail puncturing vector, MSB first over 24 bits.
pub const PI_X: u32 = 0xCC_CCCC;

/// Bits kept by [`PI_X`].
pub const TAIL_KEPT_BITS: usize = 12;

/// Order in which the 4-bit groups of a vector receive additional ones.
const GROUP_ORDER: [usize; 8] = [0, 4, 2, 6, 1, 5, 3, 7];

/// PI1..PI24 as 32-bit masks, MSB = first mother code bit.
const PUNCTURE_VECTORS: [u32; 24] = build_vectors();

const fn build_vectors() -> [u32; 24] {
    let mut vectors = [0u32; 24];
    let mut v = 1;
    while v <= 24 {
        let mut mask = 0u32;
        // Every group keeps its first bit
        let mut g = 0;
        while g < 8 {
            mask |= 1 << (31 - 4 * g);
            g += 1;
        }
        let mut extra = v;
        let mut bit = 1;
        while bit < 4 && extra > 0 {
            let mut k = 0;
            while k < 8 && extra > 0 {
                mask |= 1 << (31 - (4 * GROUP_ORDER[k] + bit));
                extra -= 1;
                k += 1;
            }
            bit += 1;
        }
        vectors[v - 1] = mask;
        v += 1;
    }
    vectors
}

/// Mask of puncturing vector PI`index`, for `index` in 1..=24.
pub fn puncture_vector(index: u8) -> Option<u32> {
    match index {
        1..=24 => Some(PUNCTURE_VECTORS[index as usize - 1]),
        _ => None,
    }
}

/// A run of consecutive blocks punctured with the same vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunctureRun {
    /// Number of 128-bit blocks.
    pub blocks: usize,
    /// Vector index (1..=24).
    pub vector: u8,
}

impl PunctureRun {
    pub(crate) const fn new(blocks: usize, vector: u8) -> Self {
        Self { blocks, vector }
    }

    fn mask(&self) -> u32 {
        PUNCTURE_VECTORS[(self.vector.clamp(1, 24) - 1) as usize]
    }

    fn kept_per_block(&self) -> usize {
        4 * self.mask().count_ones() as usize
    }
}

/// Puncturing layout of one codeword: runs of blocks followed by the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunctureSchedule {
    runs: Vec<PunctureRun>,
}

impl PunctureSchedule {
    pub(crate) fn new(runs: Vec<PunctureRun>) -> Self {
        let runs = runs.into_iter().filter(|r| r.blocks > 0).collect();
        Self { runs }
    }

    /// FIC layout for one FIC group of `data_bits` decoded bits:
    /// all blocks but the last three use PI16, those use PI15.
    pub fn fic(data_bits: usize) -> Self {
        let blocks = data_bits / VECTOR_BITS;
        Self::new(vec![
            PunctureRun::new(blocks.saturating_sub(3), 16),
            PunctureRun::new(blocks.min(3), 15),
        ])
    }

    pub fn runs(&self) -> &[PunctureRun] {
        &self.runs
    }

    /// Decoded data bits carried by the codeword, tail excluded.
    pub fn data_bits(&self) -> usize {
        self.runs.iter().map(|r| r.blocks * VECTOR_BITS).sum()
    }

    /// Mother code bits, tail included.
    pub fn mother_bits(&self) -> usize {
        self.runs.iter().map(|r| r.blocks * BLOCK_BITS).sum::<usize>() + TAIL_BITS
    }

    /// Transmitted bits, tail included.
    pub fn punctured_bits(&self) -> usize {
        self.runs
            .iter()
            .map(|r| r.blocks * r.kept_per_block())
            .sum::<usize>()
            + TAIL_KEPT_BITS
    }

    /// Re-insert erasures at punctured positions.
    ///
    /// `out` is cleared and filled with exactly [`mother_bits`](Self::mother_bits)
    /// soft decisions.
    pub fn depuncture_into(&self, input: &[SoftBit], out: &mut Vec<SoftBit>) -> DabResult<()> {
        if input.len() != self.punctured_bits() {
            return Err(DabError::SegmentLength {
                segment: "punctured",
                expected: self.punctured_bits(),
                actual: input.len(),
            });
        }

        out.clear();
        out.reserve(self.mother_bits());
        let mut src = input.iter().copied();
        for run in &self.runs {
            let mask = run.mask();
            for _ in 0..run.blocks * 4 {
                expand(mask, VECTOR_BITS, &mut src, out);
            }
        }
        expand(PI_X, TAIL_BITS, &mut src, out);
        Ok(())
    }

    /// Transmitter-side puncturing of a mother codeword.
    ///
    /// Returns `None` when `mother` is not exactly one codeword long.
    pub fn puncture(&self, mother: &[bool]) -> Option<Vec<bool>> {
        if mother.len() != self.mother_bits() {
            return None;
        }
        let mut out = Vec::with_capacity(self.punctured_bits());
        let mut chunks = mother.chunks_exact(VECTOR_BITS);
        for run in &self.runs {
            let mask = run.mask();
            for chunk in chunks.by_ref().take(run.blocks * 4) {
                out.extend(
                    chunk
                        .iter()
                        .enumerate()
                        .filter(|(p, _)| mask & (1 << (31 - p)) != 0)
                        .map(|(_, &b)| b),
                );
            }
        }
        let tail = &mother[mother.len() - TAIL_BITS..];
        out.extend(
            tail.iter()
                .enumerate()
                .filter(|(p, _)| PI_X & (1 << (TAIL_BITS - 1 - p)) != 0)
                .map(|(_, &b)| b),
        );
        Some(out)
    }
}

/// Expand one vector's worth of kept bits, MSB of `mask` first.
fn expand(
    mask: u32,
    width: usize,
    src: &mut impl Iterator<Item = SoftBit>,
    out: &mut Vec<SoftBit>,
) {
    for p in 0..width {
        if mask & (1 << (width - 1 - p)) != 0 {
            out.push(src.next().unwrap_or(SOFT_DECISION_ERASURE));
        } else {
            out.push(SOFT_DECISION_ERASURE);
        }
    }
}

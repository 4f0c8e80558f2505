//! SSSE3 and AVX2 add-compare-select kernels.
//!
//! Each kernel processes a run of butterflies per instruction and then
//! interleaves the two survivor vectors back into state order, so metrics and
//! decision words come out laid out exactly like the scalar kernel's.
//! `min` picks the same survivor as the scalar `m0 > m1` test: on a tie both
//! select the lower predecessor and report a zero decision bit.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{renormalize, Decision, Metric, Trellis, CODE_RATE, HALF_STATES, NUM_STATES};
use crate::types::SoftBit;

/// # Safety
///
/// The CPU must support SSSE3.
#[target_feature(enable = "ssse3")]
pub(super) unsafe fn update_blk_ssse3(
    trellis: &Trellis,
    metrics: &mut [Metric; NUM_STATES],
    decisions: &mut Vec<Decision>,
    symbols: &[SoftBit],
) {
    const LANES: usize = 8;

    let high = _mm_set1_epi16(trellis.soft_high);
    let low = _mm_set1_epi16(trellis.soft_low);
    let max_bm = _mm_set1_epi16(trellis.max_branch_metric);
    let mut next = [0 as Metric; NUM_STATES];

    for syms in symbols.chunks_exact(CODE_RATE) {
        let mut sym = [_mm_setzero_si128(); CODE_RATE];
        for (v, &s) in sym.iter_mut().zip(syms) {
            *v = _mm_max_epi16(_mm_min_epi16(_mm_set1_epi16(s), high), low);
        }

        let mut decision: Decision = 0;
        for base in (0..HALF_STATES).step_by(LANES) {
            let mut bm = _mm_setzero_si128();
            for (r, s) in sym.iter().enumerate() {
                let expected = _mm_loadu_si128(trellis.branch[r][base..].as_ptr() as *const __m128i);
                bm = _mm_add_epi16(bm, _mm_abs_epi16(_mm_sub_epi16(expected, *s)));
            }
            let cbm = _mm_sub_epi16(max_bm, bm);

            let lower = _mm_loadu_si128(metrics[base..].as_ptr() as *const __m128i);
            let upper = _mm_loadu_si128(metrics[base + HALF_STATES..].as_ptr() as *const __m128i);
            let m0 = _mm_add_epi16(lower, bm);
            let m1 = _mm_add_epi16(upper, cbm);
            let m2 = _mm_add_epi16(lower, cbm);
            let m3 = _mm_add_epi16(upper, bm);

            let d0 = _mm_cmpgt_epi16(m0, m1);
            let d1 = _mm_cmpgt_epi16(m2, m3);
            let even = _mm_min_epi16(m0, m1);
            let odd = _mm_min_epi16(m2, m3);

            let out = next[2 * base..].as_mut_ptr();
            _mm_storeu_si128(out as *mut __m128i, _mm_unpacklo_epi16(even, odd));
            _mm_storeu_si128(out.add(LANES) as *mut __m128i, _mm_unpackhi_epi16(even, odd));

            let packed = _mm_packs_epi16(_mm_unpacklo_epi16(d0, d1), _mm_unpackhi_epi16(d0, d1));
            let bits = _mm_movemask_epi8(packed) as u32 as Decision;
            decision |= bits << (2 * base);
        }

        renormalize(&mut next);
        *metrics = next;
        decisions.push(decision);
    }
}

/// # Safety
///
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn update_blk_avx2(
    trellis: &Trellis,
    metrics: &mut [Metric; NUM_STATES],
    decisions: &mut Vec<Decision>,
    symbols: &[SoftBit],
) {
    const LANES: usize = 16;

    let high = _mm256_set1_epi16(trellis.soft_high);
    let low = _mm256_set1_epi16(trellis.soft_low);
    let max_bm = _mm256_set1_epi16(trellis.max_branch_metric);
    let mut next = [0 as Metric; NUM_STATES];

    for syms in symbols.chunks_exact(CODE_RATE) {
        let mut sym = [_mm256_setzero_si256(); CODE_RATE];
        for (v, &s) in sym.iter_mut().zip(syms) {
            *v = _mm256_max_epi16(_mm256_min_epi16(_mm256_set1_epi16(s), high), low);
        }

        let mut decision: Decision = 0;
        for base in (0..HALF_STATES).step_by(LANES) {
            let mut bm = _mm256_setzero_si256();
            for (r, s) in sym.iter().enumerate() {
                let expected =
                    _mm256_loadu_si256(trellis.branch[r][base..].as_ptr() as *const __m256i);
                bm = _mm256_add_epi16(bm, _mm256_abs_epi16(_mm256_sub_epi16(expected, *s)));
            }
            let cbm = _mm256_sub_epi16(max_bm, bm);

            let lower = _mm256_loadu_si256(metrics[base..].as_ptr() as *const __m256i);
            let upper =
                _mm256_loadu_si256(metrics[base + HALF_STATES..].as_ptr() as *const __m256i);
            let m0 = _mm256_add_epi16(lower, bm);
            let m1 = _mm256_add_epi16(upper, cbm);
            let m2 = _mm256_add_epi16(lower, cbm);
            let m3 = _mm256_add_epi16(upper, bm);

            let d0 = _mm256_cmpgt_epi16(m0, m1);
            let d1 = _mm256_cmpgt_epi16(m2, m3);
            let even = _mm256_min_epi16(m0, m1);
            let odd = _mm256_min_epi16(m2, m3);

            // Unpack works per 128-bit lane; stitch the halves back in order
            let lo = _mm256_unpacklo_epi16(even, odd);
            let hi = _mm256_unpackhi_epi16(even, odd);
            let out = next[2 * base..].as_mut_ptr();
            _mm256_storeu_si256(out as *mut __m256i, _mm256_permute2x128_si256(lo, hi, 0x20));
            _mm256_storeu_si256(
                out.add(LANES) as *mut __m256i,
                _mm256_permute2x128_si256(lo, hi, 0x31),
            );

            let dlo = _mm256_unpacklo_epi16(d0, d1);
            let dhi = _mm256_unpackhi_epi16(d0, d1);
            let first = _mm256_permute2x128_si256(dlo, dhi, 0x20);
            let second = _mm256_permute2x128_si256(dlo, dhi, 0x31);
            // packs interleaves 64-bit quarters per lane: restore 0, 2, 1, 3
            let packed = _mm256_permute4x64_epi64(_mm256_packs_epi16(first, second), 0b11_01_10_00);
            let bits = _mm256_movemask_epi8(packed) as u32 as Decision;
            decision |= bits << (2 * base);
        }

        renormalize(&mut next);
        *metrics = next;
        decisions.push(decision);
    }
}

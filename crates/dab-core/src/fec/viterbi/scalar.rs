//! Portable add-compare-select kernel.
//!
//! This is the reference every vector backend must match bit for bit.

use super::{renormalize, Decision, Metric, Trellis, CODE_RATE, HALF_STATES, NUM_STATES};
use crate::types::SoftBit;

pub(super) fn update_blk(
    trellis: &Trellis,
    metrics: &mut [Metric; NUM_STATES],
    decisions: &mut Vec<Decision>,
    symbols: &[SoftBit],
) {
    let mut next = [0 as Metric; NUM_STATES];

    for syms in symbols.chunks_exact(CODE_RATE) {
        let mut clamped = [0 as SoftBit; CODE_RATE];
        for (c, &s) in clamped.iter_mut().zip(syms) {
            *c = trellis.clamp(s);
        }

        let mut decision: Decision = 0;
        for i in 0..HALF_STATES {
            let mut bm: Metric = 0;
            for r in 0..CODE_RATE {
                bm = bm.wrapping_add(trellis.branch[r][i].wrapping_sub(clamped[r]).wrapping_abs());
            }
            let cbm = trellis.max_branch_metric.wrapping_sub(bm);

            let lower = metrics[i];
            let upper = metrics[i + HALF_STATES];
            let m0 = lower.wrapping_add(bm);
            let m1 = upper.wrapping_add(cbm);
            let m2 = lower.wrapping_add(cbm);
            let m3 = upper.wrapping_add(bm);

            let d0 = m0 > m1;
            let d1 = m2 > m3;
            next[2 * i] = if d0 { m1 } else { m0 };
            next[2 * i + 1] = if d1 { m3 } else { m2 };
            decision |= (d0 as Decision) << (2 * i) | (d1 as Decision) << (2 * i + 1);
        }

        renormalize(&mut next);
        *metrics = next;
        decisions.push(decision);
    }
}

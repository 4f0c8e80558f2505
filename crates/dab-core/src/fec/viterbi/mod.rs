//! Viterbi Decoder for the DAB Mother Code
//!
//! Soft-decision maximum-likelihood decoder for the K=7, rate 1/4
//! convolutional code used by DAB. The engine follows the classic
//! add-compare-select (ACS) butterfly formulation with 16-bit path metrics and
//! a packed decision history, and comes with several interchangeable
//! execution backends:
//!
//! | Backend  | Lanes | Requirement                 |
//! |----------|-------|-----------------------------|
//! | `Scalar` | 1     | none                        |
//! | `Ssse3`  | 8     | x86/x86_64 with SSSE3       |
//! | `Avx2`   | 16    | x86/x86_64 with AVX2        |
//!
//! All backends run the exact same integer arithmetic, tie-breaking and
//! renormalisation, so they produce bit-identical decisions, decoded bits and
//! path metrics. [`ViterbiBackend::detect`] picks the widest one the CPU
//! supports, once per process.
//!
//! ## Butterfly
//!
//! With the newest input bit in the LSB of the state, new states `2i` and
//! `2i+1` are reached from old states `i` and `i+32`. Because every DAB
//! generator taps both the first and the last register stage, the four
//! transitions of a butterfly only ever produce two complementary symbol
//! sets, so one branch metric `bm` and its complement `max - bm` suffice:
//!
//! ```text
//!   old i    ──bm────▶ new 2i      old i    ──max-bm──▶ new 2i+1
//!   old i+32 ──max-bm▶ new 2i      old i+32 ──bm──────▶ new 2i+1
//! ```
//!
//! The decision bit of a new state is `1` when the path through the upper
//! predecessor (`i+32`) is strictly cheaper.
//!
//! ## Example
//!
//! ```rust
//! use dab_core::fec::{ConvCodeConfig, ConvolutionalEncoder, ViterbiDecoder};
//! use dab_core::bit_packing::unpack_bits;
//!
//! let data = [0xA5u8, 0x3C];
//! let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
//! let coded = encoder.encode(&unpack_bits(&data, 16));
//! let soft: Vec<i16> = coded.iter().map(|&b| if b { 127 } else { -127 }).collect();
//!
//! let mut decoder = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
//! let mut out = [0u8; 2];
//! decoder.decode_block(&soft, &mut out, 16).unwrap();
//! assert_eq!(out, data);
//! ```

mod scalar;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::convolutional::ConvCodeConfig;
use crate::types::{SoftBit, SOFT_DECISION_HIGH, SOFT_DECISION_LOW};

/// Constraint length supported by the engine.
pub const CONSTRAINT_LENGTH: usize = 7;

/// Soft symbols consumed per decoded bit.
pub const CODE_RATE: usize = 4;

/// Number of trellis states, 2^(K-1).
pub const NUM_STATES: usize = 1 << (CONSTRAINT_LENGTH - 1);

/// Number of butterflies per trellis step.
pub(crate) const HALF_STATES: usize = NUM_STATES / 2;

/// Path metric type.
pub type Metric = i16;

/// One trellis step of decisions; bit `s` belongs to state `s`.
pub type Decision = u64;

/// Metrics at or above this value trigger renormalisation.
pub const RENORMALIZE_THRESHOLD: Metric = i16::MAX - 3000;

/// Metric of the known starting state after a reset; also the floor the
/// minimum metric is moved back to on renormalisation.
pub const INITIAL_START_ERROR: Metric = i16::MIN;

/// Metric of every other state after a reset.
pub const INITIAL_NON_START_ERROR: Metric = i16::MIN + 3000;

/// Largest total branch metric a step may add, keeping 16-bit metrics
/// clear of overflow between renormalisations.
const MAX_BRANCH_METRIC: i32 = 3000;

/// Errors reported by the Viterbi engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViterbiError {
    #[error("unsupported constraint length {0}, only K={CONSTRAINT_LENGTH} is implemented")]
    UnsupportedConstraintLength(usize),

    #[error("unsupported code rate 1/{actual}, only 1/{expected} is implemented")]
    UnsupportedRate { expected: usize, actual: usize },

    #[error("generator {generator:o} is unusable: {reason}")]
    InvalidGenerator { generator: u32, reason: &'static str },

    #[error("soft decision range [{low}, {high}] is invalid")]
    InvalidSoftRange { high: SoftBit, low: SoftBit },

    #[error("backend {0} is not supported by this CPU")]
    BackendUnavailable(ViterbiBackend),

    #[error("{count} symbols is not a multiple of the code rate {rate}")]
    SymbolCount { count: usize, rate: usize },

    #[error("chainback of {requested} bits requested but only {available} steps decoded")]
    ChainbackTooLong { requested: usize, available: usize },

    #[error("output buffer holds {actual} bytes, {required} required")]
    OutputTooSmall { required: usize, actual: usize },

    #[error("trellis state {0} out of range")]
    InvalidState(usize),
}

/// Execution backend of the add-compare-select kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViterbiBackend {
    /// Portable reference implementation.
    Scalar,
    /// 128-bit SSSE3 kernel, 8 butterflies per instruction.
    Ssse3,
    /// 256-bit AVX2 kernel, 16 butterflies per instruction.
    Avx2,
}

static DETECTED_BACKEND: OnceLock<ViterbiBackend> = OnceLock::new();

impl ViterbiBackend {
    /// Every backend, narrowest first.
    pub const ALL: [ViterbiBackend; 3] = [
        ViterbiBackend::Scalar,
        ViterbiBackend::Ssse3,
        ViterbiBackend::Avx2,
    ];

    /// The widest backend supported by this CPU, probed once per process.
    pub fn detect() -> Self {
        *DETECTED_BACKEND.get_or_init(|| {
            let backend = Self::ALL
                .iter()
                .rev()
                .copied()
                .find(|b| b.is_supported())
                .unwrap_or(ViterbiBackend::Scalar);
            tracing::debug!(%backend, "viterbi backend selected");
            backend
        })
    }

    /// Whether this backend can run on the current CPU.
    pub fn is_supported(self) -> bool {
        match self {
            ViterbiBackend::Scalar => true,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            ViterbiBackend::Ssse3 => is_x86_feature_detected!("ssse3"),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            ViterbiBackend::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
            _ => false,
        }
    }

    /// All backends usable on this CPU.
    pub fn available() -> Vec<Self> {
        Self::ALL.iter().copied().filter(|b| b.is_supported()).collect()
    }
}

impl fmt::Display for ViterbiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViterbiBackend::Scalar => write!(f, "scalar"),
            ViterbiBackend::Ssse3 => write!(f, "ssse3"),
            ViterbiBackend::Avx2 => write!(f, "avx2"),
        }
    }
}

/// Precomputed trellis tables shared by every backend.
#[derive(Debug, Clone)]
pub(crate) struct Trellis {
    /// Expected soft symbol of output `r` on the transition from old state
    /// `i` with input 0, for `i < 32`.
    pub(crate) branch: [[SoftBit; HALF_STATES]; CODE_RATE],
    pub(crate) soft_high: SoftBit,
    pub(crate) soft_low: SoftBit,
    /// Branch metric of a transition whose symbols are all wrong.
    pub(crate) max_branch_metric: Metric,
}

impl Trellis {
    fn new(generators: &[u32], soft_high: SoftBit, soft_low: SoftBit) -> Self {
        let mut branch = [[0; HALF_STATES]; CODE_RATE];
        for (r, &gen) in generators.iter().enumerate() {
            for (i, expected) in branch[r].iter_mut().enumerate() {
                let register = (i as u32) << 1;
                *expected = if (register & gen).count_ones() % 2 == 1 {
                    soft_high
                } else {
                    soft_low
                };
            }
        }

        Self {
            branch,
            soft_high,
            soft_low,
            max_branch_metric: (CODE_RATE as i32 * (soft_high as i32 - soft_low as i32)) as Metric,
        }
    }

    #[inline(always)]
    pub(crate) fn clamp(&self, symbol: SoftBit) -> SoftBit {
        symbol.clamp(self.soft_low, self.soft_high)
    }
}

/// Shift all metrics down so the smallest sits at [`INITIAL_START_ERROR`]
/// once any of them reaches [`RENORMALIZE_THRESHOLD`].
#[inline]
pub(crate) fn renormalize(metrics: &mut [Metric; NUM_STATES]) {
    let max = metrics.iter().copied().max().unwrap_or(INITIAL_START_ERROR);
    if max < RENORMALIZE_THRESHOLD {
        return;
    }
    let min = metrics.iter().copied().min().unwrap_or(INITIAL_START_ERROR);
    let offset = min.wrapping_sub(INITIAL_START_ERROR);
    for m in metrics.iter_mut() {
        *m = m.wrapping_sub(offset);
    }
}

/// Viterbi decoder state for one logical stream.
///
/// A decoder is owned by exactly one stream (the FIC runner or one program
/// channel) and mutated in place by every call; it is never shared between
/// concurrently running decodes.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    config: ConvCodeConfig,
    trellis: Trellis,
    backend: ViterbiBackend,
    metrics: [Metric; NUM_STATES],
    decisions: Vec<Decision>,
}

impl ViterbiDecoder {
    /// Create a decoder with the default soft decision range and the best
    /// backend for this CPU.
    pub fn new(config: ConvCodeConfig) -> Result<Self, ViterbiError> {
        Self::with_options(
            config,
            SOFT_DECISION_HIGH,
            SOFT_DECISION_LOW,
            ViterbiBackend::detect(),
        )
    }

    /// Create a decoder with an explicit soft decision range and backend.
    pub fn with_options(
        config: ConvCodeConfig,
        soft_high: SoftBit,
        soft_low: SoftBit,
        backend: ViterbiBackend,
    ) -> Result<Self, ViterbiError> {
        if config.constraint_length != CONSTRAINT_LENGTH {
            return Err(ViterbiError::UnsupportedConstraintLength(
                config.constraint_length,
            ));
        }
        if config.generators.len() != CODE_RATE {
            return Err(ViterbiError::UnsupportedRate {
                expected: CODE_RATE,
                actual: config.generators.len(),
            });
        }
        for &generator in &config.generators {
            if generator >= 1 << CONSTRAINT_LENGTH {
                return Err(ViterbiError::InvalidGenerator {
                    generator,
                    reason: "wider than the constraint length",
                });
            }
            // Both end taps are needed for the complementary butterfly
            if generator & 1 == 0 || generator & (1 << (CONSTRAINT_LENGTH - 1)) == 0 {
                return Err(ViterbiError::InvalidGenerator {
                    generator,
                    reason: "first and last register stage must both be tapped",
                });
            }
        }
        let span = soft_high as i32 - soft_low as i32;
        if span <= 0 || span * CODE_RATE as i32 > MAX_BRANCH_METRIC {
            return Err(ViterbiError::InvalidSoftRange {
                high: soft_high,
                low: soft_low,
            });
        }
        if !backend.is_supported() {
            return Err(ViterbiError::BackendUnavailable(backend));
        }

        let trellis = Trellis::new(&config.generators, soft_high, soft_low);
        let mut decoder = Self {
            config,
            trellis,
            backend,
            metrics: [INITIAL_NON_START_ERROR; NUM_STATES],
            decisions: Vec::new(),
        };
        decoder.reset(0)?;
        Ok(decoder)
    }

    /// Code configuration.
    pub fn config(&self) -> &ConvCodeConfig {
        &self.config
    }

    /// Backend executing the ACS kernel.
    pub fn backend(&self) -> ViterbiBackend {
        self.backend
    }

    /// Forget all history and start from a known encoder state.
    pub fn reset(&mut self, starting_state: usize) -> Result<(), ViterbiError> {
        if starting_state >= NUM_STATES {
            return Err(ViterbiError::InvalidState(starting_state));
        }
        self.metrics = [INITIAL_NON_START_ERROR; NUM_STATES];
        self.metrics[starting_state] = INITIAL_START_ERROR;
        self.decisions.clear();
        Ok(())
    }

    /// Run the trellis over a block of soft symbols, `CODE_RATE` per step.
    ///
    /// Decisions are appended to the history; metrics carry over between
    /// calls so a block may be fed in several pieces.
    pub fn update(&mut self, symbols: &[SoftBit]) -> Result<(), ViterbiError> {
        if symbols.len() % CODE_RATE != 0 {
            return Err(ViterbiError::SymbolCount {
                count: symbols.len(),
                rate: CODE_RATE,
            });
        }
        self.decisions.reserve(symbols.len() / CODE_RATE);

        match self.backend {
            ViterbiBackend::Scalar => {
                scalar::update_blk(&self.trellis, &mut self.metrics, &mut self.decisions, symbols)
            }
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            ViterbiBackend::Ssse3 => {
                // SAFETY: support was checked when the decoder was built
                unsafe {
                    x86::update_blk_ssse3(
                        &self.trellis,
                        &mut self.metrics,
                        &mut self.decisions,
                        symbols,
                    )
                }
            }
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            ViterbiBackend::Avx2 => {
                // SAFETY: support was checked when the decoder was built
                unsafe {
                    x86::update_blk_avx2(
                        &self.trellis,
                        &mut self.metrics,
                        &mut self.decisions,
                        symbols,
                    )
                }
            }
            #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
            _ => scalar::update_blk(&self.trellis, &mut self.metrics, &mut self.decisions, symbols),
        }
        Ok(())
    }

    /// Number of trellis steps decoded since the last reset.
    pub fn decoded_steps(&self) -> usize {
        self.decisions.len()
    }

    /// Decision history, one entry per trellis step.
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Current path metrics, one per state.
    pub fn metrics(&self) -> &[Metric; NUM_STATES] {
        &self.metrics
    }

    /// Accumulated path metric of `state`.
    pub fn error_metric(&self, state: usize) -> Option<Metric> {
        self.metrics.get(state).copied()
    }

    /// Trace the decision history back from `end_state`.
    ///
    /// The last `decoded_steps() - nbits` steps are treated as the encoder
    /// tail and skipped. The remaining `nbits` bits are written to `out`
    /// packed MSB first: decoded bit `t` lands in `out[t / 8]` under mask
    /// `0x80 >> (t % 8)`.
    pub fn chainback(
        &self,
        out: &mut [u8],
        nbits: usize,
        end_state: usize,
    ) -> Result<(), ViterbiError> {
        if end_state >= NUM_STATES {
            return Err(ViterbiError::InvalidState(end_state));
        }
        if nbits > self.decisions.len() {
            return Err(ViterbiError::ChainbackTooLong {
                requested: nbits,
                available: self.decisions.len(),
            });
        }
        let required = (nbits + 7) / 8;
        if out.len() < required {
            return Err(ViterbiError::OutputTooSmall {
                required,
                actual: out.len(),
            });
        }
        out[..required].fill(0);

        let mut state = end_state;
        for t in (0..self.decisions.len()).rev() {
            if t < nbits && state & 1 == 1 {
                out[t / 8] |= 0x80 >> (t % 8);
            }
            let upper = (self.decisions[t] >> state) & 1;
            state = (state >> 1) | ((upper as usize) << (CONSTRAINT_LENGTH - 2));
        }
        Ok(())
    }

    /// Decode a terminated block: reset to state 0, run the trellis over
    /// `symbols` (data plus tail) and trace back `nbits` data bits from
    /// state 0.
    pub fn decode_block(
        &mut self,
        symbols: &[SoftBit],
        out: &mut [u8],
        nbits: usize,
    ) -> Result<(), ViterbiError> {
        self.reset(0)?;
        self.update(symbols)?;
        self.chainback(out, nbits, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_packing::{pack_bits, unpack_bits};
    use crate::fec::convolutional::ConvolutionalEncoder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn to_soft(coded: &[bool]) -> Vec<SoftBit> {
        coded
            .iter()
            .map(|&b| if b { SOFT_DECISION_HIGH } else { SOFT_DECISION_LOW })
            .collect()
    }

    fn random_bits(rng: &mut StdRng, n: usize) -> Vec<bool> {
        (0..n).map(|_| rng.gen::<bool>()).collect()
    }

    fn decoder(backend: ViterbiBackend) -> ViterbiDecoder {
        ViterbiDecoder::with_options(
            ConvCodeConfig::dab(),
            SOFT_DECISION_HIGH,
            SOFT_DECISION_LOW,
            backend,
        )
        .unwrap()
    }

    /// ACS over i64 metrics without renormalisation, used as a reference.
    fn unbounded_decode(trellis: &Trellis, symbols: &[SoftBit]) -> (Vec<Decision>, Vec<i64>) {
        let mut metrics = vec![INITIAL_NON_START_ERROR as i64; NUM_STATES];
        metrics[0] = INITIAL_START_ERROR as i64;
        let mut decisions = Vec::new();

        for syms in symbols.chunks_exact(CODE_RATE) {
            let mut next = vec![0i64; NUM_STATES];
            let mut decision = 0u64;
            for i in 0..HALF_STATES {
                let bm: i64 = (0..CODE_RATE)
                    .map(|r| (trellis.branch[r][i] as i64 - trellis.clamp(syms[r]) as i64).abs())
                    .sum();
                let cbm = trellis.max_branch_metric as i64 - bm;
                let (m0, m1) = (metrics[i] + bm, metrics[i + HALF_STATES] + cbm);
                let (m2, m3) = (metrics[i] + cbm, metrics[i + HALF_STATES] + bm);
                next[2 * i] = m0.min(m1);
                next[2 * i + 1] = m2.min(m3);
                decision |= ((m0 > m1) as u64) << (2 * i);
                decision |= ((m2 > m3) as u64) << (2 * i + 1);
            }
            metrics = next;
            decisions.push(decision);
        }
        (decisions, metrics)
    }

    #[test]
    fn test_clean_block_roundtrip() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = random_bits(&mut rng, 768);
        let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
        let soft = to_soft(&encoder.encode(&data));

        for backend in ViterbiBackend::available() {
            let mut out = vec![0u8; 96];
            decoder(backend).decode_block(&soft, &mut out, 768).unwrap();
            assert_eq!(out, pack_bits(&data), "backend {}", backend);
        }
    }

    #[test]
    fn test_noisy_soft_decisions_are_corrected() {
        let mut rng = StdRng::seed_from_u64(42);
        let data = random_bits(&mut rng, 1024);
        let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
        let coded = encoder.encode(&data);

        let noisy: Vec<SoftBit> = coded
            .iter()
            .map(|&b| {
                let clean: i32 = if b { 90 } else { -90 };
                (clean + rng.gen_range(-70..=70)) as SoftBit
            })
            .collect();
        // Plus a sprinkling of hard symbol errors
        let mut noisy = noisy;
        for i in (0..noisy.len()).step_by(37) {
            noisy[i] = -noisy[i];
        }

        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        let mut out = vec![0u8; 128];
        dec.decode_block(&noisy, &mut out, 1024).unwrap();
        assert_eq!(unpack_bits(&out, 1024), data);
    }

    #[test]
    fn test_erasures_are_tolerated() {
        let mut rng = StdRng::seed_from_u64(3);
        let data = random_bits(&mut rng, 256);
        let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
        let mut soft = to_soft(&encoder.encode(&data));
        // Rate 8/16 style puncturing: every other symbol missing
        for s in soft.iter_mut().skip(1).step_by(2) {
            *s = 0;
        }

        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        let mut out = vec![0u8; 32];
        dec.decode_block(&soft, &mut out, 256).unwrap();
        assert_eq!(out, pack_bits(&data));
    }

    #[test]
    fn test_backends_are_bit_identical() {
        let mut rng = StdRng::seed_from_u64(1234);
        // Pure noise exercises ties and every decision pattern
        let symbols: Vec<SoftBit> = (0..4 * 3000).map(|_| rng.gen_range(-200..=200)).collect();

        let mut reference = decoder(ViterbiBackend::Scalar);
        reference.update(&symbols).unwrap();
        let mut reference_bits = vec![0u8; 375];
        reference.chainback(&mut reference_bits, 3000, 0).unwrap();

        for backend in ViterbiBackend::available() {
            let mut dec = decoder(backend);
            // Uneven pieces must not matter either
            dec.update(&symbols[..4 * 1001]).unwrap();
            dec.update(&symbols[4 * 1001..]).unwrap();
            assert_eq!(dec.decisions(), reference.decisions(), "backend {}", backend);
            assert_eq!(dec.metrics(), reference.metrics(), "backend {}", backend);

            let mut bits = vec![0u8; 375];
            dec.chainback(&mut bits, 3000, 0).unwrap();
            assert_eq!(bits, reference_bits, "backend {}", backend);
            for state in 0..NUM_STATES {
                assert_eq!(dec.error_metric(state), reference.error_metric(state));
            }
        }
    }

    #[test]
    fn test_renormalization_preserves_decisions() {
        let mut rng = StdRng::seed_from_u64(99);
        let symbols: Vec<SoftBit> = (0..4 * 6000)
            .map(|_| if rng.gen::<bool>() { 127 } else { -127 })
            .collect();

        let (ref_decisions, ref_metrics) = unbounded_decode(&decoder(ViterbiBackend::Scalar).trellis, &symbols);
        // The unbounded metrics must have left the 16-bit range many times over
        let ref_min = *ref_metrics.iter().min().unwrap();
        assert!(ref_min - INITIAL_START_ERROR as i64 > 4 * u16::MAX as i64);

        for backend in ViterbiBackend::available() {
            let mut dec = decoder(backend);
            dec.update(&symbols).unwrap();
            assert_eq!(dec.decisions(), &ref_decisions[..], "backend {}", backend);

            // Same metrics modulo the accumulated renormalisation offset
            let offset = ref_metrics[0] - dec.metrics()[0] as i64;
            for state in 0..NUM_STATES {
                assert_eq!(ref_metrics[state] - dec.metrics()[state] as i64, offset);
            }
        }
    }

    #[test]
    fn test_chainback_is_msb_first() {
        // A single leading one followed by zeros
        let mut data = vec![false; 16];
        data[0] = true;
        data[9] = true;
        let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
        let soft = to_soft(&encoder.encode(&data));

        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        let mut out = [0xFFu8; 2];
        dec.decode_block(&soft, &mut out, 16).unwrap();
        assert_eq!(out, [0x80, 0x40]);
    }

    #[test]
    fn test_chainback_skips_tail() {
        let data = vec![true, false, true, true, false, false, true, false];
        let mut encoder = ConvolutionalEncoder::new(ConvCodeConfig::dab());
        let soft = to_soft(&encoder.encode(&data));

        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        dec.update(&soft).unwrap();
        assert_eq!(dec.decoded_steps(), 8 + 6);
        let mut out = [0u8; 1];
        dec.chainback(&mut out, 8, 0).unwrap();
        assert_eq!(out[0], 0b1011_0010);
    }

    #[test]
    fn test_initial_metrics() {
        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        dec.reset(5).unwrap();
        assert_eq!(dec.error_metric(5), Some(INITIAL_START_ERROR));
        assert_eq!(dec.error_metric(0), Some(INITIAL_NON_START_ERROR));
        assert_eq!(dec.error_metric(NUM_STATES), None);
        assert_eq!(dec.decoded_steps(), 0);
        assert_eq!(dec.reset(64), Err(ViterbiError::InvalidState(64)));
    }

    #[test]
    fn test_symbol_count_must_match_rate() {
        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        let err = dec.update(&[0; 7]).unwrap_err();
        assert_eq!(err, ViterbiError::SymbolCount { count: 7, rate: 4 });
        assert_eq!(dec.decoded_steps(), 0);
    }

    #[test]
    fn test_chainback_argument_checks() {
        let mut dec = ViterbiDecoder::new(ConvCodeConfig::dab()).unwrap();
        dec.update(&[0; 40]).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(
            dec.chainback(&mut out, 11, 0),
            Err(ViterbiError::ChainbackTooLong { requested: 11, available: 10 })
        ));
        assert!(matches!(
            dec.chainback(&mut out[..1], 10, 0),
            Err(ViterbiError::OutputTooSmall { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_unsupported_configurations() {
        let k5 = ConvCodeConfig {
            constraint_length: 5,
            generators: vec![0o23, 0o33, 0o23, 0o33],
        };
        assert_eq!(
            ViterbiDecoder::new(k5).unwrap_err(),
            ViterbiError::UnsupportedConstraintLength(5)
        );

        let half_rate = ConvCodeConfig {
            constraint_length: 7,
            generators: vec![0o155, 0o117],
        };
        assert!(matches!(
            ViterbiDecoder::new(half_rate),
            Err(ViterbiError::UnsupportedRate { expected: 4, actual: 2 })
        ));

        let no_end_tap = ConvCodeConfig {
            constraint_length: 7,
            generators: vec![0o155, 0o117, 0o123, 0o055],
        };
        assert!(matches!(
            ViterbiDecoder::new(no_end_tap),
            Err(ViterbiError::InvalidGenerator { generator: 0o055, .. })
        ));

        assert!(matches!(
            ViterbiDecoder::with_options(ConvCodeConfig::dab(), 1000, -1000, ViterbiBackend::Scalar),
            Err(ViterbiError::InvalidSoftRange { .. })
        ));
    }

    #[test]
    fn test_detect_is_stable_and_supported() {
        let first = ViterbiBackend::detect();
        assert_eq!(first, ViterbiBackend::detect());
        assert!(first.is_supported());
        assert!(ViterbiBackend::available().contains(&ViterbiBackend::Scalar));
    }
}

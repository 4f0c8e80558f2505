//! Core types shared across the decode layer
//!
//! The demodulator hands us one soft decision per coded bit. A soft
//! decision is a signed 16-bit value: strongly positive means the coded bit
//! was most likely a `1`, strongly negative a `0`, and `0` is an erasure
//! (no information, used for punctured positions).
//!
//! ```text
//!   SOFT_DECISION_LOW        0        SOFT_DECISION_HIGH
//!   -127 ............... erasure ............... +127
//!   "definitely 0"                        "definitely 1"
//! ```

use crate::config::ConfigError;
use crate::fec::viterbi::ViterbiError;

/// A soft-decision channel bit as delivered by the demodulator.
pub type SoftBit = i16;

/// Soft decision representing a certain `1`.
pub const SOFT_DECISION_HIGH: SoftBit = 127;

/// Soft decision representing a certain `0`.
pub const SOFT_DECISION_LOW: SoftBit = -127;

/// Soft decision used for punctured (unknown) bits.
pub const SOFT_DECISION_ERASURE: SoftBit = 0;

/// Sub-channel identifier (6 bits on air, 0..=63).
pub type SubchannelId = u8;

/// Service identifier (16-bit programme SId or 32-bit data SId).
pub type ServiceId = u32;

/// Ensemble identifier.
pub type EnsembleId = u16;

/// Result type for decode-layer operations
pub type DabResult<T> = Result<T, DabError>;

/// Errors raised by the decode layer.
///
/// None of these cross [`BasicRadio::process`](crate::radio::BasicRadio::process);
/// per-frame and per-stream failures are logged and counted there.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DabError {
    #[error("frame has {actual} soft bits, expected {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("{segment} segment has {actual} soft bits, expected {expected}")]
    SegmentLength {
        segment: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("subchannel {id} uses unsupported protection: {reason}")]
    UnsupportedProtection { id: SubchannelId, reason: String },

    #[error("subchannel {id} does not fit into the CIF (start {start} CU, length {length} CU)")]
    SubchannelOutOfBounds {
        id: SubchannelId,
        start: u16,
        length: u16,
    },

    #[error("decoder construction failed: {0}")]
    Decoder(#[from] ViterbiError),

    #[error("worker pool could not be built: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

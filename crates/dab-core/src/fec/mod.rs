//! Forward Error Correction
//!
//! The DAB channel coding chain, receive direction:
//!
//! ```text
//! soft bits ──▶ depuncture ──▶ Viterbi (K=7, R=1/4) ──▶ energy dispersal ──▶ bytes
//!                (puncture)        (viterbi)              (energy_dispersal)
//! ```
//!
//! Fast Information Blocks additionally carry a CRC-16 ([`crc`]).
//! The reference [`ConvolutionalEncoder`] is the transmit side of the
//! mother code and is used to validate the decoder.

pub mod convolutional;
pub mod crc;
pub mod energy_dispersal;
pub mod puncture;
pub mod viterbi;

pub use convolutional::{ConvCodeConfig, ConvolutionalEncoder};
pub use energy_dispersal::EnergyDispersal;
pub use puncture::{PunctureRun, PunctureSchedule};
pub use viterbi::{ViterbiBackend, ViterbiDecoder, ViterbiError};

//! Convolutional Code Configuration and Reference Encoder
//!
//! DAB protects both the FIC and the MSC with the same mother code: rate 1/4,
//! constraint length K=7 (EN 300 401, clause 11.1.1). Higher rates are
//! obtained by puncturing (see [`crate::fec::puncture`]).
//!
//! ## Register Convention
//!
//! The shift register holds the last K input bits with the **newest bit in
//! the LSB**. Each output bit is the parity of `register & generator`. In
//! this convention the DAB generators `133, 171, 145, 133` (octal, as written
//! in the standard with the newest bit first) read as
//! `155, 117, 123, 155`.
//!
//! The encoder here is the transmitter-side reference used to validate the
//! Viterbi engine; the receive path never calls it.

use std::fmt;

/// Configuration for a convolutional code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvCodeConfig {
    /// Constraint length K (memory + 1)
    pub constraint_length: usize,
    /// Generator polynomials, newest-bit-LSB convention (one per output)
    pub generators: Vec<u32>,
}

impl ConvCodeConfig {
    /// DAB mother code: rate 1/4, K=7.
    pub fn dab() -> Self {
        Self {
            constraint_length: 7,
            generators: vec![0o155, 0o117, 0o123, 0o155],
        }
    }

    /// Code rate as a fraction (1/n where n = number of generators).
    pub fn rate(&self) -> f64 {
        1.0 / self.generators.len() as f64
    }

    /// Number of states in the trellis (2^(K-1)).
    pub fn num_states(&self) -> usize {
        1 << (self.constraint_length - 1)
    }

    /// Number of output bits per input bit.
    pub fn outputs_per_input(&self) -> usize {
        self.generators.len()
    }
}

impl fmt::Display for ConvCodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conv(K={}, rate=1/{}, generators={:?})",
            self.constraint_length,
            self.generators.len(),
            self.generators
                .iter()
                .map(|g| format!("{:o}", g))
                .collect::<Vec<_>>()
        )
    }
}

/// Convolutional encoder.
#[derive(Debug, Clone)]
pub struct ConvolutionalEncoder {
    config: ConvCodeConfig,
    state: u32,
}

impl ConvolutionalEncoder {
    /// Create a new encoder starting in state 0.
    pub fn new(config: ConvCodeConfig) -> Self {
        Self { config, state: 0 }
    }

    /// Encode a single input bit, appending n output bits to `out`.
    pub fn encode_bit(&mut self, input: bool, out: &mut Vec<bool>) {
        let mask = (1u32 << self.config.constraint_length) - 1;
        self.state = ((self.state << 1) | input as u32) & mask;
        for &gen in &self.config.generators {
            out.push((self.state & gen).count_ones() % 2 == 1);
        }
    }

    /// Encode a block of input bits from state 0.
    ///
    /// Appends (K-1) flush bits so the trellis terminates in state 0.
    pub fn encode(&mut self, input: &[bool]) -> Vec<bool> {
        self.state = 0;
        let tail = self.config.constraint_length - 1;
        let mut output =
            Vec::with_capacity((input.len() + tail) * self.config.outputs_per_input());

        for &bit in input {
            self.encode_bit(bit, &mut output);
        }
        for _ in 0..tail {
            self.encode_bit(false, &mut output);
        }

        output
    }

    /// Encode without trellis termination (for streaming).
    pub fn encode_stream(&mut self, input: &[bool]) -> Vec<bool> {
        let mut output = Vec::with_capacity(input.len() * self.config.outputs_per_input());
        for &bit in input {
            self.encode_bit(bit, &mut output);
        }
        output
    }

    /// Current register contents (last K inputs, newest in the LSB).
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Reset encoder state.
    pub fn reset(&mut self) {
        self.state = 0;
    }
}

//! CRC-16 for Fast Information Blocks
//!
//! Every FIB ends in a 16-bit CRC over its first 30 bytes (EN 300 401,
//! clause 5.2.1): CCITT polynomial `x^16 + x^12 + x^5 + 1`, register preset
//! to all ones, and the result transmitted inverted.
//!
//! ## Example
//!
//! ```rust
//! use dab_core::fec::crc::{Crc16, CrcComputer};
//!
//! let mut crc = Crc16::ccitt();
//! crc.update(b"123456789");
//! assert_eq!(crc.finalize(), 0x29B1);
//! ```

use crate::params::FIB_BYTES;

/// Trait for CRC computation.
pub trait CrcComputer {
    /// The output type of the CRC.
    type Output: Copy + PartialEq + std::fmt::LowerHex;

    /// Update the CRC with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the CRC value.
    fn finalize(&self) -> Self::Output;

    /// Reset the CRC to its initial state.
    fn reset(&mut self);

    /// Compute CRC of an entire buffer in one call.
    fn compute(data: &[u8]) -> Self::Output
    where
        Self: Sized + Default,
    {
        let mut crc = Self::default();
        crc.update(data);
        crc.finalize()
    }

    /// Verify that data matches an expected CRC.
    fn verify(&mut self, data: &[u8], expected: Self::Output) -> bool
    where
        Self: Sized,
    {
        self.reset();
        self.update(data);
        self.finalize() == expected
    }
}

/// Table driven, MSB-first CRC-16.
#[derive(Clone)]
pub struct Crc16 {
    table: [u16; 256],
    value: u16,
    init: u16,
    xor_out: u16,
}

impl Crc16 {
    /// CRC-16/CCITT-FALSE (polynomial 0x1021, init 0xFFFF).
    pub fn ccitt() -> Self {
        Self::new(0x1021, 0xFFFF, 0x0000)
    }

    /// The FIB variant: CCITT with the output inverted.
    pub fn fib() -> Self {
        Self::new(0x1021, 0xFFFF, 0xFFFF)
    }

    /// Create a CRC-16 with custom parameters.
    pub fn new(poly: u16, init: u16, xor_out: u16) -> Self {
        let mut table = [0u16; 256];
        for i in 0..256u32 {
            let mut crc = (i as u16) << 8;
            for _ in 0..8 {
                if crc & 0x8000 != 0 {
                    crc = (crc << 1) ^ poly;
                } else {
                    crc <<= 1;
                }
            }
            table[i as usize] = crc;
        }
        Self {
            table,
            value: init,
            init,
            xor_out,
        }
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::fib()
    }
}

impl CrcComputer for Crc16 {
    type Output = u16;

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = ((self.value >> 8) ^ byte as u16) as u8;
            self.value = (self.value << 8) ^ self.table[idx as usize];
        }
    }

    fn finalize(&self) -> u16 {
        self.value ^ self.xor_out
    }

    fn reset(&mut self) {
        self.value = self.init;
    }
}

/// Check the trailing CRC of one packed FIB.
///
/// Returns `false` for buffers that are not exactly one FIB long.
pub fn fib_crc_ok(fib: &[u8]) -> bool {
    if fib.len() != FIB_BYTES {
        return false;
    }
    let (payload, tail) = fib.split_at(FIB_BYTES - 2);
    let expected = u16::from_be_bytes([tail[0], tail[1]]);
    Crc16::compute(payload) == expected
}

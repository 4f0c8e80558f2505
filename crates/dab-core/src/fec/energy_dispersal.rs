//! Energy dispersal descrambling (EN 300 401, clause 10.2)
//!
//! Both the FIC and every sub-channel are scrambled before convolutional
//! encoding by XOR with the PRBS `x^9 + x^5 + 1`, register initialised to
//! all ones. The sequence restarts at the beginning of each FIC group and of
//! each logical frame, so the whole sequence for a given length is computed
//! once and applied to packed decoder output byte by byte.

/// PRBS generator, one bit at a time.
#[derive(Debug, Clone)]
pub struct Prbs {
    reg: u16,
}

impl Prbs {
    pub fn new() -> Self {
        Self { reg: 0x1FF }
    }

    pub fn next_bit(&mut self) -> u8 {
        let bit = ((self.reg >> 8) ^ (self.reg >> 4)) & 1;
        self.reg = ((self.reg << 1) | bit) & 0x1FF;
        bit as u8
    }
}

impl Default for Prbs {
    fn default() -> Self {
        Self::new()
    }
}

/// Precomputed descrambler for blocks of a fixed bit length.
#[derive(Debug, Clone)]
pub struct EnergyDispersal {
    sequence: Vec<u8>,
    nbits: usize,
}

impl EnergyDispersal {
    /// Build the packed (MSB first) PRBS for `nbits` bits.
    pub fn new(nbits: usize) -> Self {
        let mut prbs = Prbs::new();
        let mut sequence = vec![0u8; (nbits + 7) / 8];
        for i in 0..nbits {
            if prbs.next_bit() == 1 {
                sequence[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Self { sequence, nbits }
    }

    /// Length of the sequence in bits.
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    /// XOR the sequence into a packed block, in place.
    ///
    /// Extra bytes beyond the sequence are left untouched.
    pub fn apply(&self, data: &mut [u8]) {
        for (d, s) in data.iter_mut().zip(&self.sequence) {
            *d ^= s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_prefix() {
        // First 16 bits of the DAB PRBS: 0000 0111 1011 1110
        let ed = EnergyDispersal::new(16);
        let mut data = [0u8; 2];
        ed.apply(&mut data);
        assert_eq!(data, [0x07, 0xBE]);
    }

    #[test]
    fn test_apply_is_involution() {
        let ed = EnergyDispersal::new(768);
        let original: Vec<u8> = (0..96).map(|i| (i * 37) as u8).collect();
        let mut data = original.clone();
        ed.apply(&mut data);
        assert_ne!(data, original);
        ed.apply(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_period_is_511() {
        let mut prbs = Prbs::new();
        let first: Vec<u8> = (0..511).map(|_| prbs.next_bit()).collect();
        let second: Vec<u8> = (0..511).map(|_| prbs.next_bit()).collect();
        assert_eq!(first, second);
        assert_eq!(first.iter().filter(|&&b| b == 1).count(), 256);
    }
}

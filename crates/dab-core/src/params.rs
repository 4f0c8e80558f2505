//! DAB transmission parameters (ETSI EN 300 401, clause 14)
//!
//! The OFDM layer upstream delivers one transmission frame of soft bits at a
//! time. Everything downstream of that point only needs to know how many bits
//! a frame carries and how they split between the Fast Information Channel
//! (FIC, the control segment) and the Main Service Channel (MSC, the payload
//! segment). Those sizes are fixed per transmission mode.
//!
//! ## Example
//!
//! ```rust
//! use dab_core::params::{DabParameters, TransmissionMode};
//!
//! let params = DabParameters::new(TransmissionMode::I);
//! assert_eq!(params.nb_frame_bits, 230_400);
//! assert_eq!(params.nb_fic_bits + params.nb_msc_bits, params.nb_frame_bits);
//! assert_eq!(params.nb_cifs, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits in one capacity unit (CU) of the MSC.
pub const CU_BITS: usize = 64;

/// Number of capacity units in one Common Interleaved Frame.
pub const CIF_CAPACITY_UNITS: usize = 864;

/// Number of bits in one Fast Information Block, CRC included.
pub const FIB_BITS: usize = 256;

/// Number of bytes in one Fast Information Block, CRC included.
pub const FIB_BYTES: usize = FIB_BITS / 8;

/// DAB transmission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmissionMode {
    /// Mode I: 1536 carriers, 96 ms frame, VHF Band III.
    I,
    /// Mode II: 384 carriers, 24 ms frame.
    II,
    /// Mode III: 192 carriers, 24 ms frame.
    III,
    /// Mode IV: 768 carriers, 48 ms frame.
    IV,
}

impl Default for TransmissionMode {
    fn default() -> Self {
        TransmissionMode::I
    }
}

impl fmt::Display for TransmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmissionMode::I => write!(f, "I"),
            TransmissionMode::II => write!(f, "II"),
            TransmissionMode::III => write!(f, "III"),
            TransmissionMode::IV => write!(f, "IV"),
        }
    }
}

/// Frame geometry derived once per transmission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DabParameters {
    /// Transmission mode these sizes were derived from.
    pub mode: TransmissionMode,
    /// Number of OFDM symbols per frame, phase reference included.
    pub nb_symbols: usize,
    /// Number of active carriers.
    pub nb_carriers: usize,
    /// Number of OFDM symbols carrying the FIC.
    pub nb_fic_symbols: usize,
    /// Soft bits per frame (phase reference excluded).
    pub nb_frame_bits: usize,
    /// Soft bits in the FIC (control) segment.
    pub nb_fic_bits: usize,
    /// Soft bits in the MSC (payload) segment.
    pub nb_msc_bits: usize,
    /// Common Interleaved Frames per transmission frame.
    pub nb_cifs: usize,
    /// Soft bits per CIF.
    pub nb_cif_bits: usize,
    /// Fast Information Blocks per transmission frame.
    pub nb_fibs: usize,
}

impl DabParameters {
    /// Derive the frame geometry for a transmission mode.
    pub fn new(mode: TransmissionMode) -> Self {
        let (nb_symbols, nb_carriers, nb_fic_symbols, nb_cifs, nb_fibs) = match mode {
            TransmissionMode::I => (76, 1536, 3, 4, 12),
            TransmissionMode::II => (76, 384, 3, 1, 3),
            TransmissionMode::III => (153, 192, 8, 1, 4),
            TransmissionMode::IV => (76, 768, 3, 2, 6),
        };

        // Two bits per carrier (DQPSK), the phase reference symbol carries none
        let bits_per_symbol = nb_carriers * 2;
        let nb_frame_bits = (nb_symbols - 1) * bits_per_symbol;
        let nb_fic_bits = nb_fic_symbols * bits_per_symbol;
        let nb_msc_bits = nb_frame_bits - nb_fic_bits;

        Self {
            mode,
            nb_symbols,
            nb_carriers,
            nb_fic_symbols,
            nb_frame_bits,
            nb_fic_bits,
            nb_msc_bits,
            nb_cifs,
            nb_cif_bits: nb_msc_bits / nb_cifs,
            nb_fibs,
        }
    }

    /// FIBs carried by one FIC group. There is one group per CIF.
    pub fn nb_fibs_per_group(&self) -> usize {
        self.nb_fibs / self.nb_cifs
    }

    /// Punctured soft bits per FIC group.
    pub fn nb_fic_group_bits(&self) -> usize {
        self.nb_fic_bits / self.nb_cifs
    }

    /// Decoded bits per FIC group.
    pub fn nb_fic_group_data_bits(&self) -> usize {
        self.nb_fibs_per_group() * FIB_BITS
    }
}

impl Default for DabParameters {
    fn default() -> Self {
        Self::new(TransmissionMode::I)
    }
}

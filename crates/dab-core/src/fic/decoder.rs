//! FIC channel decoding: soft bits in, checked FIBs out.
//!
//! The FIC of one transmission frame is split into one FIC group per CIF.
//! Each group is an independently terminated codeword:
//!
//! ```text
//!  group soft bits ─▶ depuncture ─▶ Viterbi ─▶ descramble ─▶ FIB | FIB | FIB
//!   (2304 in mode I)   PI16/PI15/PI_X   (0 → 0)    PRBS           32 bytes each
//! ```

use crate::fec::crc::fib_crc_ok;
use crate::fec::energy_dispersal::EnergyDispersal;
use crate::fec::puncture::PunctureSchedule;
use crate::fec::viterbi::{ViterbiBackend, ViterbiDecoder};
use crate::fec::ConvCodeConfig;
use crate::params::{DabParameters, FIB_BYTES};
use crate::types::{DabError, DabResult, SoftBit};

/// Decodes FIC groups into FIBs.
#[derive(Debug, Clone)]
pub struct FicDecoder {
    group_bits: usize,
    data_bits: usize,
    schedule: PunctureSchedule,
    viterbi: ViterbiDecoder,
    scrambler: EnergyDispersal,
    depunctured: Vec<SoftBit>,
    decoded: Vec<u8>,
}

impl FicDecoder {
    pub fn new(params: &DabParameters, backend: ViterbiBackend) -> DabResult<Self> {
        let data_bits = params.nb_fic_group_data_bits();
        let schedule = PunctureSchedule::fic(data_bits);
        if schedule.punctured_bits() != params.nb_fic_group_bits() {
            return Err(DabError::SegmentLength {
                segment: "FIC group",
                expected: schedule.punctured_bits(),
                actual: params.nb_fic_group_bits(),
            });
        }
        let viterbi = ViterbiDecoder::with_options(
            ConvCodeConfig::dab(),
            crate::types::SOFT_DECISION_HIGH,
            crate::types::SOFT_DECISION_LOW,
            backend,
        )?;

        Ok(Self {
            group_bits: params.nb_fic_group_bits(),
            data_bits,
            depunctured: Vec::with_capacity(schedule.mother_bits()),
            schedule,
            viterbi,
            scrambler: EnergyDispersal::new(data_bits),
            decoded: vec![0u8; data_bits / 8],
        })
    }

    /// Punctured soft bits per FIC group.
    pub fn group_bits(&self) -> usize {
        self.group_bits
    }

    /// Decode one FIC group and hand every FIB with its CRC verdict to
    /// `on_fib`.
    pub fn decode_group(
        &mut self,
        group: &[SoftBit],
        mut on_fib: impl FnMut(&[u8], bool),
    ) -> DabResult<()> {
        self.schedule.depuncture_into(group, &mut self.depunctured)?;
        self.viterbi.reset(0)?;
        self.viterbi.update(&self.depunctured)?;
        self.viterbi.chainback(&mut self.decoded, self.data_bits, 0)?;
        self.scrambler.apply(&mut self.decoded);

        for fib in self.decoded.chunks_exact(FIB_BYTES) {
            on_fib(fib, fib_crc_ok(fib));
        }
        Ok(())
    }

    /// Decode the whole FIC segment of a frame, group by group.
    pub fn decode(&mut self, fic: &[SoftBit], mut on_fib: impl FnMut(&[u8], bool)) -> DabResult<()> {
        if fic.len() % self.group_bits != 0 {
            return Err(DabError::SegmentLength {
                segment: "FIC",
                expected: fic.len() / self.group_bits * self.group_bits,
                actual: fic.len(),
            });
        }
        for group in fic.chunks_exact(self.group_bits) {
            self.decode_group(group, &mut on_fib)?;
        }
        Ok(())
    }

    /// Forget trellis state and scratch contents.
    pub fn reset(&mut self) {
        // State 0 is always in range
        let _ = self.viterbi.reset(0);
        self.depunctured.clear();
        self.decoded.fill(0);
    }
}

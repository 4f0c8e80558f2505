//! Per sub-channel decoding.
//!
//! A [`ProgramChannel`] owns everything needed to turn its share of the MSC
//! into logical frames: deinterleaver, trellis state and scratch buffers.
//! The dispatcher runs channels in parallel, one task each, so nothing in
//! here is shared with other channels.

use std::sync::Arc;

use super::deinterleaver::TimeDeinterleaver;
use super::protection::eep_schedule;
use crate::database::{Protection, Subchannel};
use crate::fec::energy_dispersal::EnergyDispersal;
use crate::fec::puncture::PunctureSchedule;
use crate::fec::viterbi::{ViterbiBackend, ViterbiDecoder};
use crate::fec::ConvCodeConfig;
use crate::observe::RadioMetrics;
use crate::observer::{Observable, SubscriptionId};
use crate::params::{DabParameters, CIF_CAPACITY_UNITS, CU_BITS};
use crate::types::{
    DabError, DabResult, SoftBit, SubchannelId, SOFT_DECISION_HIGH, SOFT_DECISION_LOW,
};

/// Subscriber to decoded logical frames.
pub type LogicalFrameCallback = dyn Fn(SubchannelId, &[u8]) + Send + Sync;

/// Decoder of one EEP sub-channel.
#[derive(Debug)]
pub struct ProgramChannel {
    subchannel: Subchannel,
    nb_cifs: usize,
    cif_bits: usize,
    start_bit: usize,
    schedule: PunctureSchedule,
    deinterleaver: TimeDeinterleaver,
    viterbi: ViterbiDecoder,
    scrambler: EnergyDispersal,
    deinterleaved: Vec<SoftBit>,
    depunctured: Vec<SoftBit>,
    decoded: Vec<u8>,
    frames_decoded: u64,
    on_logical_frame: Observable<LogicalFrameCallback>,
    metrics: Arc<RadioMetrics>,
}

impl ProgramChannel {
    pub fn new(
        params: &DabParameters,
        subchannel: &Subchannel,
        backend: ViterbiBackend,
        metrics: Arc<RadioMetrics>,
    ) -> DabResult<Self> {
        let end = subchannel.start_address as usize + subchannel.length as usize;
        if subchannel.length == 0 || end > CIF_CAPACITY_UNITS {
            return Err(DabError::SubchannelOutOfBounds {
                id: subchannel.id,
                start: subchannel.start_address,
                length: subchannel.length,
            });
        }

        let schedule = match subchannel.protection {
            Protection::Eep { profile, level } => eep_schedule(profile, level, subchannel.length)
                .ok_or_else(|| DabError::UnsupportedProtection {
                    id: subchannel.id,
                    reason: format!(
                        "size {} CU does not match EEP-{}{:?}",
                        subchannel.length, level, profile
                    ),
                })?,
            Protection::Uep { table_index } => {
                return Err(DabError::UnsupportedProtection {
                    id: subchannel.id,
                    reason: format!("UEP table index {}", table_index),
                })
            }
        };

        let nbits = subchannel.length as usize * CU_BITS;
        let data_bits = schedule.data_bits();
        let viterbi = ViterbiDecoder::with_options(
            ConvCodeConfig::dab(),
            SOFT_DECISION_HIGH,
            SOFT_DECISION_LOW,
            backend,
        )?;

        Ok(Self {
            subchannel: subchannel.clone(),
            nb_cifs: params.nb_cifs,
            cif_bits: params.nb_cif_bits,
            start_bit: subchannel.start_address as usize * CU_BITS,
            deinterleaver: TimeDeinterleaver::new(nbits),
            deinterleaved: vec![0; nbits],
            depunctured: Vec::with_capacity(schedule.mother_bits()),
            decoded: vec![0; data_bits / 8],
            scrambler: EnergyDispersal::new(data_bits),
            schedule,
            viterbi,
            frames_decoded: 0,
            on_logical_frame: Observable::new(),
            metrics,
        })
    }

    pub fn id(&self) -> SubchannelId {
        self.subchannel.id
    }

    pub fn subchannel(&self) -> &Subchannel {
        &self.subchannel
    }

    /// Bytes in one decoded logical frame (24 ms of content).
    pub fn logical_frame_bytes(&self) -> usize {
        self.decoded.len()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Subscribe to decoded logical frames.
    pub fn on_logical_frame(&self, callback: Box<LogicalFrameCallback>) -> SubscriptionId {
        self.on_logical_frame.attach(callback)
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.on_logical_frame.detach(id)
    }

    /// Decode this channel's share of the MSC segment of one frame.
    pub fn process(&mut self, msc: &[SoftBit]) -> DabResult<()> {
        let expected = self.nb_cifs * self.cif_bits;
        if msc.len() != expected {
            return Err(DabError::SegmentLength {
                segment: "MSC",
                expected,
                actual: msc.len(),
            });
        }

        let nbits = self.deinterleaver.nbits();
        for cif in msc.chunks_exact(self.cif_bits) {
            let bits = &cif[self.start_bit..self.start_bit + nbits];
            if self.deinterleaver.push(bits, &mut self.deinterleaved)? {
                self.decode_logical_frame()?;
            }
        }
        Ok(())
    }

    fn decode_logical_frame(&mut self) -> DabResult<()> {
        self.schedule
            .depuncture_into(&self.deinterleaved, &mut self.depunctured)?;
        self.viterbi.reset(0)?;
        self.viterbi.update(&self.depunctured)?;
        self.viterbi
            .chainback(&mut self.decoded, self.schedule.data_bits(), 0)?;
        self.scrambler.apply(&mut self.decoded);

        self.frames_decoded += 1;
        self.metrics.logical_frames_decoded.inc();
        let id = self.subchannel.id;
        let frame = &self.decoded;
        self.on_logical_frame.notify(|f| f(id, frame));
        tracing::trace!(subchannel = id, bytes = frame.len(), "logical frame");
        Ok(())
    }
}

//! Transmit-side simulation of a DAB ensemble.
//!
//! Builds complete transmission frames from a handful of services so the
//! receive chain can be exercised without a demodulator: FIGs are packed
//! into FIBs with their CRC, the FIC is scrambled, convolutionally encoded
//! and punctured, and every EEP sub-channel carries a deterministic payload
//! that is encoded and time interleaved the way a multiplexer would.
//!
//! ```rust
//! use dab_core::params::{DabParameters, TransmissionMode};
//! use dab_core::sim::EnsembleBuilder;
//!
//! let params = DabParameters::new(TransmissionMode::I);
//! let mut tx = EnsembleBuilder::new(params)
//!     .dab_plus_service(0xC221, 1, 0, 72)
//!     .transmitter();
//! assert_eq!(tx.next_frame().len(), params.nb_frame_bits);
//! ```

use std::collections::VecDeque;

use crate::bit_packing::unpack_bits;
use crate::database::{EepProfile, Protection, Subchannel, ASCTY_DAB_PLUS};
use crate::fec::crc::{Crc16, CrcComputer};
use crate::fec::{ConvCodeConfig, ConvolutionalEncoder, EnergyDispersal, PunctureSchedule};
use crate::fic::fig::{FIB_DATA_BYTES, LABEL_BYTES};
use crate::msc::deinterleaver::{interleave_delay, DEPTH};
use crate::msc::protection::{bitrate, eep_schedule};
use crate::params::{DabParameters, CU_BITS};
use crate::types::{EnsembleId, SoftBit, SubchannelId, SOFT_DECISION_HIGH, SOFT_DECISION_LOW};

/// Hard bits to full-confidence soft decisions.
pub fn to_soft(bits: &[bool]) -> Vec<SoftBit> {
    bits.iter()
        .map(|&b| if b { SOFT_DECISION_HIGH } else { SOFT_DECISION_LOW })
        .collect()
}

/// FIG 0/0: ensemble id and CIF counter.
pub fn fig0_0(ensemble_id: EnsembleId, cif_counter: u16) -> Vec<u8> {
    let cif = cif_counter % 5000;
    let [hi, lo] = ensemble_id.to_be_bytes();
    vec![0x05, 0x00, hi, lo, (cif / 250) as u8, (cif % 250) as u8]
}

/// FIG 0/1 with one long form (EEP) entry.
pub fn fig0_1_long(id: SubchannelId, start: u16, profile: EepProfile, level: u8, size: u16) -> Vec<u8> {
    let option = match profile {
        EepProfile::A => 0,
        EepProfile::B => 1,
    };
    vec![
        0x05,
        0x01,
        (id << 2) | ((start >> 8) as u8 & 0x03),
        start as u8,
        0x80 | (option << 4) | ((level.saturating_sub(1) & 0x03) << 2) | ((size >> 8) as u8 & 0x03),
        size as u8,
    ]
}

/// FIG 0/1 with one short form (UEP) entry.
pub fn fig0_1_short(id: SubchannelId, start: u16, table_index: u8) -> Vec<u8> {
    vec![
        0x04,
        0x01,
        (id << 2) | ((start >> 8) as u8 & 0x03),
        start as u8,
        table_index & 0x3F,
    ]
}

/// FIG 0/2 announcing a programme service with one primary stream audio
/// component.
pub fn fig0_2_audio(service: u16, ascty: u8, subchannel: SubchannelId) -> Vec<u8> {
    let [hi, lo] = service.to_be_bytes();
    vec![0x06, 0x02, hi, lo, 0x01, ascty & 0x3F, (subchannel << 2) | 0x02]
}

fn fig1(extension: u8, id: u16, label: &str) -> Vec<u8> {
    let mut fig = vec![0x20 | (1 + 2 + LABEL_BYTES as u8 + 2), extension & 0x07];
    fig.extend_from_slice(&id.to_be_bytes());
    let mut text: Vec<u8> = label.bytes().take(LABEL_BYTES).collect();
    text.resize(LABEL_BYTES, b' ');
    fig.extend_from_slice(&text);
    fig.extend_from_slice(&[0xFF, 0x00]);
    fig
}

/// FIG 1/0: ensemble label.
pub fn fig1_0(ensemble_id: EnsembleId, label: &str) -> Vec<u8> {
    fig1(0, ensemble_id, label)
}

/// FIG 1/1: programme service label.
pub fn fig1_1(service: u16, label: &str) -> Vec<u8> {
    fig1(1, service, label)
}

/// One FIB: the FIGs, end marker padding and CRC.
///
/// # Panics
///
/// If the FIGs do not fit into 30 bytes.
pub fn fib_with_figs(figs: &[Vec<u8>]) -> Vec<u8> {
    let mut fib = figs.concat();
    assert!(fib.len() <= FIB_DATA_BYTES, "FIGs overflow the FIB");
    fib.resize(FIB_DATA_BYTES, 0xFF);
    let crc = Crc16::compute(&fib);
    fib.extend_from_slice(&crc.to_be_bytes());
    fib
}

/// Encode the FIBs of one FIC group into punctured soft bits.
pub fn encode_fic_group(params: &DabParameters, fibs: &[Vec<u8>]) -> Vec<SoftBit> {
    let data_bits = params.nb_fic_group_data_bits();
    let mut data = fibs.concat();
    data.resize(data_bits / 8, 0);
    EnergyDispersal::new(data_bits).apply(&mut data);

    let mother = ConvolutionalEncoder::new(ConvCodeConfig::dab()).encode(&unpack_bits(&data, data_bits));
    // Mother codeword length always matches the schedule
    let punctured = PunctureSchedule::fic(data_bits).puncture(&mother).unwrap_or_default();
    to_soft(&punctured)
}

/// Encode all FIBs of one frame, group by group.
pub fn encode_fic(params: &DabParameters, fibs: &[Vec<u8>]) -> Vec<SoftBit> {
    fibs.chunks(params.nb_fibs_per_group())
        .flat_map(|group| encode_fic_group(params, group))
        .collect()
}

/// Describes an ensemble and renders its FIC.
#[derive(Debug, Clone)]
pub struct EnsembleBuilder {
    params: DabParameters,
    ensemble_id: EnsembleId,
    figs: Vec<Vec<u8>>,
    subchannels: Vec<Subchannel>,
}

impl EnsembleBuilder {
    pub fn new(params: DabParameters) -> Self {
        Self {
            params,
            ensemble_id: 0xCE15,
            figs: Vec::new(),
            subchannels: Vec::new(),
        }
    }

    pub fn ensemble_id(mut self, id: EnsembleId) -> Self {
        self.ensemble_id = id;
        self
    }

    pub fn ensemble_label(mut self, label: &str) -> Self {
        let fig = fig1_0(self.ensemble_id, label);
        self.figs.push(fig);
        self
    }

    /// Add a FIG verbatim.
    pub fn raw_fig(mut self, fig: Vec<u8>) -> Self {
        self.figs.push(fig);
        self
    }

    /// Programme service on an EEP-3A sub-channel carrying DAB+.
    pub fn dab_plus_service(self, service: u16, subchannel: SubchannelId, start: u16, size: u16) -> Self {
        self.audio_service(
            service,
            ASCTY_DAB_PLUS,
            subchannel,
            start,
            size,
            Protection::Eep {
                profile: EepProfile::A,
                level: 3,
            },
        )
    }

    /// Programme service with one stream audio component.
    pub fn audio_service(
        mut self,
        service: u16,
        ascty: u8,
        subchannel: SubchannelId,
        start: u16,
        size: u16,
        protection: Protection,
    ) -> Self {
        let organisation = match protection {
            Protection::Eep { profile, level } => fig0_1_long(subchannel, start, profile, level, size),
            Protection::Uep { table_index } => fig0_1_short(subchannel, start, table_index),
        };
        self.figs.push(organisation);
        self.figs.push(fig0_2_audio(service, ascty, subchannel));
        self.subchannels.push(Subchannel {
            id: subchannel,
            start_address: start,
            length: size,
            protection,
            bitrate: bitrate(protection, size).unwrap_or(0),
        });
        self
    }

    pub fn service_label(mut self, service: u16, label: &str) -> Self {
        self.figs.push(fig1_1(service, label));
        self
    }

    pub fn subchannels(&self) -> &[Subchannel] {
        &self.subchannels
    }

    /// FIBs of one frame.
    ///
    /// FIG 0/0 leads, the other FIGs follow in insertion order, packed
    /// greedily. Once the FIGs are exhausted the sequence repeats until
    /// the frame's FIBs are filled.
    pub fn fibs(&self, cif_counter: u16) -> Vec<Vec<u8>> {
        let mut packed: Vec<Vec<Vec<u8>>> = vec![vec![fig0_0(self.ensemble_id, cif_counter)]];
        for fig in &self.figs {
            let used: usize = packed.last().map_or(0, |f| f.iter().map(Vec::len).sum());
            match packed.last_mut() {
                Some(current) if used + fig.len() <= FIB_DATA_BYTES => current.push(fig.clone()),
                _ => packed.push(vec![fig.clone()]),
            }
        }
        packed
            .iter()
            .cycle()
            .take(self.params.nb_fibs)
            .map(|figs| fib_with_figs(figs))
            .collect()
    }

    /// Encoded FIC segment of one frame.
    pub fn fic(&self) -> Vec<SoftBit> {
        encode_fic(&self.params, &self.fibs(0))
    }

    pub fn transmitter(self) -> Transmitter {
        let msc = MscEncoder::new(self.params, self.subchannels.clone());
        Transmitter {
            ensemble: self,
            msc,
            cif_counter: 0,
        }
    }
}

#[derive(Debug)]
struct EncodedChannel {
    subchannel: Subchannel,
    schedule: PunctureSchedule,
    scrambler: EnergyDispersal,
    /// Encoded logical frames, most recent first.
    history: VecDeque<Vec<SoftBit>>,
}

/// Encodes and time interleaves the payload of every EEP sub-channel.
///
/// Logical frame `k` of sub-channel `id` has the content returned by
/// [`MscEncoder::logical_frame`]. UEP sub-channels are left empty.
#[derive(Debug)]
pub struct MscEncoder {
    params: DabParameters,
    channels: Vec<EncodedChannel>,
    cif_index: usize,
}

impl MscEncoder {
    pub fn new(params: DabParameters, subchannels: Vec<Subchannel>) -> Self {
        let channels = subchannels
            .into_iter()
            .filter_map(|subchannel| {
                let Protection::Eep { profile, level } = subchannel.protection else {
                    return None;
                };
                let schedule = eep_schedule(profile, level, subchannel.length)?;
                Some(EncodedChannel {
                    scrambler: EnergyDispersal::new(schedule.data_bits()),
                    schedule,
                    subchannel,
                    history: VecDeque::with_capacity(DEPTH),
                })
            })
            .collect();
        Self {
            params,
            channels,
            cif_index: 0,
        }
    }

    /// Payload of logical frame `k` of sub-channel `id`, empty for unknown
    /// sub-channels.
    pub fn logical_frame(&self, id: SubchannelId, k: usize) -> Vec<u8> {
        let Some(channel) = self.channels.iter().find(|c| c.subchannel.id == id) else {
            return Vec::new();
        };
        (0..channel.schedule.data_bits() / 8)
            .map(|j| (j.wrapping_mul(13) ^ k.wrapping_mul(7) ^ (id as usize).wrapping_mul(29)) as u8)
            .collect()
    }

    /// Soft bits of the next CIF.
    pub fn next_cif(&mut self) -> Vec<SoftBit> {
        let mut cif = vec![0; self.params.nb_cif_bits];
        for index in 0..self.channels.len() {
            let id = self.channels[index].subchannel.id;
            let payload = self.logical_frame(id, self.cif_index);
            let channel = &mut self.channels[index];

            let mut data = payload;
            channel.scrambler.apply(&mut data);
            let mother = ConvolutionalEncoder::new(ConvCodeConfig::dab())
                .encode(&unpack_bits(&data, channel.schedule.data_bits()));
            let punctured = channel.schedule.puncture(&mother).unwrap_or_default();
            channel.history.push_front(to_soft(&punctured));
            channel.history.truncate(DEPTH);

            let start = channel.subchannel.start_address as usize * CU_BITS;
            let nbits = channel.subchannel.length as usize * CU_BITS;
            for (i, slot) in cif[start..start + nbits].iter_mut().enumerate() {
                *slot = channel
                    .history
                    .get(interleave_delay(i))
                    .map_or(0, |frame| frame[i]);
            }
        }
        self.cif_index += 1;
        cif
    }

    /// Soft bits of the MSC segment of the next frame.
    pub fn next_msc(&mut self) -> Vec<SoftBit> {
        (0..self.params.nb_cifs).flat_map(|_| self.next_cif()).collect()
    }

    /// Number of CIFs produced so far.
    pub fn cif_index(&self) -> usize {
        self.cif_index
    }
}

/// A complete simulated transmitter: FIC and MSC of consecutive frames.
#[derive(Debug)]
pub struct Transmitter {
    ensemble: EnsembleBuilder,
    msc: MscEncoder,
    cif_counter: u16,
}

impl Transmitter {
    /// The next transmission frame.
    pub fn next_frame(&mut self) -> Vec<SoftBit> {
        let params = self.ensemble.params;
        let mut frame = encode_fic(&params, &self.ensemble.fibs(self.cif_counter));
        frame.extend(self.msc.next_msc());
        self.cif_counter = (self.cif_counter + params.nb_cifs as u16) % 5000;
        frame
    }

    pub fn msc(&self) -> &MscEncoder {
        &self.msc
    }

    pub fn subchannels(&self) -> &[Subchannel] {
        self.ensemble.subchannels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::crc::fib_crc_ok;
    use crate::params::TransmissionMode;

    #[test]
    fn test_fib_layout() {
        let fib = fib_with_figs(&[fig0_0(0xCE15, 757)]);
        assert_eq!(fib.len(), 32);
        assert_eq!(&fib[..6], &[0x05, 0x00, 0xCE, 0x15, 0x03, 0x07]);
        assert!(fib[6..30].iter().all(|&b| b == 0xFF));
        assert!(fib_crc_ok(&fib));
    }

    #[test]
    fn test_fibs_fill_the_frame() {
        let params = DabParameters::new(TransmissionMode::I);
        let builder = EnsembleBuilder::new(params)
            .ensemble_label("Test Mux")
            .dab_plus_service(0xC221, 1, 0, 72)
            .service_label(0xC221, "Radio One");
        let fibs = builder.fibs(0);
        assert_eq!(fibs.len(), 12);
        assert!(fibs.iter().all(|f| fib_crc_ok(f)));
        assert_eq!(builder.fic().len(), params.nb_fic_bits);
    }

    #[test]
    fn test_msc_geometry() {
        let params = DabParameters::new(TransmissionMode::II);
        let mut tx = EnsembleBuilder::new(params)
            .dab_plus_service(0xC221, 1, 10, 12)
            .transmitter();
        assert_eq!(tx.next_frame().len(), params.nb_frame_bits);
        assert_eq!(tx.msc().cif_index(), 1);
        assert_eq!(tx.msc().logical_frame(1, 0).len(), 48);
        assert!(tx.msc().logical_frame(9, 0).is_empty());
    }
}

//! The control-stream pipeline.
//!
//! [`FicRunner`] is the single owner of everything derived from the FIC:
//! the FIC decoder and its trellis state, the live database, the pending
//! [`DatabaseUpdater`] and the [`MiscInfo`] of the latest frame. It has no
//! locking of its own. The dispatcher runs exactly one instance, under its
//! registry lock, once per frame.

use std::sync::Arc;

use super::decoder::FicDecoder;
use super::fig::{
    ComponentDescription, EnsembleInfo, FigHandler, FigProcessor, FigStats, ServiceInfo,
    SubchannelForm, SubchannelOrganisation,
};
use crate::database::{
    AudioServiceType, Database, DatabaseUpdater, EepProfile, MiscInfo, ServiceComponent,
    TransportMode,
};
use crate::fec::viterbi::ViterbiBackend;
use crate::observe::RadioMetrics;
use crate::params::DabParameters;
use crate::types::{DabError, DabResult, EnsembleId, ServiceId, SoftBit};

/// Routes parsed FIGs into the updater and the misc info.
struct RadioFigHandler<'a> {
    updater: &'a mut DatabaseUpdater,
    misc_info: &'a mut MiscInfo,
}

impl FigHandler for RadioFigHandler<'_> {
    fn on_ensemble_info(&mut self, info: &EnsembleInfo) {
        self.updater.set_ensemble_id(info.id);
        self.misc_info.cif_counter = Some(info.cif_counter);
        self.misc_info.change_flags = info.change_flags;
        self.misc_info.alarm = info.alarm;
    }

    fn on_subchannel(&mut self, sub: &SubchannelOrganisation) {
        let result = match sub.form {
            SubchannelForm::Short {
                table_switch: false,
                table_index,
            } => self
                .updater
                .set_subchannel_uep(sub.id, sub.start_address, table_index),
            SubchannelForm::Short {
                table_switch: true, ..
            } => {
                tracing::debug!(subchannel = sub.id, "reserved UEP table switch");
                return;
            }
            SubchannelForm::Long {
                option,
                level,
                size,
            } => {
                let profile = match option {
                    0 => EepProfile::A,
                    1 => EepProfile::B,
                    _ => {
                        tracing::debug!(subchannel = sub.id, option, "reserved EEP option");
                        return;
                    }
                };
                self.updater
                    .set_subchannel_eep(sub.id, sub.start_address, profile, level, size)
            }
        };
        if let Err(e) = result {
            tracing::warn!(subchannel = sub.id, error = %e, "sub-channel rejected");
        }
    }

    fn on_service(&mut self, service: &ServiceInfo) {
        self.updater.declare_service(service.id, service.ca_id);

        for component in &service.components {
            let record = match component.description {
                ComponentDescription::StreamAudio {
                    ascty,
                    subchannel_id,
                } => ServiceComponent {
                    service_id: service.id,
                    transport_mode: TransportMode::StreamAudio,
                    audio_service_type: Some(AudioServiceType::from_ascty(ascty)),
                    data_service_type: None,
                    subchannel_id: Some(subchannel_id),
                    scid: None,
                    is_primary: component.is_primary,
                },
                ComponentDescription::StreamData {
                    dscty,
                    subchannel_id,
                } => ServiceComponent {
                    service_id: service.id,
                    transport_mode: TransportMode::StreamData,
                    audio_service_type: None,
                    data_service_type: Some(dscty),
                    subchannel_id: Some(subchannel_id),
                    scid: None,
                    is_primary: component.is_primary,
                },
                ComponentDescription::Packet { scid } => ServiceComponent {
                    service_id: service.id,
                    transport_mode: TransportMode::PacketData,
                    audio_service_type: None,
                    data_service_type: None,
                    subchannel_id: None,
                    scid: Some(scid),
                    is_primary: component.is_primary,
                },
            };
            if let Err(e) = self.updater.add_service_component(record) {
                tracing::warn!(service = service.id, error = %e, "service component rejected");
            }
        }
    }

    fn on_ensemble_label(&mut self, _id: EnsembleId, label: &str) {
        self.updater.set_ensemble_label(label.to_string());
    }

    fn on_service_label(&mut self, id: ServiceId, label: &str) {
        self.updater.set_service_label(id, label.to_string());
    }
}

/// Decoder, FIG processor and database state of the control stream.
#[derive(Debug)]
pub struct FicRunner {
    decoder: FicDecoder,
    fig_processor: FigProcessor,
    live: Database,
    updater: DatabaseUpdater,
    misc_info: MiscInfo,
    fic_bits: usize,
    metrics: Arc<RadioMetrics>,
}

impl FicRunner {
    pub fn new(
        params: &DabParameters,
        backend: ViterbiBackend,
        metrics: Arc<RadioMetrics>,
    ) -> DabResult<Self> {
        Ok(Self {
            decoder: FicDecoder::new(params, backend)?,
            fig_processor: FigProcessor::new(),
            live: Database::new(),
            updater: DatabaseUpdater::new(),
            misc_info: MiscInfo::default(),
            fic_bits: params.nb_fic_bits,
            metrics,
        })
    }

    /// Decode the FIC segment of one frame and fold its FIGs into the
    /// updater. FIBs failing their CRC are dropped.
    pub fn process(&mut self, fic: &[SoftBit]) -> DabResult<()> {
        if fic.len() != self.fic_bits {
            return Err(DabError::SegmentLength {
                segment: "FIC",
                expected: self.fic_bits,
                actual: fic.len(),
            });
        }

        let Self {
            decoder,
            fig_processor,
            updater,
            misc_info,
            metrics,
            ..
        } = self;
        let mut handler = RadioFigHandler { updater, misc_info };

        decoder.decode(fic, |fib, crc_ok| {
            if crc_ok {
                metrics.fibs_decoded.inc();
                fig_processor.process_fib(fib, &mut handler);
            } else {
                metrics.fib_crc_failures.inc();
                tracing::debug!("FIB CRC mismatch");
            }
        })
    }

    /// Clear decoder state and discard pending updates. The live database
    /// is left alone.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.updater.clear();
        self.misc_info = MiscInfo::default();
    }

    pub fn live_database(&self) -> &Database {
        &self.live
    }

    pub fn live_database_mut(&mut self) -> &mut Database {
        &mut self.live
    }

    pub fn database_updater(&self) -> &DatabaseUpdater {
        &self.updater
    }

    pub fn misc_info(&self) -> &MiscInfo {
        &self.misc_info
    }

    pub fn fig_stats(&self) -> FigStats {
        self.fig_processor.stats()
    }

    /// Live database and updater together, for committing one into the
    /// other.
    pub fn database_parts(&mut self) -> (&mut Database, &mut DatabaseUpdater) {
        (&mut self.live, &mut self.updater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Protection;
    use crate::params::TransmissionMode;
    use crate::sim::{encode_fic, fig0_1_long, EnsembleBuilder};

    fn runner(params: &DabParameters) -> FicRunner {
        FicRunner::new(params, ViterbiBackend::detect(), Arc::new(RadioMetrics::new())).unwrap()
    }

    #[test]
    fn test_figs_reach_updater() {
        let params = DabParameters::new(TransmissionMode::I);
        let builder = EnsembleBuilder::new(params)
            .dab_plus_service(0xC221, 3, 0, 72)
            .service_label(0xC221, "Radio Three");
        let fic = encode_fic(&params, &builder.fibs(42));

        let mut runner = runner(&params);
        runner.process(&fic).unwrap();
        assert_eq!(runner.metrics.fibs_decoded.get(), 12);
        assert_eq!(runner.misc_info().cif_counter, Some(42));

        let (live, updater) = runner.database_parts();
        assert!(updater.commit(live) > 0);
        let sub = runner.live_database().get_subchannel(3).unwrap();
        assert_eq!(
            sub.protection,
            Protection::Eep {
                profile: EepProfile::A,
                level: 3
            }
        );
        let service = runner.live_database().get_service(0xC221).unwrap();
        assert_eq!(service.label.as_deref(), Some("Radio Three"));
    }

    #[test]
    fn test_invalid_subchannel_is_dropped() {
        let params = DabParameters::new(TransmissionMode::I);
        // Size 70 is not a multiple of 6 for EEP-3A
        let fic = EnsembleBuilder::new(params)
            .raw_fig(fig0_1_long(5, 0, EepProfile::A, 3, 70))
            .fic();

        let mut runner = runner(&params);
        runner.process(&fic).unwrap();
        let (live, updater) = runner.database_parts();
        updater.commit(live);
        assert!(runner.live_database().get_subchannel(5).is_none());
    }

    #[test]
    fn test_crc_failures_are_counted() {
        let params = DabParameters::new(TransmissionMode::I);
        let mut runner = runner(&params);
        // All erasures decode to something that fails the CRC
        runner.process(&vec![0; params.nb_fic_bits]).unwrap();
        assert_eq!(runner.metrics.fib_crc_failures.get(), 12);
        assert!(runner.database_updater().is_empty());
    }

    #[test]
    fn test_reset_discards_pending() {
        let params = DabParameters::new(TransmissionMode::I);
        let fic = EnsembleBuilder::new(params).dab_plus_service(0xC221, 1, 0, 72).fic();
        let mut runner = runner(&params);
        runner.process(&fic).unwrap();
        assert!(!runner.database_updater().is_empty());

        runner.reset();
        assert!(runner.database_updater().is_empty());
        assert_eq!(*runner.misc_info(), MiscInfo::default());
    }

    #[test]
    fn test_wrong_segment_length() {
        let params = DabParameters::new(TransmissionMode::I);
        let mut runner = runner(&params);
        assert!(matches!(
            runner.process(&[0; 10]),
            Err(DabError::SegmentLength { segment: "FIC", .. })
        ));
    }
}

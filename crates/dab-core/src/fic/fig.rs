//! Fast Information Group parsing (EN 300 401, clauses 5.2 and 6)
//!
//! A FIB carries 30 bytes of FIGs followed by its CRC. Each FIG starts with
//! a one byte header, type (3 bits) and length (5 bits); a header of `0xFF`
//! marks the end of the useful data. Supported groups:
//!
//! | FIG  | Content                                   |
//! |------|-------------------------------------------|
//! | 0/0  | Ensemble id, change flags, alarm, CIF count |
//! | 0/1  | Sub-channel organisation                  |
//! | 0/2  | Service organisation                      |
//! | 1/0  | Ensemble label                            |
//! | 1/1  | Programme service label                   |
//!
//! FIGs for the next configuration (C/N = 1) or other ensembles (OE = 1)
//! are skipped. A FIG that runs past the end of its FIB ends parsing of that
//! FIB; what was parsed before it stands.

use crate::params::FIB_BYTES;
use crate::types::{EnsembleId, ServiceId, SubchannelId};

/// Bytes of FIG data in one FIB.
pub const FIB_DATA_BYTES: usize = FIB_BYTES - 2;

/// Length of a label in FIG type 1.
pub const LABEL_BYTES: usize = 16;

const END_MARKER: u8 = 0xFF;

/// Content of FIG 0/0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsembleInfo {
    pub id: EnsembleId,
    pub change_flags: u8,
    pub alarm: bool,
    /// CIF counter, 0..5000
    pub cif_counter: u16,
}

/// Size and protection of a sub-channel as signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubchannelForm {
    /// Short form: row of the UEP table
    Short { table_switch: bool, table_index: u8 },
    /// Long form: EEP option (0 = A, 1 = B), level 1..=4, size in CU
    Long { option: u8, level: u8, size: u16 },
}

/// One entry of FIG 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubchannelOrganisation {
    pub id: SubchannelId,
    pub start_address: u16,
    pub form: SubchannelForm,
}

/// What a service component points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentDescription {
    /// TMId 0
    StreamAudio { ascty: u8, subchannel_id: SubchannelId },
    /// TMId 1
    StreamData { dscty: u8, subchannel_id: SubchannelId },
    /// TMId 3
    Packet { scid: u16 },
}

/// One component entry of FIG 0/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub description: ComponentDescription,
    pub is_primary: bool,
    pub ca_flag: bool,
}

/// One service entry of FIG 0/2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub ca_id: u8,
    pub components: Vec<ComponentInfo>,
}

/// Receiver of parsed FIGs. Every method defaults to ignoring the FIG.
pub trait FigHandler {
    fn on_ensemble_info(&mut self, _info: &EnsembleInfo) {}
    fn on_subchannel(&mut self, _subchannel: &SubchannelOrganisation) {}
    fn on_service(&mut self, _service: &ServiceInfo) {}
    fn on_ensemble_label(&mut self, _id: EnsembleId, _label: &str) {}
    fn on_service_label(&mut self, _id: ServiceId, _label: &str) {}
}

/// Parse counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FigStats {
    pub figs_parsed: u64,
    pub figs_ignored: u64,
    pub figs_malformed: u64,
}

/// Walks FIBs and dispatches their FIGs to a [`FigHandler`].
#[derive(Debug, Clone, Default)]
pub struct FigProcessor {
    stats: FigStats,
}

impl FigProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> FigStats {
        self.stats
    }

    /// Parse one FIB. Only the first 30 bytes are looked at; the CRC is
    /// expected to have been checked already.
    pub fn process_fib<H: FigHandler + ?Sized>(&mut self, fib: &[u8], handler: &mut H) {
        let data = &fib[..fib.len().min(FIB_DATA_BYTES)];
        let mut i = 0;

        while i < data.len() {
            let header = data[i];
            if header == END_MARKER {
                break;
            }
            let fig_type = header >> 5;
            let length = (header & 0x1F) as usize;
            i += 1;

            if i + length > data.len() {
                tracing::debug!(fig_type, length, offset = i, "FIG runs past end of FIB");
                self.stats.figs_malformed += 1;
                break;
            }
            let body = &data[i..i + length];
            i += length;

            if body.is_empty() {
                continue;
            }
            let ok = match fig_type {
                0 => self.process_type0(body, handler),
                1 => self.process_type1(body, handler),
                _ => {
                    self.stats.figs_ignored += 1;
                    continue;
                }
            };
            if !ok {
                tracing::debug!(fig_type, length, "malformed FIG");
                self.stats.figs_malformed += 1;
            }
        }
    }

    /// Returns `false` for malformed content.
    fn process_type0<H: FigHandler + ?Sized>(&mut self, body: &[u8], handler: &mut H) -> bool {
        let cn = body[0] & 0x80 != 0;
        let oe = body[0] & 0x40 != 0;
        let pd = body[0] & 0x20 != 0;
        let extension = body[0] & 0x1F;
        let field = &body[1..];

        if cn || oe {
            self.stats.figs_ignored += 1;
            return true;
        }

        let ok = match extension {
            0 => parse_fig0_0(field, handler),
            1 => parse_fig0_1(field, handler),
            2 => parse_fig0_2(field, pd, handler),
            _ => {
                self.stats.figs_ignored += 1;
                return true;
            }
        };
        if ok {
            self.stats.figs_parsed += 1;
        }
        ok
    }

    fn process_type1<H: FigHandler + ?Sized>(&mut self, body: &[u8], handler: &mut H) -> bool {
        let charset = body[0] >> 4;
        let oe = body[0] & 0x08 != 0;
        let extension = body[0] & 0x07;
        let field = &body[1..];

        if oe || extension > 1 {
            self.stats.figs_ignored += 1;
            return true;
        }
        // 16-bit identifier, label, character flag field
        if field.len() < 2 + LABEL_BYTES + 2 {
            return false;
        }
        let id = u16::from_be_bytes([field[0], field[1]]);
        let label = decode_label(charset, &field[2..2 + LABEL_BYTES]);
        match extension {
            0 => handler.on_ensemble_label(id, &label),
            _ => handler.on_service_label(id as ServiceId, &label),
        }
        self.stats.figs_parsed += 1;
        true
    }
}

fn parse_fig0_0<H: FigHandler + ?Sized>(field: &[u8], handler: &mut H) -> bool {
    if field.len() < 4 {
        return false;
    }
    let info = EnsembleInfo {
        id: u16::from_be_bytes([field[0], field[1]]),
        change_flags: field[2] >> 6,
        alarm: field[2] & 0x20 != 0,
        cif_counter: (field[2] & 0x1F) as u16 * 250 + field[3] as u16,
    };
    if info.cif_counter >= 5000 {
        return false;
    }
    handler.on_ensemble_info(&info);
    true
}

fn parse_fig0_1<H: FigHandler + ?Sized>(mut field: &[u8], handler: &mut H) -> bool {
    while !field.is_empty() {
        if field.len() < 3 {
            return false;
        }
        let id = field[0] >> 2;
        let start_address = ((field[0] & 0x03) as u16) << 8 | field[1] as u16;
        let (form, used) = if field[2] & 0x80 == 0 {
            let form = SubchannelForm::Short {
                table_switch: field[2] & 0x40 != 0,
                table_index: field[2] & 0x3F,
            };
            (form, 3)
        } else {
            if field.len() < 4 {
                return false;
            }
            let form = SubchannelForm::Long {
                option: (field[2] >> 4) & 0x07,
                level: ((field[2] >> 2) & 0x03) + 1,
                size: ((field[2] & 0x03) as u16) << 8 | field[3] as u16,
            };
            (form, 4)
        };
        handler.on_subchannel(&SubchannelOrganisation {
            id,
            start_address,
            form,
        });
        field = &field[used..];
    }
    true
}

fn parse_fig0_2<H: FigHandler + ?Sized>(mut field: &[u8], pd: bool, handler: &mut H) -> bool {
    let sid_bytes = if pd { 4 } else { 2 };

    while !field.is_empty() {
        if field.len() < sid_bytes + 1 {
            return false;
        }
        let id = field[..sid_bytes]
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);
        let ca_id = (field[sid_bytes] >> 4) & 0x07;
        let nb_components = (field[sid_bytes] & 0x0F) as usize;
        field = &field[sid_bytes + 1..];

        if field.len() < 2 * nb_components {
            return false;
        }
        let components = field[..2 * nb_components]
            .chunks_exact(2)
            .filter_map(|c| parse_component(c[0], c[1]))
            .collect();
        field = &field[2 * nb_components..];

        handler.on_service(&ServiceInfo {
            id,
            ca_id,
            components,
        });
    }
    true
}

fn parse_component(b0: u8, b1: u8) -> Option<ComponentInfo> {
    let tmid = b0 >> 6;
    let kind = b0 & 0x3F;
    let subchannel_id = b1 >> 2;
    let description = match tmid {
        0 => ComponentDescription::StreamAudio {
            ascty: kind,
            subchannel_id,
        },
        1 => ComponentDescription::StreamData {
            dscty: kind,
            subchannel_id,
        },
        3 => ComponentDescription::Packet {
            scid: (kind as u16) << 6 | (b1 >> 2) as u16,
        },
        _ => return None,
    };
    Some(ComponentInfo {
        description,
        is_primary: b1 & 0x02 != 0,
        ca_flag: b1 & 0x01 != 0,
    })
}

/// Decode a 16-byte label, trailing padding removed.
fn decode_label(charset: u8, raw: &[u8]) -> String {
    let text = match charset {
        // UTF-8
        15 => String::from_utf8_lossy(raw).into_owned(),
        // TODO: map the EBU Latin upper half (0x80..=0xFF) to Unicode
        // instead of reading it as ISO 8859-1.
        _ => raw.iter().map(|&b| b as char).collect(),
    };
    text.trim_end_matches(|c: char| c == ' ' || c == '\0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        ensemble: Vec<EnsembleInfo>,
        subchannels: Vec<SubchannelOrganisation>,
        services: Vec<ServiceInfo>,
        labels: Vec<(u32, String)>,
    }

    impl FigHandler for Collect {
        fn on_ensemble_info(&mut self, info: &EnsembleInfo) {
            self.ensemble.push(*info);
        }
        fn on_subchannel(&mut self, subchannel: &SubchannelOrganisation) {
            self.subchannels.push(*subchannel);
        }
        fn on_service(&mut self, service: &ServiceInfo) {
            self.services.push(service.clone());
        }
        fn on_ensemble_label(&mut self, id: EnsembleId, label: &str) {
            self.labels.push((id as u32, label.to_string()));
        }
        fn on_service_label(&mut self, id: ServiceId, label: &str) {
            self.labels.push((id, label.to_string()));
        }
    }

    fn fib(figs: &[&[u8]]) -> Vec<u8> {
        let mut data: Vec<u8> = figs.concat();
        data.resize(FIB_DATA_BYTES, 0xFF);
        data.extend_from_slice(&[0, 0]);
        data
    }

    fn run(fib: &[u8]) -> (Collect, FigStats) {
        let mut processor = FigProcessor::new();
        let mut collect = Collect::default();
        processor.process_fib(fib, &mut collect);
        (collect, processor.stats())
    }

    #[test]
    fn test_fig0_0() {
        // type 0, length 5: ext 0, EId 0xCE15, change 0, alarm 1, CIF 3*250+7
        let (c, _) = run(&fib(&[&[0x05, 0x00, 0xCE, 0x15, 0x23, 0x07]]));
        assert_eq!(
            c.ensemble,
            vec![EnsembleInfo {
                id: 0xCE15,
                change_flags: 0,
                alarm: true,
                cif_counter: 757
            }]
        );
    }

    #[test]
    fn test_fig0_1_short_and_long_form() {
        let (c, _) = run(&fib(&[&[
            0x08, 0x01, // FIG 0/1, 7 bytes of field
            0x04, 0x48, 0x10, // SubChId 1, start 0x048, short, index 16
            0x08, 0x90, 0xA8, 0x48, // SubChId 2, start 0x090, long form
        ]]));
        assert_eq!(c.subchannels.len(), 2);
        assert_eq!(
            c.subchannels[0],
            SubchannelOrganisation {
                id: 1,
                start_address: 0x48,
                form: SubchannelForm::Short {
                    table_switch: false,
                    table_index: 16
                }
            }
        );
        // 0xA8 = 1 010 10 00: long, option 2, level 3, size high 0
        assert_eq!(
            c.subchannels[1].form,
            SubchannelForm::Long {
                option: 2,
                level: 3,
                size: 0x48
            }
        );
        assert_eq!(c.subchannels[1].start_address, 0x90);
    }

    #[test]
    fn test_fig0_2_programme_and_data_services() {
        let (c, _) = run(&fib(&[
            // Programme service 0xC221, one DAB+ component on SubChId 1, primary
            &[0x06, 0x02, 0xC2, 0x21, 0x01, 0x3F, 0x06],
            // Data service (P/D = 1) 0xE0C22100, one packet component SCId 5
            &[0x08, 0x22, 0xE0, 0xC2, 0x21, 0x00, 0x01, 0xC0, 0x16],
        ]));
        assert_eq!(c.services.len(), 2);
        assert_eq!(c.services[0].id, 0xC221);
        assert_eq!(
            c.services[0].components,
            vec![ComponentInfo {
                description: ComponentDescription::StreamAudio {
                    ascty: 63,
                    subchannel_id: 1
                },
                is_primary: true,
                ca_flag: false
            }]
        );
        assert_eq!(c.services[1].id, 0xE0C2_2100);
        assert_eq!(
            c.services[1].components[0].description,
            ComponentDescription::Packet { scid: 5 }
        );
    }

    #[test]
    fn test_fig1_labels() {
        let mut fig = vec![0x35, 0x01, 0xC2, 0x21];
        fig.extend_from_slice(b"Radio One       ");
        fig.extend_from_slice(&[0xFF, 0x00]);
        let (c, _) = run(&fib(&[&fig]));
        assert_eq!(c.labels, vec![(0xC221, "Radio One".to_string())]);
    }

    #[test]
    fn test_next_configuration_and_other_ensemble_are_ignored() {
        let (c, stats) = run(&fib(&[
            &[0x05, 0x80, 0xCE, 0x15, 0x00, 0x00],
            &[0x05, 0x40, 0xCE, 0x15, 0x00, 0x00],
        ]));
        assert!(c.ensemble.is_empty());
        assert_eq!(stats.figs_ignored, 2);
    }

    #[test]
    fn test_truncated_fig_stops_parsing() {
        let mut data = vec![0x05, 0x00, 0xCE, 0x15, 0x00, 0x01];
        // Header claims 31 bytes, more than is left in the FIB
        data.push(0x1F);
        data.resize(FIB_DATA_BYTES, 0x00);
        let (c, stats) = run(&data);
        assert_eq!(c.ensemble.len(), 1);
        assert_eq!(stats.figs_malformed, 1);
    }

    #[test]
    fn test_short_field_is_malformed() {
        let (c, stats) = run(&fib(&[&[0x03, 0x01, 0x04, 0x48]]));
        assert!(c.subchannels.is_empty());
        assert_eq!(stats.figs_malformed, 1);
    }

    #[test]
    fn test_utf8_label() {
        assert_eq!(decode_label(15, "Café\0\0\0\0\0\0\0\0\0\0\0".as_bytes()), "Café");
        assert_eq!(decode_label(0, b"Mux  \0          "), "Mux");
    }
}

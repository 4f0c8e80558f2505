//! Ensemble database
//!
//! The structured view of the multiplex configuration carried by the FIC:
//! which sub-channels exist where in the CIF, how they are protected, and
//! which services and service components they belong to.
//!
//! ```text
//!   Service (SId) ──┬── ServiceComponent ── stream ──▶ Subchannel (SubChId)
//!                   └── ServiceComponent ── packet ──▶ SCId
//! ```
//!
//! Changes never go into a [`Database`] directly. The control stream
//! accumulates them in a [`DatabaseUpdater`], which is committed at a frame
//! boundary; the [`DatabaseManager`] then publishes the result.

pub mod manager;
pub mod updater;

pub use manager::DatabaseManager;
pub use updater::{DatabaseUpdater, UpdateError};

use serde::Serialize;

use crate::types::{EnsembleId, ServiceId, SubchannelId};

/// Audio service component type carried by DAB+ sub-channels (ASCTy 63).
pub const ASCTY_DAB_PLUS: u8 = 63;

/// Audio service component type of classic DAB (MPEG Layer II).
pub const ASCTY_DAB: u8 = 0;

/// How a service component is transported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportMode {
    StreamAudio,
    StreamData,
    PacketData,
}

/// Audio coding of a stream audio component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioServiceType {
    /// MPEG-1/2 Layer II
    Dab,
    /// HE-AACv2 in superframes
    DabPlus,
    Other(u8),
}

impl AudioServiceType {
    pub fn from_ascty(ascty: u8) -> Self {
        match ascty {
            ASCTY_DAB => AudioServiceType::Dab,
            ASCTY_DAB_PLUS => AudioServiceType::DabPlus,
            other => AudioServiceType::Other(other),
        }
    }
}

/// EEP protection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EepProfile {
    /// Bitrates in multiples of 8 kbit/s
    A,
    /// Bitrates in multiples of 32 kbit/s
    B,
}

/// Error protection of a sub-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protection {
    /// Unequal error protection, row of the UEP table
    Uep { table_index: u8 },
    /// Equal error protection at level 1 (strongest) to 4
    Eep { profile: EepProfile, level: u8 },
}

impl Protection {
    pub fn is_eep(&self) -> bool {
        matches!(self, Protection::Eep { .. })
    }
}

/// Ensemble level information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ensemble {
    pub id: Option<EnsembleId>,
    pub label: Option<String>,
}

/// A programme or data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub id: ServiceId,
    pub label: Option<String>,
    /// Conditional access system id, 0 when unscrambled
    pub ca_id: u8,
}

/// Link between a service and the data that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceComponent {
    pub service_id: ServiceId,
    pub transport_mode: TransportMode,
    /// Set for stream audio components.
    pub audio_service_type: Option<AudioServiceType>,
    /// DSCTy of data components.
    pub data_service_type: Option<u8>,
    /// Carrying sub-channel of stream components.
    pub subchannel_id: Option<SubchannelId>,
    /// Service component id of packet components.
    pub scid: Option<u16>,
    pub is_primary: bool,
}

/// A sub-channel of the MSC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subchannel {
    pub id: SubchannelId,
    /// First capacity unit within the CIF.
    pub start_address: u16,
    /// Length in capacity units.
    pub length: u16,
    pub protection: Protection,
    /// Bitrate in kbit/s.
    pub bitrate: u32,
}

impl Subchannel {
    /// One past the last capacity unit.
    pub fn end_address(&self) -> u16 {
        self.start_address + self.length
    }
}

/// Frame-boundary information that is not part of the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MiscInfo {
    /// CIF counter modulo 5000, as announced by FIG 0/0.
    pub cif_counter: Option<u16>,
    /// Change flags of the upcoming reconfiguration (0 = none).
    pub change_flags: u8,
    pub alarm: bool,
}

/// Known configuration of the ensemble.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Database {
    pub ensemble: Ensemble,
    pub services: Vec<Service>,
    pub service_components: Vec<ServiceComponent>,
    pub subchannels: Vec<Subchannel>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_subchannel(&self, id: SubchannelId) -> Option<&Subchannel> {
        self.subchannels.iter().find(|s| s.id == id)
    }

    pub fn get_service(&self, id: ServiceId) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    /// The stream component carried by sub-channel `id`, if any.
    pub fn get_service_component_by_subchannel(
        &self,
        id: SubchannelId,
    ) -> Option<&ServiceComponent> {
        self.service_components
            .iter()
            .find(|c| c.subchannel_id == Some(id))
    }

    /// All components of a service.
    pub fn service_components_of(&self, service: ServiceId) -> impl Iterator<Item = &ServiceComponent> {
        self.service_components
            .iter()
            .filter(move |c| c.service_id == service)
    }

    pub fn is_empty(&self) -> bool {
        self.ensemble == Ensemble::default()
            && self.services.is_empty()
            && self.service_components.is_empty()
            && self.subchannels.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Database {
        Database {
            ensemble: Ensemble {
                id: Some(0xCE15),
                label: Some("Test Mux".into()),
            },
            services: vec![Service {
                id: 0xC221,
                label: None,
                ca_id: 0,
            }],
            service_components: vec![ServiceComponent {
                service_id: 0xC221,
                transport_mode: TransportMode::StreamAudio,
                audio_service_type: Some(AudioServiceType::DabPlus),
                data_service_type: None,
                subchannel_id: Some(4),
                scid: None,
                is_primary: true,
            }],
            subchannels: vec![Subchannel {
                id: 4,
                start_address: 72,
                length: 72,
                protection: Protection::Eep {
                    profile: EepProfile::A,
                    level: 3,
                },
                bitrate: 96,
            }],
        }
    }

    #[test]
    fn test_lookups() {
        let db = sample();
        assert_eq!(db.get_subchannel(4).map(|s| s.end_address()), Some(144));
        assert!(db.get_subchannel(5).is_none());
        assert_eq!(db.get_service_component_by_subchannel(4).unwrap().service_id, 0xC221);
        assert_eq!(db.service_components_of(0xC221).count(), 1);
        assert!(db.get_service(0xC221).is_some());
    }

    #[test]
    fn test_clear() {
        let mut db = sample();
        assert!(!db.is_empty());
        db.clear();
        assert!(db.is_empty());
    }

    #[test]
    fn test_ascty_mapping() {
        assert_eq!(AudioServiceType::from_ascty(63), AudioServiceType::DabPlus);
        assert_eq!(AudioServiceType::from_ascty(0), AudioServiceType::Dab);
        assert_eq!(AudioServiceType::from_ascty(5), AudioServiceType::Other(5));
    }
}

//! Staging area for database changes.
//!
//! FIG handlers feed fragments into the updater as they are parsed. Each
//! fragment is validated on entry; invalid ones are rejected and never reach
//! the database. A service label may arrive before the service itself is
//! declared, so such records stay pending until they are complete.
//! [`DatabaseUpdater::commit`] applies every complete record in one go.

use std::collections::BTreeMap;

use super::{Database, EepProfile, Protection, Service, ServiceComponent, Subchannel};
use crate::msc::protection::{bitrate, uep_entry};
use crate::params::CIF_CAPACITY_UNITS;
use crate::types::{EnsembleId, ServiceId, SubchannelId};

/// Rejected database fragment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("subchannel {id} spans capacity units {start}..{end}, beyond the CIF")]
    SubchannelOutOfBounds { id: SubchannelId, start: u16, end: u32 },

    #[error("subchannel {id} has size {size} CU, invalid for EEP-{level}{profile:?}")]
    InvalidEepSize {
        id: SubchannelId,
        size: u16,
        profile: EepProfile,
        level: u8,
    },

    #[error("subchannel {id} references UEP table index {index}, out of range")]
    InvalidUepIndex { id: SubchannelId, index: u8 },

    #[error("service component of {service:#x} has no sub-channel or SCId")]
    DanglingComponent { service: ServiceId },
}

#[derive(Debug, Clone, Default)]
struct PendingEnsemble {
    id: Option<EnsembleId>,
    label: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct PendingService {
    /// Set once FIG 0/2 announced the service.
    ca_id: Option<u8>,
    label: Option<String>,
}

/// Key of a component within its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ComponentKey {
    Stream(SubchannelId),
    Packet(u16),
}

impl ComponentKey {
    fn of(component: &ServiceComponent) -> Option<Self> {
        match (component.subchannel_id, component.scid) {
            (Some(id), _) => Some(ComponentKey::Stream(id)),
            (None, Some(scid)) => Some(ComponentKey::Packet(scid)),
            (None, None) => None,
        }
    }
}

/// Accumulated, validated, not yet applied database changes.
#[derive(Debug, Clone, Default)]
pub struct DatabaseUpdater {
    ensemble: PendingEnsemble,
    subchannels: BTreeMap<SubchannelId, Subchannel>,
    services: BTreeMap<ServiceId, PendingService>,
    components: BTreeMap<(ServiceId, ComponentKey), ServiceComponent>,
}

impl DatabaseUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ensemble_id(&mut self, id: EnsembleId) {
        self.ensemble.id = Some(id);
    }

    pub fn set_ensemble_label(&mut self, label: String) {
        self.ensemble.label = Some(label);
    }

    /// Sub-channel in short form: size and bitrate come from the UEP table.
    pub fn set_subchannel_uep(
        &mut self,
        id: SubchannelId,
        start_address: u16,
        table_index: u8,
    ) -> Result<(), UpdateError> {
        let entry = uep_entry(table_index).ok_or(UpdateError::InvalidUepIndex {
            id,
            index: table_index,
        })?;
        self.insert_subchannel(Subchannel {
            id,
            start_address,
            length: entry.size,
            protection: Protection::Uep { table_index },
            bitrate: entry.bitrate as u32,
        })
    }

    /// Sub-channel in long form: EEP profile, level and explicit size.
    pub fn set_subchannel_eep(
        &mut self,
        id: SubchannelId,
        start_address: u16,
        profile: EepProfile,
        level: u8,
        size: u16,
    ) -> Result<(), UpdateError> {
        let protection = Protection::Eep { profile, level };
        let kbps = bitrate(protection, size).ok_or(UpdateError::InvalidEepSize {
            id,
            size,
            profile,
            level,
        })?;
        self.insert_subchannel(Subchannel {
            id,
            start_address,
            length: size,
            protection,
            bitrate: kbps,
        })
    }

    fn insert_subchannel(&mut self, subchannel: Subchannel) -> Result<(), UpdateError> {
        let end = subchannel.start_address as u32 + subchannel.length as u32;
        if end > CIF_CAPACITY_UNITS as u32 {
            return Err(UpdateError::SubchannelOutOfBounds {
                id: subchannel.id,
                start: subchannel.start_address,
                end,
            });
        }
        self.subchannels.insert(subchannel.id, subchannel);
        Ok(())
    }

    /// Service announced by FIG 0/2.
    pub fn declare_service(&mut self, id: ServiceId, ca_id: u8) {
        self.services.entry(id).or_default().ca_id = Some(ca_id);
    }

    pub fn set_service_label(&mut self, id: ServiceId, label: String) {
        self.services.entry(id).or_default().label = Some(label);
    }

    pub fn add_service_component(&mut self, component: ServiceComponent) -> Result<(), UpdateError> {
        let key = ComponentKey::of(&component).ok_or(UpdateError::DanglingComponent {
            service: component.service_id,
        })?;
        self.components.insert((component.service_id, key), component);
        Ok(())
    }

    /// Number of records waiting to be committed.
    pub fn pending(&self) -> usize {
        self.ensemble.id.is_some() as usize
            + self.ensemble.label.is_some() as usize
            + self.subchannels.len()
            + self.services.len()
            + self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Drop everything pending.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Apply every complete record to `db`.
    ///
    /// Returns the number of records that were added or changed. Committed
    /// records leave the updater; a label of a service the database does not
    /// know yet stays pending.
    pub fn commit(&mut self, db: &mut Database) -> usize {
        let mut changes = 0;

        if let Some(id) = self.ensemble.id.take() {
            changes += replace(&mut db.ensemble.id, Some(id)) as usize;
        }
        if let Some(label) = self.ensemble.label.take() {
            changes += replace(&mut db.ensemble.label, Some(label)) as usize;
        }

        for (_, subchannel) in std::mem::take(&mut self.subchannels) {
            let id = subchannel.id;
            changes += upsert(&mut db.subchannels, subchannel, |s| s.id == id) as usize;
        }

        for (id, pending) in std::mem::take(&mut self.services) {
            let known = db.get_service(id).cloned();
            let service = match (known, pending.ca_id) {
                (Some(known), ca_id) => Service {
                    id,
                    label: pending.label.or(known.label),
                    ca_id: ca_id.unwrap_or(known.ca_id),
                },
                (None, Some(ca_id)) => Service {
                    id,
                    label: pending.label,
                    ca_id,
                },
                (None, None) => {
                    self.services.insert(id, pending);
                    continue;
                }
            };
            changes += upsert(&mut db.services, service, |s| s.id == id) as usize;
        }

        for ((service, key), component) in std::mem::take(&mut self.components) {
            changes += upsert(&mut db.service_components, component, |c| {
                c.service_id == service && ComponentKey::of(c) == Some(key)
            }) as usize;
        }

        changes
    }
}

/// Overwrite `slot`, reporting whether the value changed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Insert or replace the element matching `same`, reporting whether the
/// list changed.
fn upsert<T: PartialEq>(list: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) -> bool {
    match list.iter_mut().find(|existing| same(existing)) {
        Some(existing) => replace(existing, item),
        None => {
            list.push(item);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{AudioServiceType, TransportMode};

    fn audio_component(service: ServiceId, subchannel: SubchannelId) -> ServiceComponent {
        ServiceComponent {
            service_id: service,
            transport_mode: TransportMode::StreamAudio,
            audio_service_type: Some(AudioServiceType::DabPlus),
            data_service_type: None,
            subchannel_id: Some(subchannel),
            scid: None,
            is_primary: true,
        }
    }

    #[test]
    fn test_commit_applies_and_empties() {
        let mut updater = DatabaseUpdater::new();
        updater.set_ensemble_id(0xCE15);
        updater.set_subchannel_eep(1, 0, EepProfile::A, 3, 72).unwrap();
        updater.declare_service(0xC221, 0);
        updater.add_service_component(audio_component(0xC221, 1)).unwrap();

        let mut db = Database::new();
        assert_eq!(updater.commit(&mut db), 4);
        assert!(updater.is_empty());
        assert_eq!(db.get_subchannel(1).unwrap().bitrate, 96);
        assert_eq!(db.ensemble.id, Some(0xCE15));
    }

    #[test]
    fn test_repeated_fragments_are_not_changes() {
        let mut db = Database::new();
        for expected in [2, 0] {
            let mut updater = DatabaseUpdater::new();
            updater.set_subchannel_uep(2, 100, 16).unwrap();
            updater.declare_service(0xC222, 0);
            assert_eq!(updater.commit(&mut db), expected);
        }

        // A reconfiguration moves the sub-channel
        let mut updater = DatabaseUpdater::new();
        updater.set_subchannel_uep(2, 200, 16).unwrap();
        assert_eq!(updater.commit(&mut db), 1);
        assert_eq!(db.get_subchannel(2).unwrap().start_address, 200);
        assert_eq!(db.subchannels.len(), 1);
    }

    #[test]
    fn test_label_waits_for_service() {
        let mut db = Database::new();
        let mut updater = DatabaseUpdater::new();
        updater.set_service_label(0xC223, "Radio".into());
        assert_eq!(updater.commit(&mut db), 0);
        assert_eq!(updater.pending(), 1);

        updater.declare_service(0xC223, 0);
        assert_eq!(updater.commit(&mut db), 1);
        assert_eq!(db.get_service(0xC223).unwrap().label.as_deref(), Some("Radio"));

        // Label of a known service applies on its own and keeps the CA id
        updater.set_service_label(0xC223, "Radio 2".into());
        assert_eq!(updater.commit(&mut db), 1);
        assert_eq!(db.get_service(0xC223).unwrap().label.as_deref(), Some("Radio 2"));
    }

    #[test]
    fn test_invalid_fragments_are_rejected() {
        let mut updater = DatabaseUpdater::new();
        assert!(matches!(
            updater.set_subchannel_eep(1, 0, EepProfile::A, 3, 70),
            Err(UpdateError::InvalidEepSize { .. })
        ));
        assert!(matches!(
            updater.set_subchannel_eep(1, 850, EepProfile::A, 3, 72),
            Err(UpdateError::SubchannelOutOfBounds { end: 922, .. })
        ));
        assert!(matches!(
            updater.set_subchannel_uep(1, 0, 64),
            Err(UpdateError::InvalidUepIndex { index: 64, .. })
        ));

        let mut dangling = audio_component(0xC221, 1);
        dangling.subchannel_id = None;
        assert!(updater.add_service_component(dangling).is_err());
        assert!(updater.is_empty());
    }
}

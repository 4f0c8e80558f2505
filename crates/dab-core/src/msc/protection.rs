//! Sub-channel protection profiles (EN 300 401, clause 11.3)
//!
//! Equal error protection (EEP) applies two puncturing vectors to the whole
//! logical frame. Profile A covers bitrates that are multiples of 8 kbit/s,
//! profile B multiples of 32 kbit/s. Unequal error protection (UEP) is only
//! described by its size table here; UEP sub-channels carry classic DAB audio
//! and are never decoded by this crate.

use crate::database::{EepProfile, Protection};
use crate::fec::puncture::{PunctureRun, PunctureSchedule};

/// One row of the UEP sub-channel size table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UepEntry {
    /// Sub-channel size in capacity units.
    pub size: u16,
    /// Protection level, 1 (strongest) to 5.
    pub level: u8,
    /// Bitrate in kbit/s.
    pub bitrate: u16,
}

const fn uep(size: u16, level: u8, bitrate: u16) -> UepEntry {
    UepEntry {
        size,
        level,
        bitrate,
    }
}

/// UEP table, indexed by the 6-bit table index of FIG 0/1 short form.
pub const UEP_TABLE: [UepEntry; 64] = [
    uep(16, 5, 32), uep(21, 4, 32), uep(24, 3, 32), uep(29, 2, 32), uep(35, 1, 32),
    uep(24, 5, 48), uep(29, 4, 48), uep(35, 3, 48), uep(42, 2, 48), uep(52, 1, 48),
    uep(29, 5, 56), uep(35, 4, 56), uep(42, 3, 56), uep(52, 2, 56),
    uep(32, 5, 64), uep(42, 4, 64), uep(48, 3, 64), uep(58, 2, 64), uep(70, 1, 64),
    uep(40, 5, 80), uep(52, 4, 80), uep(58, 3, 80), uep(70, 2, 80), uep(84, 1, 80),
    uep(48, 5, 96), uep(58, 4, 96), uep(70, 3, 96), uep(84, 2, 96), uep(104, 1, 96),
    uep(58, 5, 112), uep(70, 4, 112), uep(84, 3, 112), uep(104, 2, 112),
    uep(64, 5, 128), uep(84, 4, 128), uep(96, 3, 128), uep(116, 2, 128), uep(140, 1, 128),
    uep(80, 5, 160), uep(104, 4, 160), uep(116, 3, 160), uep(140, 2, 160), uep(168, 1, 160),
    uep(96, 5, 192), uep(116, 4, 192), uep(140, 3, 192), uep(168, 2, 192), uep(208, 1, 192),
    uep(116, 5, 224), uep(140, 4, 224), uep(168, 3, 224), uep(208, 2, 224), uep(232, 1, 224),
    uep(128, 5, 256), uep(168, 4, 256), uep(192, 3, 256), uep(232, 2, 256), uep(280, 1, 256),
    uep(160, 5, 320), uep(208, 4, 320), uep(280, 2, 320),
    uep(192, 5, 384), uep(280, 3, 384), uep(416, 1, 384),
];

/// Look up a UEP table row.
pub fn uep_entry(index: u8) -> Option<&'static UepEntry> {
    UEP_TABLE.get(index as usize)
}

impl EepProfile {
    /// Capacity units per bitrate unit at `level` (1..=4).
    fn size_multiplier(self, level: u8) -> Option<u16> {
        let table: [u16; 4] = match self {
            EepProfile::A => [12, 8, 6, 4],
            EepProfile::B => [27, 21, 18, 15],
        };
        table.get((level as usize).checked_sub(1)?).copied()
    }

    /// Bitrate granularity in kbit/s.
    fn bitrate_unit(self) -> u32 {
        match self {
            EepProfile::A => 8,
            EepProfile::B => 32,
        }
    }
}

/// Number of bitrate units `n` of an EEP sub-channel of `size` CU, if the
/// size is valid for the profile and level.
fn eep_units(profile: EepProfile, level: u8, size: u16) -> Option<usize> {
    let multiplier = profile.size_multiplier(level)?;
    if size == 0 || size % multiplier != 0 {
        return None;
    }
    Some((size / multiplier) as usize)
}

/// Sub-channel size in CU for a protection and bitrate, `None` when the
/// combination does not exist.
pub fn subchannel_size(protection: Protection, bitrate: u32) -> Option<u16> {
    match protection {
        Protection::Uep { table_index } => {
            uep_entry(table_index).filter(|e| e.bitrate as u32 == bitrate).map(|e| e.size)
        }
        Protection::Eep { profile, level } => {
            let unit = profile.bitrate_unit();
            if bitrate == 0 || bitrate % unit != 0 {
                return None;
            }
            let n = u16::try_from(bitrate / unit).ok()?;
            profile.size_multiplier(level)?.checked_mul(n)
        }
    }
}

/// Bitrate in kbit/s carried by a sub-channel of `size` CU.
pub fn bitrate(protection: Protection, size: u16) -> Option<u32> {
    match protection {
        Protection::Uep { table_index } => {
            uep_entry(table_index).filter(|e| e.size == size).map(|e| e.bitrate as u32)
        }
        Protection::Eep { profile, level } => {
            let n = eep_units(profile, level, size)?;
            Some(n as u32 * profile.bitrate_unit())
        }
    }
}

/// Puncturing schedule of one logical frame of an EEP sub-channel.
pub fn eep_schedule(profile: EepProfile, level: u8, size: u16) -> Option<PunctureSchedule> {
    let n = eep_units(profile, level, size)?;
    let runs = match (profile, level) {
        (EepProfile::A, 1) => [PunctureRun::new(6 * n - 3, 24), PunctureRun::new(3, 23)],
        (EepProfile::A, 2) if n == 1 => [PunctureRun::new(5, 13), PunctureRun::new(1, 12)],
        (EepProfile::A, 2) => [PunctureRun::new(2 * n - 3, 14), PunctureRun::new(4 * n + 3, 13)],
        (EepProfile::A, 3) => [PunctureRun::new(6 * n - 3, 8), PunctureRun::new(3, 7)],
        (EepProfile::A, 4) => [PunctureRun::new(4 * n - 3, 3), PunctureRun::new(2 * n + 3, 2)],
        (EepProfile::B, 1) => [PunctureRun::new(24 * n - 3, 10), PunctureRun::new(3, 9)],
        (EepProfile::B, 2) => [PunctureRun::new(24 * n - 3, 6), PunctureRun::new(3, 5)],
        (EepProfile::B, 3) => [PunctureRun::new(24 * n - 3, 4), PunctureRun::new(3, 3)],
        (EepProfile::B, 4) => [PunctureRun::new(24 * n - 3, 2), PunctureRun::new(3, 1)],
        _ => return None,
    };
    Some(PunctureSchedule::new(runs.to_vec()))
}

// SPDX-License-Identifier: GPL-3.0-only

use enumflags2::{BitFlags, bitflags};

use crate::dev::DevId;

/// Upper bound on slot numbers the kernel will report.
pub const MAX_DISKS: i32 = 4096;

/// Per-disk state bits as the kernel interface defines them.
///
/// The discriminants are the wire values; they must not be renumbered.
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFlag {
    Faulty = 1 << 0,
    Active = 1 << 1,
    Sync = 1 << 2,
    Removed = 1 << 3,
    WriteMostly = 1 << 9,
}

pub type DiskState = BitFlags<DiskFlag>;

/// Build a [`DiskState`] from the raw kernel word, dropping unknown bits.
pub fn disk_state_from_raw(raw: u32) -> DiskState {
    BitFlags::from_bits_truncate(raw as u16)
}

/// One member slot as the kernel reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSlot {
    /// Slot number used with the per-slot query/add calls.
    pub number: i32,
    pub dev: DevId,
    /// Position in the array, -1 for an unassigned spare.
    pub raid_disk: i32,
    pub state: DiskState,
}

impl DiskSlot {
    pub fn empty(number: i32) -> Self {
        DiskSlot {
            number,
            dev: DevId::EMPTY,
            raid_disk: -1,
            state: DiskState::empty(),
        }
    }

    /// An all-zero major:minor means the slot is unused.
    pub fn is_empty(&self) -> bool {
        self.dev.is_empty()
    }

    pub fn is_faulty(&self) -> bool {
        self.state.contains(DiskFlag::Faulty)
    }

    pub fn in_sync(&self) -> bool {
        self.state.contains(DiskFlag::Sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_state_keeps_kernel_bit_positions() {
        let state = disk_state_from_raw(0b0110);
        assert_eq!(state, DiskFlag::Active | DiskFlag::Sync);
        assert_eq!(state.bits(), 0b0110);
    }

    #[test]
    fn unknown_bits_are_dropped() {
        let state = disk_state_from_raw(1 << 15 | 1);
        assert_eq!(state, DiskState::from(DiskFlag::Faulty));
    }

    #[test]
    fn write_mostly_is_bit_nine() {
        assert_eq!(DiskState::from(DiskFlag::WriteMostly).bits(), 1 << 9);
    }

    #[test]
    fn empty_slot_is_recognised() {
        assert!(DiskSlot::empty(3).is_empty());
        let used = DiskSlot {
            number: 3,
            dev: DevId::new(8, 16),
            raid_disk: 1,
            state: DiskFlag::Active | DiskFlag::Sync,
        };
        assert!(!used.is_empty());
        assert!(used.in_sync());
        assert!(!used.is_faulty());
    }
}

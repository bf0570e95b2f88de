// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

/// RAID personality, using the kernel's numeric levels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaidLevel {
    Multipath,
    Linear,
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
    Container,
    Unknown(i32),
}

impl RaidLevel {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -4 => RaidLevel::Multipath,
            -1 => RaidLevel::Linear,
            0 => RaidLevel::Raid0,
            1 => RaidLevel::Raid1,
            4 => RaidLevel::Raid4,
            5 => RaidLevel::Raid5,
            6 => RaidLevel::Raid6,
            10 => RaidLevel::Raid10,
            -100 => RaidLevel::Container,
            other => RaidLevel::Unknown(other),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            RaidLevel::Multipath => -4,
            RaidLevel::Linear => -1,
            RaidLevel::Raid0 => 0,
            RaidLevel::Raid1 => 1,
            RaidLevel::Raid4 => 4,
            RaidLevel::Raid5 => 5,
            RaidLevel::Raid6 => 6,
            RaidLevel::Raid10 => 10,
            RaidLevel::Container => -100,
            RaidLevel::Unknown(other) => other,
        }
    }

    pub fn from_sysfs(name: &str) -> Option<Self> {
        match name.trim() {
            "multipath" => Some(RaidLevel::Multipath),
            "linear" => Some(RaidLevel::Linear),
            "raid0" => Some(RaidLevel::Raid0),
            "raid1" => Some(RaidLevel::Raid1),
            "raid4" => Some(RaidLevel::Raid4),
            "raid5" => Some(RaidLevel::Raid5),
            "raid6" => Some(RaidLevel::Raid6),
            "raid10" => Some(RaidLevel::Raid10),
            "container" => Some(RaidLevel::Container),
            _ => None,
        }
    }

    /// Whether `avail_disks` in-sync members out of `raid_disks` keep the
    /// data readable. raid10 is reported as surviving; telling for real
    /// would need the layout.
    pub fn redundancy_met(self, raid_disks: i32, avail_disks: i32) -> bool {
        match self {
            RaidLevel::Raid10 => true,
            RaidLevel::Multipath | RaidLevel::Raid1 => avail_disks >= 1,
            RaidLevel::Linear | RaidLevel::Raid0 => avail_disks == raid_disks,
            RaidLevel::Raid4 | RaidLevel::Raid5 => avail_disks >= raid_disks - 1,
            RaidLevel::Raid6 => avail_disks >= raid_disks - 2,
            RaidLevel::Container | RaidLevel::Unknown(_) => false,
        }
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaidLevel::Multipath => write!(f, "multipath"),
            RaidLevel::Linear => write!(f, "linear"),
            RaidLevel::Raid0 => write!(f, "raid0"),
            RaidLevel::Raid1 => write!(f, "raid1"),
            RaidLevel::Raid4 => write!(f, "raid4"),
            RaidLevel::Raid5 => write!(f, "raid5"),
            RaidLevel::Raid6 => write!(f, "raid6"),
            RaidLevel::Raid10 => write!(f, "raid10"),
            RaidLevel::Container => write!(f, "container"),
            RaidLevel::Unknown(raw) => write!(f, "level-{raw}"),
        }
    }
}

/// Array-wide state as returned by the kernel info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub level: RaidLevel,
    pub layout: i32,
    pub raid_disks: i32,
    pub nr_disks: i32,
    pub active_disks: i32,
    pub working_disks: i32,
    pub failed_disks: i32,
    pub spare_disks: i32,
    /// Superblock format major/minor version. Major 0 with a legacy
    /// driver takes the old hot-add path.
    pub major_version: i32,
    pub minor_version: i32,
    /// Set when the array runs without persistent metadata.
    pub not_persistent: bool,
    /// Component size in KiB as the kernel reports it; 32-bit and
    /// possibly truncated, so prefer the sysfs value when available.
    pub size_kib: u32,
}

impl ArrayInfo {
    pub fn is_persistent(&self) -> bool {
        !self.not_persistent
    }
}

/// md driver version, from the kernel version query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RaidVersion {
    pub major: i32,
    pub minor: i32,
    pub patchlevel: i32,
}

impl RaidVersion {
    pub const fn new(major: i32, minor: i32, patchlevel: i32) -> Self {
        RaidVersion {
            major,
            minor,
            patchlevel,
        }
    }

    /// Everything below 0.90.0 predates the managed ioctl surface.
    pub fn supports_management(&self) -> bool {
        *self >= RaidVersion::new(0, 90, 0)
    }

    /// Old drivers ignore the requested slot number on hot-add.
    pub fn legacy_slot_allocation(&self) -> bool {
        self.patchlevel < 2
    }
}

impl fmt::Display for RaidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patchlevel)
    }
}

/// Running kernel release encoded as `major * 1_000_000 + minor * 1_000
/// + patch`, matching the comparisons done against known regression
/// windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelVersion(pub i32);

impl KernelVersion {
    pub const fn new(major: i32, minor: i32, patch: i32) -> Self {
        KernelVersion(major * 1_000_000 + minor * 1_000 + patch)
    }

    /// Version-1 superblock re-add was broken up to and including 2.6.18.
    pub fn supports_v1_re_add(&self) -> bool {
        *self > KernelVersion::new(2, 6, 18)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_raw_roundtrip() {
        for raw in [-100, -4, -1, 0, 1, 4, 5, 6, 10, 99] {
            assert_eq!(RaidLevel::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn redundancy_rule_per_level() {
        assert!(RaidLevel::Raid1.redundancy_met(2, 1));
        assert!(!RaidLevel::Raid1.redundancy_met(2, 0));
        assert!(RaidLevel::Raid5.redundancy_met(4, 3));
        assert!(!RaidLevel::Raid5.redundancy_met(4, 2));
        assert!(RaidLevel::Raid6.redundancy_met(4, 2));
        assert!(!RaidLevel::Raid0.redundancy_met(4, 3));
        assert!(RaidLevel::Raid10.redundancy_met(4, 1));
    }

    #[test]
    fn driver_version_gates() {
        assert!(RaidVersion::new(0, 90, 0).supports_management());
        assert!(!RaidVersion::new(0, 36, 6).supports_management());
        assert!(RaidVersion::new(0, 90, 0).legacy_slot_allocation());
        assert!(!RaidVersion::new(0, 90, 3).legacy_slot_allocation());
    }

    #[test]
    fn re_add_regression_window() {
        assert!(!KernelVersion::new(2, 6, 18).supports_v1_re_add());
        assert!(KernelVersion::new(2, 6, 19).supports_v1_re_add());
        assert!(KernelVersion::new(6, 1, 0).supports_v1_re_add());
    }
}

// SPDX-License-Identifier: GPL-3.0-only

use crate::dev::DevId;

/// What the caller wants done with one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Add as a new member or spare.
    Add,
    /// Restore to a previous slot; failing that is an error.
    ReAdd,
    /// Re-add expanded from a device pool; individual failures are
    /// silently skipped instead of aborting the batch.
    MissingReAdd,
    Remove,
    Fault,
}

impl Disposition {
    pub fn is_add(self) -> bool {
        matches!(
            self,
            Disposition::Add | Disposition::ReAdd | Disposition::MissingReAdd
        )
    }
}

/// Write-mostly intent carried alongside an add or re-add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMostly {
    #[default]
    Unset,
    Set,
    Clear,
}

/// A device reference before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Every member currently marked faulty.
    Faulty,
    /// Every member whose node is gone from the kernel.
    Detached,
    /// Re-add candidates taken from a caller-supplied pool.
    Missing,
    /// A literal major:minor pair.
    DevNum(DevId),
    /// A kernel-internal name such as `sdb1`, resolved through sysfs.
    KernelName(String),
    /// A filesystem path or link.
    Path(String),
}

impl DeviceTarget {
    /// Classify a raw device argument the way the command surface
    /// hands them over: symbolic words first, then `major:minor`,
    /// then short bare names, everything else a path.
    pub fn parse(name: &str) -> Self {
        match name {
            "faulty" | "failed" => return DeviceTarget::Faulty,
            "detached" => return DeviceTarget::Detached,
            "missing" => return DeviceTarget::Missing,
            _ => {}
        }

        if let Ok(dev) = name.parse::<DevId>() {
            return DeviceTarget::DevNum(dev);
        }

        if !name.contains('/') && !name.contains(':') && name.len() < 50 {
            return DeviceTarget::KernelName(name.to_string());
        }

        DeviceTarget::Path(name.to_string())
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(
            self,
            DeviceTarget::Faulty | DeviceTarget::Detached | DeviceTarget::Missing
        )
    }
}

/// One entry of the ordered batch handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Display name for diagnostics, as the caller wrote it.
    pub name: String,
    pub target: DeviceTarget,
    pub disposition: Disposition,
    pub write_mostly: WriteMostly,
}

impl DeviceSpec {
    pub fn new(name: &str, disposition: Disposition) -> Self {
        DeviceSpec {
            name: name.to_string(),
            target: DeviceTarget::parse(name),
            disposition,
            write_mostly: WriteMostly::Unset,
        }
    }

    pub fn for_dev(dev: DevId, disposition: Disposition) -> Self {
        DeviceSpec {
            name: dev.to_string(),
            target: DeviceTarget::DevNum(dev),
            disposition,
            write_mostly: WriteMostly::Unset,
        }
    }
}

/// Superblock update applied to a candidate before re-add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaUpdate {
    WriteMostly,
    ReadWrite,
    Named(String),
}

/// Attribute update applied to a subarray through its container
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubarrayUpdate {
    Name(String),
    Other(String),
}

impl SubarrayUpdate {
    pub fn kind(&self) -> &str {
        match self {
            SubarrayUpdate::Name(_) => "name",
            SubarrayUpdate::Other(kind) => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_symbolic_names() {
        assert_eq!(DeviceTarget::parse("faulty"), DeviceTarget::Faulty);
        assert_eq!(DeviceTarget::parse("failed"), DeviceTarget::Faulty);
        assert_eq!(DeviceTarget::parse("detached"), DeviceTarget::Detached);
        assert_eq!(DeviceTarget::parse("missing"), DeviceTarget::Missing);
    }

    #[test]
    fn classifies_concrete_names() {
        assert_eq!(
            DeviceTarget::parse("8:16"),
            DeviceTarget::DevNum(DevId::new(8, 16))
        );
        assert_eq!(
            DeviceTarget::parse("sdb1"),
            DeviceTarget::KernelName("sdb1".to_string())
        );
        assert_eq!(
            DeviceTarget::parse("/dev/sdb1"),
            DeviceTarget::Path("/dev/sdb1".to_string())
        );
    }

    #[test]
    fn long_bare_names_are_paths() {
        let name = "x".repeat(50);
        assert_eq!(DeviceTarget::parse(&name), DeviceTarget::Path(name));
    }
}

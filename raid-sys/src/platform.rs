// SPDX-License-Identifier: GPL-3.0-only

//! Ambient host state: kernel release, udev presence.

use std::fs;
use std::path::Path;

use raid_types::KernelVersion;

/// Parse a kernel release string such as `6.1.0-13-amd64`.
pub fn parse_kernel_release(release: &str) -> Option<KernelVersion> {
    let mut parts = release.split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(KernelVersion::new(major, minor, patch))
}

/// Running kernel version; 0 when the release is unreadable, which
/// fails every minimum-version gate closed.
pub fn kernel_version() -> KernelVersion {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .and_then(|release| parse_kernel_release(release.trim()))
        .unwrap_or(KernelVersion(0))
}

/// Whether udev manages device nodes on this host. Node cleanup is
/// skipped while it does, unless the override variable is set.
pub fn udev_active() -> bool {
    if std::env::var_os("RAID_NO_UDEV").is_some() {
        return false;
    }
    Path::new("/run/udev/control").exists() || Path::new("/dev/.udev").exists()
}

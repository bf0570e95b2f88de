// SPDX-License-Identifier: GPL-3.0-only

//! Per-array sysfs attribute tree (`/sys/block/<md>/md`).

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use raid_types::{DevId, RaidLevel};
use tracing::debug;

use crate::error::{Result, SysError};

/// Open handle onto one member's `state` attribute, kept for repeated
/// writes after the member's device number is no longer resolvable.
pub struct StateHandle {
    attr: String,
    inner: Box<dyn Write + Send>,
}

impl StateHandle {
    pub fn new(attr: impl Into<String>, inner: Box<dyn Write + Send>) -> Self {
        StateHandle {
            attr: attr.into(),
            inner,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// One short write; sysfs state writes are all-or-nothing.
    pub fn write_state(&mut self, value: &str) -> io::Result<()> {
        self.inner.write_all(value.as_bytes())?;
        self.inner.flush()
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle").field("attr", &self.attr).finish()
    }
}

/// Member handed to the kernel through the sysfs add mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMember {
    pub dev: DevId,
    pub recovery_start: u64,
}

/// Outcome of the holder-uniqueness check on a container member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderCheck {
    /// Only the container holds the device.
    Unique,
    /// A member array still claims it.
    OtherHolder,
    NotMember,
}

/// Sysfs attribute-tree capability for one array.
pub trait SysfsApi {
    /// Kernel name of the array, e.g. `md127`.
    fn sys_name(&self) -> &str;
    fn write_array_state(&self, state: &str) -> Result<()>;
    fn metadata_version(&self) -> Result<Option<String>>;
    fn write_metadata_version(&self, version: &str) -> Result<()>;
    fn level(&self) -> Result<Option<RaidLevel>>;
    /// Per-member usable size in sectors, 0 when not exposed.
    fn component_size(&self) -> Result<u64>;
    /// Freeze background activity; returns whether a thaw is owed.
    fn freeze(&self) -> bool;
    fn thaw(&self);
    fn uevent_change(&self);
    fn member_names(&self) -> Result<Vec<String>>;
    fn member_devnum(&self, kernel_name: &str) -> Result<Option<DevId>>;
    /// Find the member entry backed by this device number.
    fn member_by_dev(&self, dev: DevId) -> Result<Option<String>>;
    fn write_member_state(&self, kernel_name: &str, value: &str) -> Result<()>;
    fn open_member_state(&self, kernel_name: &str) -> Result<StateHandle>;
    fn unique_holder(&self, member: DevId) -> Result<HolderCheck>;
    /// Hand a device to the kernel for an externally-managed array.
    fn add_disk(&self, member: &NewMember) -> Result<()>;
}

/// Resolve a device number to the kernel's array name.
pub fn md_name(dev: DevId) -> Option<String> {
    if dev.major == 9 {
        return Some(format!("md{}", dev.minor));
    }
    let link = fs::read_link(format!("/sys/dev/block/{dev}")).ok()?;
    link.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Metadata version strings of externally-managed arrays carry an
/// `external:` prefix; subarrays follow it with `/<container>/<index>`
/// (or `-<container>/<index>` while held read-only).
pub fn external_part(version: &str) -> Option<&str> {
    version.strip_prefix("external:")
}

pub fn is_subarray(version: &str) -> bool {
    external_part(version).is_some_and(|rest| rest.starts_with('/') || rest.starts_with('-'))
}

/// Split a subarray metadata version into (container, index).
pub fn subarray_parent(version: &str) -> Option<(&str, &str)> {
    let rest = external_part(version)?;
    let rest = rest.strip_prefix(['/', '-'])?;
    rest.split_once('/')
}

/// Production [`SysfsApi`] rooted at `/sys/block/<name>/md`.
pub struct MdSysfs {
    name: String,
    base: PathBuf,
}

impl MdSysfs {
    pub fn for_array(dev: DevId) -> Result<Self> {
        let name = md_name(dev)
            .ok_or_else(|| SysError::DeviceNotFound(format!("no sysfs entry for {dev}")))?;
        Ok(Self::with_name(&name))
    }

    pub fn with_name(name: &str) -> Self {
        MdSysfs {
            name: name.to_string(),
            base: PathBuf::from(format!("/sys/block/{name}/md")),
        }
    }

    fn attr_path(&self, attr: &str) -> PathBuf {
        self.base.join(attr)
    }

    fn read_attr(&self, attr: &str) -> Result<String> {
        Ok(fs::read_to_string(self.attr_path(attr))?.trim().to_string())
    }

    fn write_attr(&self, attr: &str, value: &str) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(self.attr_path(attr))?;
        file.write_all(value.as_bytes())?;
        Ok(())
    }
}

impl SysfsApi for MdSysfs {
    fn sys_name(&self) -> &str {
        &self.name
    }

    fn write_array_state(&self, state: &str) -> Result<()> {
        self.write_attr("array_state", state)
    }

    fn metadata_version(&self) -> Result<Option<String>> {
        match self.read_attr("metadata_version") {
            Ok(version) => Ok(Some(version)),
            Err(err) if err.is_gone() => Ok(None),
            Err(SysError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_metadata_version(&self, version: &str) -> Result<()> {
        self.write_attr("metadata_version", version)
    }

    fn level(&self) -> Result<Option<RaidLevel>> {
        Ok(RaidLevel::from_sysfs(&self.read_attr("level")?))
    }

    fn component_size(&self) -> Result<u64> {
        // The attribute is in KiB; report sectors.
        let kib: u64 = self
            .read_attr("component_size")?
            .parse()
            .map_err(|_| SysError::OperationFailed("unparsable component_size".into()))?;
        Ok(kib * 2)
    }

    fn freeze(&self) -> bool {
        if !self.attr_path("sync_action").exists() {
            return false;
        }
        match self.write_attr("sync_action", "frozen") {
            Ok(()) => true,
            Err(err) => {
                debug!("freeze of {} not possible: {err}", self.name);
                false
            }
        }
    }

    fn thaw(&self) {
        if let Err(err) = self.write_attr("sync_action", "idle") {
            debug!("thaw of {} failed: {err}", self.name);
        }
    }

    fn uevent_change(&self) {
        let path = Path::new("/sys/block").join(&self.name).join("uevent");
        if let Err(err) = fs::write(path, "change") {
            debug!("uevent change for {} failed: {err}", self.name);
        }
    }

    fn member_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if let Ok(name) = entry.file_name().into_string() {
                if name.starts_with("dev-") {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn member_devnum(&self, kernel_name: &str) -> Result<Option<DevId>> {
        let path = self.attr_path(&format!("dev-{kernel_name}/block/dev"));
        match fs::read_to_string(path) {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn member_by_dev(&self, dev: DevId) -> Result<Option<String>> {
        for name in self.member_names()? {
            let kernel_name = name.trim_start_matches("dev-");
            if self.member_devnum(kernel_name)? == Some(dev) {
                return Ok(Some(kernel_name.to_string()));
            }
        }
        Ok(None)
    }

    fn write_member_state(&self, kernel_name: &str, value: &str) -> Result<()> {
        self.write_attr(&format!("dev-{kernel_name}/state"), value)
    }

    fn open_member_state(&self, kernel_name: &str) -> Result<StateHandle> {
        let attr = format!("dev-{kernel_name}/state");
        let file = OpenOptions::new().write(true).open(self.attr_path(&attr))?;
        Ok(StateHandle::new(attr, Box::new(file)))
    }

    fn unique_holder(&self, member: DevId) -> Result<HolderCheck> {
        let holders = PathBuf::from(format!("/sys/dev/block/{member}/holders"));
        let mut count = 0usize;
        let mut ours = false;
        for entry in fs::read_dir(holders)? {
            let entry = entry?;
            count += 1;
            if entry.file_name().to_string_lossy() == self.name.as_str() {
                ours = true;
            }
        }
        Ok(if ours && count == 1 {
            HolderCheck::Unique
        } else if count > 1 {
            HolderCheck::OtherHolder
        } else {
            HolderCheck::NotMember
        })
    }

    fn add_disk(&self, member: &NewMember) -> Result<()> {
        self.write_attr("new_dev", &member.dev.to_string())?;
        // The per-member directory appears once the kernel accepts it.
        if let Ok(Some(kernel_name)) = self.member_by_dev(member.dev) {
            let value = member.recovery_start.to_string();
            let _ = self.write_attr(&format!("dev-{kernel_name}/recovery_start"), &value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_subarray_versions() {
        assert!(is_subarray("external:/md127/0"));
        assert!(is_subarray("external:-md127/0"));
        assert!(!is_subarray("external:imsm"));
        assert!(!is_subarray("1.2"));
    }

    #[test]
    fn splits_subarray_parent() {
        assert_eq!(
            subarray_parent("external:/md127/0"),
            Some(("md127", "0"))
        );
        assert_eq!(subarray_parent("external:imsm"), None);
        assert_eq!(subarray_parent("0.90"), None);
    }

    #[test]
    fn md_major_maps_to_md_names() {
        assert_eq!(md_name(DevId::new(9, 0)).as_deref(), Some("md0"));
        assert_eq!(md_name(DevId::new(9, 127)).as_deref(), Some("md127"));
    }

    #[test]
    fn state_handle_writes_through() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut handle = StateHandle::new("dev-sdb1/state", Box::new(Sink(buffer.clone())));
        handle.write_state("remove").unwrap();
        assert_eq!(&*buffer.lock().unwrap(), b"remove");
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Block device node access: probing, stat, sizes, exclusive claims.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process;

use nix::errno::Errno;
use nix::sys::stat::{Mode, SFlag, mknod};
use raid_types::DevId;

use crate::error::{Result, SysError};
use crate::ioctl;

/// Result of probing a device node by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProbe {
    Present,
    /// The kernel no longer has a device behind this number.
    Gone,
    Error(Errno),
}

/// What `stat` reports for a device path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStat {
    pub dev: DevId,
    pub is_block: bool,
}

/// Held exclusive open on a device node; dropping it releases the claim.
pub trait ExclusiveGuard {}

/// Block device node capability consumed by the control plane.
pub trait DeviceAccess {
    /// Can the node behind this device number still be opened?
    fn probe_node(&self, dev: DevId) -> NodeProbe;
    /// Open and fstat a path.
    fn stat_path(&self, path: &str) -> Result<BlockStat>;
    /// lstat fallback for nodes that no longer open.
    fn lstat_path(&self, path: &str) -> Result<BlockStat>;
    /// Verify nobody holds the device open exclusively.
    fn claim_check(&self, path: &str) -> Result<()>;
    fn size_sectors(&self, path: &str) -> Result<u64>;
    /// Drop any stale partition table the kernel still carries.
    fn drop_partitions(&self, path: &str) -> Result<()>;
    /// Reverse-map a device number to a `/dev` path, if one exists.
    fn path_of(&self, dev: DevId) -> Option<String>;
    /// Exclusive claim on an array node by device number.
    fn open_array_excl(&self, dev: DevId) -> Result<Box<dyn ExclusiveGuard>>;
}

pub(crate) fn open_path(path: &str, flags: libc::c_int) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if flags & libc::O_ACCMODE == libc::O_RDWR {
        options.write(true);
    }
    options.custom_flags(flags & !libc::O_ACCMODE);
    Ok(options.open(path)?)
}

/// Open a device by number through a transient node, like the
/// kernel-facing tools do for devices with no `/dev` entry.
pub(crate) fn open_by_devnum(dev: DevId, flags: libc::c_int) -> Result<File> {
    let node = PathBuf::from(format!("/tmp/.raid-dev-{}-{}", process::id(), dev));
    let _ = fs::remove_file(&node);
    mknod(
        &node,
        SFlag::S_IFBLK,
        Mode::S_IRUSR | Mode::S_IWUSR,
        dev.to_raw() as libc::dev_t,
    )
    .map_err(|errno| SysError::kernel("mknod", errno))?;

    let opened = open_path(node.to_str().unwrap_or_default(), flags);
    let _ = fs::remove_file(&node);
    opened
}

struct NodeGuard {
    _file: File,
}

impl ExclusiveGuard for NodeGuard {}

/// Production [`DeviceAccess`].
pub struct DevNodes;

impl DeviceAccess for DevNodes {
    fn probe_node(&self, dev: DevId) -> NodeProbe {
        match open_by_devnum(dev, libc::O_RDONLY) {
            Ok(_) => NodeProbe::Present,
            Err(err) if err.is_gone() => NodeProbe::Gone,
            Err(err) => NodeProbe::Error(err.errno().unwrap_or(Errno::EIO)),
        }
    }

    fn stat_path(&self, path: &str) -> Result<BlockStat> {
        let file = open_path(path, libc::O_RDONLY)?;
        let meta = file.metadata()?;
        Ok(BlockStat {
            dev: DevId::from_raw(meta.rdev()),
            is_block: meta.file_type().is_block_device(),
        })
    }

    fn lstat_path(&self, path: &str) -> Result<BlockStat> {
        let meta = fs::symlink_metadata(path)?;
        Ok(BlockStat {
            dev: DevId::from_raw(meta.rdev()),
            is_block: meta.file_type().is_block_device(),
        })
    }

    fn claim_check(&self, path: &str) -> Result<()> {
        open_path(path, libc::O_RDONLY | libc::O_EXCL)?;
        Ok(())
    }

    fn size_sectors(&self, path: &str) -> Result<u64> {
        let file = open_path(path, libc::O_RDONLY)?;
        let mut bytes: u64 = 0;
        let rv = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                ioctl::BLKGETSIZE64 as libc::c_ulong,
                &mut bytes,
            )
        };
        if rv != 0 {
            return Err(SysError::last_kernel("BLKGETSIZE64"));
        }
        Ok(bytes / 512)
    }

    fn drop_partitions(&self, path: &str) -> Result<()> {
        let file = open_path(path, libc::O_RDONLY)?;
        let rv = unsafe { libc::ioctl(file.as_raw_fd(), ioctl::BLKRRPART as libc::c_ulong, 0) };
        if rv != 0 {
            return Err(SysError::last_kernel("BLKRRPART"));
        }
        Ok(())
    }

    fn path_of(&self, dev: DevId) -> Option<String> {
        let raw = dev.to_raw();
        let mut names: Vec<_> = fs::read_dir("/dev")
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        for name in names {
            let path = format!("/dev/{name}");
            if let Ok(meta) = fs::metadata(&path) {
                if meta.file_type().is_block_device() && meta.rdev() == raw {
                    return Some(path);
                }
            }
        }
        None
    }

    fn open_array_excl(&self, dev: DevId) -> Result<Box<dyn ExclusiveGuard>> {
        let file = open_by_devnum(dev, libc::O_RDONLY | libc::O_EXCL)?;
        Ok(Box::new(NodeGuard { _file: file }))
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! The kernel control surface of one open array device.

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;

use raid_types::{ArrayInfo, DevId, DiskSlot, RaidLevel, RaidVersion, disk_state_from_raw};

use crate::devnode;
use crate::error::{Result, SysError};
use crate::ioctl;

/// Control calls against one open array handle.
///
/// The handle never outlives the caller that opened it; reopening
/// (e.g. to get exclusive access) goes through [`ArrayOpener`].
pub trait ArrayKernel {
    fn dev_num(&self) -> DevId;
    fn driver_version(&self) -> Result<RaidVersion>;
    fn array_info(&self) -> Result<ArrayInfo>;
    fn disk_info(&self, number: i32) -> Result<DiskSlot>;
    fn run(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Pre-0.90 driver stop request.
    fn legacy_stop(&self) -> Result<()>;
    fn set_readonly(&self) -> Result<()>;
    fn set_readwrite(&self) -> Result<()>;
    fn hot_add(&self, dev: DevId) -> Result<()>;
    fn hot_remove(&self, dev: DevId) -> Result<()>;
    fn set_faulty(&self, dev: DevId) -> Result<()>;
    fn add_disk(&self, slot: &DiskSlot) -> Result<()>;
    fn reread_partitions(&self) -> Result<()>;
}

/// Opens [`ArrayKernel`] handles by path or device number.
pub trait ArrayOpener {
    fn open(&self, path: &str) -> Result<Box<dyn ArrayKernel>>;
    fn open_excl(&self, path: &str) -> Result<Box<dyn ArrayKernel>>;
    fn open_excl_by_num(&self, dev: DevId) -> Result<Box<dyn ArrayKernel>>;
}

pub(crate) fn array_info_from_raw(raw: &ioctl::MduArrayInfo) -> ArrayInfo {
    ArrayInfo {
        level: RaidLevel::from_raw(raw.level),
        layout: raw.layout,
        raid_disks: raw.raid_disks,
        nr_disks: raw.nr_disks,
        active_disks: raw.active_disks,
        working_disks: raw.working_disks,
        failed_disks: raw.failed_disks,
        spare_disks: raw.spare_disks,
        major_version: raw.major_version,
        minor_version: raw.minor_version,
        not_persistent: raw.not_persistent != 0,
        size_kib: raw.size as u32,
    }
}

pub(crate) fn disk_slot_from_raw(raw: &ioctl::MduDiskInfo) -> DiskSlot {
    DiskSlot {
        number: raw.number,
        dev: DevId::new(raw.major as u32, raw.minor as u32),
        raid_disk: raw.raid_disk,
        state: disk_state_from_raw(raw.state as u32),
    }
}

/// Production [`ArrayKernel`] over an open md device file.
pub struct MdArray {
    file: File,
    dev: DevId,
}

impl MdArray {
    pub fn from_file(file: File) -> Result<Self> {
        let meta = file.metadata()?;
        let dev = DevId::from_raw(meta.rdev());
        Ok(MdArray { file, dev })
    }

    fn ioc_none(&self, op: &'static str, request: u64, arg: libc::c_ulong) -> Result<()> {
        let rv = unsafe { libc::ioctl(self.file.as_raw_fd(), request as libc::c_ulong, arg) };
        if rv != 0 {
            return Err(SysError::last_kernel(op));
        }
        Ok(())
    }

    fn ioc_ptr<T>(&self, op: &'static str, request: u64, arg: *mut T) -> Result<()> {
        let rv = unsafe { libc::ioctl(self.file.as_raw_fd(), request as libc::c_ulong, arg) };
        if rv != 0 {
            return Err(SysError::last_kernel(op));
        }
        Ok(())
    }
}

impl ArrayKernel for MdArray {
    fn dev_num(&self) -> DevId {
        self.dev
    }

    fn driver_version(&self) -> Result<RaidVersion> {
        let mut raw = ioctl::MduVersion::default();
        self.ioc_ptr("RAID_VERSION", ioctl::RAID_VERSION, &mut raw)?;
        Ok(RaidVersion::new(raw.major, raw.minor, raw.patchlevel))
    }

    fn array_info(&self) -> Result<ArrayInfo> {
        let mut raw = ioctl::MduArrayInfo::default();
        self.ioc_ptr("GET_ARRAY_INFO", ioctl::GET_ARRAY_INFO, &mut raw)?;
        Ok(array_info_from_raw(&raw))
    }

    fn disk_info(&self, number: i32) -> Result<DiskSlot> {
        let mut raw = ioctl::MduDiskInfo {
            number,
            ..Default::default()
        };
        self.ioc_ptr("GET_DISK_INFO", ioctl::GET_DISK_INFO, &mut raw)?;
        Ok(disk_slot_from_raw(&raw))
    }

    fn run(&self) -> Result<()> {
        let mut param = ioctl::MduParam::default();
        self.ioc_ptr("RUN_ARRAY", ioctl::RUN_ARRAY, &mut param)
    }

    fn stop(&self) -> Result<()> {
        self.ioc_none("STOP_ARRAY", ioctl::STOP_ARRAY, 0)
    }

    fn legacy_stop(&self) -> Result<()> {
        self.ioc_none("STOP_MD", ioctl::STOP_MD, 0)
    }

    fn set_readonly(&self) -> Result<()> {
        self.ioc_none("STOP_ARRAY_RO", ioctl::STOP_ARRAY_RO, 0)
    }

    fn set_readwrite(&self) -> Result<()> {
        self.ioc_none("RESTART_ARRAY_RW", ioctl::RESTART_ARRAY_RW, 0)
    }

    fn hot_add(&self, dev: DevId) -> Result<()> {
        self.ioc_none("HOT_ADD_DISK", ioctl::HOT_ADD_DISK, dev.to_raw() as libc::c_ulong)
    }

    fn hot_remove(&self, dev: DevId) -> Result<()> {
        self.ioc_none(
            "HOT_REMOVE_DISK",
            ioctl::HOT_REMOVE_DISK,
            dev.to_raw() as libc::c_ulong,
        )
    }

    fn set_faulty(&self, dev: DevId) -> Result<()> {
        self.ioc_none(
            "SET_DISK_FAULTY",
            ioctl::SET_DISK_FAULTY,
            dev.to_raw() as libc::c_ulong,
        )
    }

    fn add_disk(&self, slot: &DiskSlot) -> Result<()> {
        let mut raw = ioctl::MduDiskInfo {
            number: slot.number,
            major: slot.dev.major as libc::c_int,
            minor: slot.dev.minor as libc::c_int,
            raid_disk: slot.raid_disk,
            state: slot.state.bits() as libc::c_int,
        };
        self.ioc_ptr("ADD_NEW_DISK", ioctl::ADD_NEW_DISK, &mut raw)
    }

    fn reread_partitions(&self) -> Result<()> {
        self.ioc_none("BLKRRPART", ioctl::BLKRRPART, 0)
    }
}

/// Production [`ArrayOpener`].
pub struct MdOpener;

impl ArrayOpener for MdOpener {
    fn open(&self, path: &str) -> Result<Box<dyn ArrayKernel>> {
        let file = devnode::open_path(path, libc::O_RDONLY)?;
        Ok(Box::new(MdArray::from_file(file)?))
    }

    fn open_excl(&self, path: &str) -> Result<Box<dyn ArrayKernel>> {
        let file = devnode::open_path(path, libc::O_RDONLY | libc::O_EXCL)?;
        Ok(Box::new(MdArray::from_file(file)?))
    }

    fn open_excl_by_num(&self, dev: DevId) -> Result<Box<dyn ArrayKernel>> {
        let file = devnode::open_by_devnum(dev, libc::O_RDONLY | libc::O_EXCL)?;
        Ok(Box::new(MdArray::from_file(file)?))
    }
}

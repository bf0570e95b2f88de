// SPDX-License-Identifier: GPL-3.0-only

//! md driver ioctl numbers and argument layouts.
//!
//! Request numbers follow the generic Linux `_IOC` encoding; the
//! structs mirror the kernel's `mdu_*_t` layouts field for field.

use std::mem::size_of;

pub const MD_MAJOR: u64 = 9;

const IOC_NONE: u64 = 0;
const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

const fn ioc(dir: u64, ty: u64, nr: u64, size: u64) -> u64 {
    (dir << 30) | (size << 16) | (ty << 8) | nr
}

const fn io(ty: u64, nr: u64) -> u64 {
    ioc(IOC_NONE, ty, nr, 0)
}

const fn ior<T>(ty: u64, nr: u64) -> u64 {
    ioc(IOC_READ, ty, nr, size_of::<T>() as u64)
}

const fn iow<T>(ty: u64, nr: u64) -> u64 {
    ioc(IOC_WRITE, ty, nr, size_of::<T>() as u64)
}

/// Driver version, from the kernel version query.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MduVersion {
    pub major: libc::c_int,
    pub minor: libc::c_int,
    pub patchlevel: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MduArrayInfo {
    pub major_version: libc::c_int,
    pub minor_version: libc::c_int,
    pub patch_version: libc::c_int,
    pub ctime: libc::c_uint,
    pub level: libc::c_int,
    pub size: libc::c_int,
    pub nr_disks: libc::c_int,
    pub raid_disks: libc::c_int,
    pub md_minor: libc::c_int,
    pub not_persistent: libc::c_int,
    pub utime: libc::c_uint,
    pub state: libc::c_int,
    pub active_disks: libc::c_int,
    pub working_disks: libc::c_int,
    pub failed_disks: libc::c_int,
    pub spare_disks: libc::c_int,
    pub layout: libc::c_int,
    pub chunk_size: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MduDiskInfo {
    pub number: libc::c_int,
    pub major: libc::c_int,
    pub minor: libc::c_int,
    pub raid_disk: libc::c_int,
    pub state: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MduParam {
    pub personality: libc::c_int,
    pub chunk_size: libc::c_int,
    pub max_fault: libc::c_int,
}

pub const RAID_VERSION: u64 = ior::<MduVersion>(MD_MAJOR, 0x10);
pub const GET_ARRAY_INFO: u64 = ior::<MduArrayInfo>(MD_MAJOR, 0x11);
pub const GET_DISK_INFO: u64 = ior::<MduDiskInfo>(MD_MAJOR, 0x12);
pub const ADD_NEW_DISK: u64 = iow::<MduDiskInfo>(MD_MAJOR, 0x21);
pub const HOT_REMOVE_DISK: u64 = io(MD_MAJOR, 0x22);
pub const HOT_ADD_DISK: u64 = io(MD_MAJOR, 0x28);
pub const SET_DISK_FAULTY: u64 = io(MD_MAJOR, 0x29);
pub const RUN_ARRAY: u64 = iow::<MduParam>(MD_MAJOR, 0x30);
pub const STOP_ARRAY: u64 = io(MD_MAJOR, 0x32);
pub const STOP_ARRAY_RO: u64 = io(MD_MAJOR, 0x33);
pub const RESTART_ARRAY_RW: u64 = io(MD_MAJOR, 0x34);

/// Pre-0.90 driver stop request.
pub const STOP_MD: u64 = io(MD_MAJOR, 3);

/// Generic block layer: re-read the partition table.
pub const BLKRRPART: u64 = io(0x12, 95);
/// Generic block layer: device size in bytes.
pub const BLKGETSIZE64: u64 = ior::<u64>(0x12, 114);

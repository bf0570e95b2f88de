// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system capabilities for md-array management
//!
//! This crate owns everything that touches the machine:
//! - the md ioctl surface of an open array device
//! - the per-array sysfs attribute tree
//! - block device node probing and exclusive-open claims
//! - `/proc/mdstat` scanning
//! - the persistent device-name map
//! - the notification channel to the external metadata monitor
//!
//! Each capability is exposed as a trait so the control plane in
//! `raid-manage` can be exercised against in-memory fakes; the
//! production implementation lives next to each trait. The metadata
//! ("supertype") capability is trait-only: the format codecs belong to
//! collaborating crates.

pub mod array;
pub mod devnode;
pub mod error;
pub mod ioctl;
pub mod mdstat;
pub mod metadata;
pub mod monitor;
pub mod namemap;
pub mod platform;
pub mod sysfs;

pub use array::{ArrayKernel, ArrayOpener, MdArray, MdOpener};
pub use devnode::{BlockStat, DevNodes, DeviceAccess, ExclusiveGuard, NodeProbe};
pub use error::{Result, SysError};
pub use mdstat::{ActiveArray, ArrayEnumerator, MdstatScan};
pub use metadata::Supertype;
pub use monitor::{MdmonClient, MonitorGateway};
pub use namemap::{NameMap, NameMapEntry, NameMapFile};
pub use platform::{kernel_version, udev_active};
pub use sysfs::{
    HolderCheck, MdSysfs, NewMember, StateHandle, SysfsApi, external_part, is_subarray, md_name,
    subarray_parent,
};

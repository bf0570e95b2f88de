// SPDX-License-Identifier: GPL-3.0-only

//! Expansion of symbolic device references and validation of concrete
//! ones. Each batch entry resolves to either a replacement
//! sub-sequence (spliced in right after it) or a single concrete
//! device ready for dispatch.

use raid_sys::{ArrayKernel, DeviceAccess, NodeProbe, StateHandle, SysfsApi};
use raid_types::{ArrayInfo, DevId, DeviceSpec, DeviceTarget, Disposition};
use tracing::warn;

use crate::error::{ManageError, Result};
use crate::probe;

/// A concrete device the engines can act on.
#[derive(Debug)]
pub struct ResolvedDevice {
    pub spec: DeviceSpec,
    /// Device number, when one could be determined.
    pub rdev: Option<DevId>,
    /// Held sysfs state handle for members that are already gone from
    /// the kernel's device table but still fault/remove-able.
    pub state_handle: Option<StateHandle>,
    /// The node could not be opened; holder checks are impossible and
    /// are assumed to pass.
    pub via_detached: bool,
}

#[derive(Debug)]
pub enum Resolution {
    /// Replacement entries to splice in after the current one.
    Expand(Vec<DeviceSpec>),
    Device(Box<ResolvedDevice>),
    /// Dropped without error (missing-re-add tolerates absent devices).
    Skip,
}

pub fn resolve_spec(
    kernel: &dyn ArrayKernel,
    sysfs: &dyn SysfsApi,
    devices: &dyn DeviceAccess,
    array: &ArrayInfo,
    devname: &str,
    spec: DeviceSpec,
    pool: &[String],
) -> Result<Resolution> {
    match &spec.target {
        DeviceTarget::Faulty => {
            if spec.disposition != Disposition::Remove {
                return Err(ManageError::Config(format!(
                    "'{}' only meaningful with remove",
                    spec.name
                )));
            }
            let expanded = probe::faulty_members(kernel, array)
                .into_iter()
                .map(|slot| DeviceSpec::for_dev(slot.dev, Disposition::Remove))
                .collect();
            Ok(Resolution::Expand(expanded))
        }

        DeviceTarget::Detached => {
            if spec.disposition != Disposition::Remove && spec.disposition != Disposition::Fault {
                return Err(ManageError::Config(
                    "'detached' only meaningful with remove or fault".to_string(),
                ));
            }
            let skip_faulty = spec.disposition == Disposition::Fault;
            let expanded = probe::detached_members(kernel, devices, array, skip_faulty)
                .into_iter()
                .map(|slot| DeviceSpec::for_dev(slot.dev, spec.disposition))
                .collect();
            Ok(Resolution::Expand(expanded))
        }

        DeviceTarget::Missing => {
            if spec.disposition != Disposition::ReAdd {
                return Err(ManageError::Config(
                    "'missing' only meaningful with re-add".to_string(),
                ));
            }
            if pool.is_empty() {
                warn!("no devices to scan for missing members");
                return Ok(Resolution::Expand(Vec::new()));
            }
            let expanded = pool
                .iter()
                .map(|name| DeviceSpec::new(name, Disposition::MissingReAdd))
                .collect();
            Ok(Resolution::Expand(expanded))
        }

        DeviceTarget::KernelName(name) => {
            if spec.disposition != Disposition::Remove && spec.disposition != Disposition::Fault {
                return Err(ManageError::Config(format!(
                    "{} only meaningful with remove or fault",
                    spec.name
                )));
            }
            if let Some(dev) = sysfs.member_devnum(name)? {
                return Ok(Resolution::Device(Box::new(ResolvedDevice {
                    spec,
                    rdev: Some(dev),
                    state_handle: None,
                    via_detached: false,
                })));
            }
            // The device-number link is gone: the disk has left the
            // kernel's table, but a state entry may remain.
            match sysfs.open_member_state(name) {
                Ok(handle) => Ok(Resolution::Device(Box::new(ResolvedDevice {
                    spec,
                    rdev: None,
                    state_handle: Some(handle),
                    via_detached: false,
                }))),
                Err(_) => Err(ManageError::Config(format!(
                    "{} does not appear to be a component of {devname}",
                    spec.name
                ))),
            }
        }

        DeviceTarget::DevNum(dev) => {
            let via_detached = devices.probe_node(*dev) == NodeProbe::Gone;
            Ok(Resolution::Device(Box::new(ResolvedDevice {
                rdev: Some(*dev),
                state_handle: None,
                via_detached,
                spec,
            })))
        }

        DeviceTarget::Path(path) => match devices.stat_path(path) {
            Ok(stat) => {
                if !stat.is_block {
                    if spec.disposition == Disposition::MissingReAdd {
                        return Ok(Resolution::Skip);
                    }
                    return Err(ManageError::NotBlock {
                        device: spec.name.clone(),
                    });
                }
                Ok(Resolution::Device(Box::new(ResolvedDevice {
                    rdev: Some(stat.dev),
                    state_handle: None,
                    via_detached: false,
                    spec,
                })))
            }
            Err(open_err) => {
                if spec.disposition == Disposition::Remove
                    && let Ok(stat) = devices.lstat_path(path)
                {
                    // The node still exists on disk; that is enough
                    // to remove it from the array.
                    if !stat.is_block {
                        return Err(ManageError::NotBlock {
                            device: spec.name.clone(),
                        });
                    }
                    return Ok(Resolution::Device(Box::new(ResolvedDevice {
                        rdev: Some(stat.dev),
                        state_handle: None,
                        via_detached: true,
                        spec,
                    })));
                }
                if spec.disposition == Disposition::MissingReAdd {
                    return Ok(Resolution::Skip);
                }
                Err(ManageError::Access {
                    device: spec.name.clone(),
                    source: open_err,
                })
            }
        },
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! The remove engine: take one member out of an array, with the
//! container-exclusivity and holder checks external metadata needs.

use raid_sys::{ArrayKernel, DeviceAccess, HolderCheck, MonitorGateway, Supertype, SysfsApi};
use tracing::info;

use crate::common::Verbosity;
use crate::error::{ManageError, Result};
use crate::resolve::ResolvedDevice;

pub fn remove_device(
    kernel: &dyn ArrayKernel,
    sysfs: &dyn SysfsApi,
    devices: &dyn DeviceAccess,
    monitor: &dyn MonitorGateway,
    tst: &dyn Supertype,
    dv: &mut ResolvedDevice,
    devname: &str,
    verbosity: Verbosity,
) -> Result<()> {
    let mut guard = None;

    if tst.is_external() {
        // Serialise against concurrent spare assignment while we check
        // that no member array still claims the device.
        let container = kernel.dev_num();
        guard = Some(devices.open_array_excl(container).map_err(|_| {
            ManageError::Busy("cannot get exclusive access to container".to_string())
        })?);

        // With the node already gone, or only a state handle left,
        // uniqueness cannot be checked and is assumed.
        if !dv.via_detached && dv.state_handle.is_none() {
            let Some(rdev) = dv.rdev else {
                return Err(ManageError::Config(format!(
                    "no device number for {}",
                    dv.spec.name
                )));
            };
            match sysfs.unique_holder(rdev) {
                Ok(HolderCheck::Unique) => {}
                Ok(HolderCheck::OtherHolder) => {
                    return Err(ManageError::Hazard(format!(
                        "{} is still in use, cannot remove",
                        dv.spec.name
                    )));
                }
                Ok(HolderCheck::NotMember) => {
                    return Err(ManageError::Hazard(format!(
                        "{} is not a member, cannot remove",
                        dv.spec.name
                    )));
                }
                Err(err) => {
                    return Err(ManageError::action(
                        format!("cannot check holders of {}", dv.spec.name),
                        err,
                    ));
                }
            }
        }
    }

    let result = if let Some(handle) = dv.state_handle.as_mut() {
        handle
            .write_state("remove")
            .map_err(raid_sys::SysError::from)
    } else {
        let Some(rdev) = dv.rdev else {
            return Err(ManageError::Config(format!(
                "no device number for {}",
                dv.spec.name
            )));
        };
        match kernel.hot_remove(rdev) {
            Err(err) if err.is_gone() => {
                // Old kernels reject hot-remove when no personality is
                // registered; fall back to the member's state entry.
                match sysfs.member_by_dev(rdev) {
                    Ok(Some(name)) => sysfs.write_member_state(&name, "remove"),
                    _ => Err(err),
                }
            }
            other => other,
        }
    };

    result.map_err(|err| {
        ManageError::action(format!("hot remove failed for {}", dv.spec.name), err)
    })?;

    if tst.is_external() {
        // Notify before releasing exclusivity, so the monitor sees the
        // remove before any subsequent add can race ahead of it.
        monitor.ping_manager(sysfs.sys_name());
    }
    drop(guard);

    if verbosity.announces() {
        info!("hot removed {} from {}", dv.spec.name, devname);
    }
    Ok(())
}

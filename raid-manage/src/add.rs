// SPDX-License-Identifier: GPL-3.0-only

//! The add engine: decide between hot-add, re-add and fresh add for
//! one candidate device, then perform the chosen path.

use raid_sys::{ArrayKernel, DeviceAccess, MonitorGateway, NewMember, Supertype, SysfsApi};
use raid_types::{
    ArrayInfo, DevId, DiskFlag, DiskSlot, DiskState, Disposition, KernelVersion, MetaUpdate,
    WriteMostly,
};
use tracing::{info, warn};

use crate::common::Verbosity;
use crate::error::{ManageError, Result};
use crate::probe;
use crate::resolve::ResolvedDevice;

/// Batch-level parameters the add engine needs for every candidate.
pub struct AddRequest<'a> {
    pub array: &'a ArrayInfo,
    /// Component size in sectors every member must cover.
    pub component_size: u64,
    pub force: bool,
    pub update: Option<MetaUpdate>,
    pub kernel_version: KernelVersion,
    pub verbosity: Verbosity,
    /// Array name for diagnostics.
    pub devname: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Nothing was done and that is acceptable for this disposition.
    Skipped,
}

enum ReAddOutcome {
    ReAdded,
    NotPossible,
}

pub fn add_device(
    kernel: &dyn ArrayKernel,
    sysfs: &dyn SysfsApi,
    devices: &dyn DeviceAccess,
    monitor: &dyn MonitorGateway,
    tst: &mut dyn Supertype,
    dv: &ResolvedDevice,
    req: &AddRequest<'_>,
) -> Result<AddOutcome> {
    let Some(rdev) = dv.rdev else {
        return Err(ManageError::Config(format!(
            "no device number for {}",
            dv.spec.name
        )));
    };
    let Some(path) = candidate_path(devices, dv) else {
        if dv.spec.disposition == Disposition::MissingReAdd {
            return Ok(AddOutcome::Skipped);
        }
        return Err(ManageError::Config(format!(
            "no device node for {}",
            dv.spec.name
        )));
    };

    let ldsize = match devices.size_sectors(&path) {
        Ok(sectors) => sectors,
        Err(err) => {
            if dv.spec.disposition == Disposition::MissingReAdd {
                return Ok(AddOutcome::Skipped);
            }
            return Err(ManageError::Access {
                device: dv.spec.name.clone(),
                source: err,
            });
        }
    };

    if !tst.fits_geometry(req.array, ldsize) {
        if !req.force {
            return Err(ManageError::TooLarge {
                candidate: dv.spec.name.clone(),
                array: req.devname.to_string(),
            });
        }
        warn!(
            "{} is larger than {} can effectively use, adding anyway as force was given",
            dv.spec.name, req.devname
        );
    }

    // Legacy metadata on a legacy driver gets exactly one direct
    // hot-add attempt; no superblock handling on either outcome.
    if !tst.is_external()
        && req.array.major_version == 0
        && kernel.driver_version()?.legacy_slot_allocation()
    {
        return match kernel.hot_add(rdev) {
            Ok(()) => {
                if req.verbosity.announces() {
                    info!("hot added {}", dv.spec.name);
                }
                Ok(AddOutcome::Added)
            }
            Err(err) => Err(ManageError::action(
                format!("hot add failed for {}", dv.spec.name),
                err,
            )),
        };
    }

    if req.array.is_persistent() || tst.is_external() {
        load_template(kernel, devices, tst)?;

        if !tst.has_super() && dv.spec.disposition == Disposition::Add {
            return Err(ManageError::NoMetadata(req.devname.to_string()));
        }
        // No loadable template on a re-add means the array may be
        // completely dead; the kernel validates the candidate's own
        // record in that case.

        if tst.avail_size(ldsize) < req.component_size {
            if dv.spec.disposition == Disposition::MissingReAdd {
                return Ok(AddOutcome::Skipped);
            }
            return Err(ManageError::TooSmall(dv.spec.name.clone()));
        }

        // The candidate may have been a member until recently and
        // still carry its exact identity and slot; restoring that
        // avoids a full resynchronisation.
        if req.array.is_persistent() {
            let mut dev_st = tst.dup();
            if dev_st.load_super(&path).is_ok() && dev_st.has_super() {
                match attempt_re_add(kernel, devices, dev_st.as_mut(), &*tst, dv, rdev, &path, req)?
                {
                    ReAddOutcome::ReAdded => return Ok(AddOutcome::Added),
                    ReAddOutcome::NotPossible => {}
                }
            }
        }

        match dv.spec.disposition {
            Disposition::MissingReAdd => {
                if req.verbosity.chatty() {
                    info!(
                        "re-add of {} to {} is not possible",
                        dv.spec.name, req.devname
                    );
                }
                return Ok(AddOutcome::Skipped);
            }
            Disposition::ReAdd => {
                return Err(ManageError::NotPossible(format!(
                    "re-add of {} to {} is not possible",
                    dv.spec.name, req.devname
                )));
            }
            _ => {}
        }

        if probe::array_failed(kernel, req.array) {
            return Err(ManageError::Hazard(format!(
                "{} has failed so adding cannot work and might destroy data on {}; \
                 stop the array and re-assemble it",
                req.devname, dv.spec.name
            )));
        }
    } else if ldsize < req.component_size {
        // Without persistent metadata the raw size is all there is to
        // check.
        return Err(ManageError::TooSmall(dv.spec.name.clone()));
    }

    commit_add(kernel, sysfs, devices, monitor, tst, dv, req, rdev, &path)
}

fn candidate_path(devices: &dyn DeviceAccess, dv: &ResolvedDevice) -> Option<String> {
    match &dv.spec.target {
        raid_types::DeviceTarget::Path(path) => Some(path.clone()),
        _ => dv.rdev.and_then(|dev| devices.path_of(dev)),
    }
}

/// Get a template superblock loaded: container metadata for external
/// formats, otherwise any in-sync member's image.
fn load_template(
    kernel: &dyn ArrayKernel,
    devices: &dyn DeviceAccess,
    tst: &mut dyn Supertype,
) -> Result<()> {
    if tst.has_super() {
        return Ok(());
    }

    if tst.is_external() {
        let _ = tst.load_container(kernel.dev_num());
        return Ok(());
    }

    for number in 0..tst.max_devs() {
        let Ok(slot) = kernel.disk_info(number) else {
            continue;
        };
        if slot.is_empty() || !slot.in_sync() {
            continue;
        }
        let Some(member_path) = devices.path_of(slot.dev) else {
            continue;
        };
        if tst.load_super(&member_path).is_ok() {
            break;
        }
    }
    Ok(())
}

/// Try to restore the candidate to its previous slot using its own
/// residual superblock.
#[allow(clippy::too_many_arguments)]
fn attempt_re_add(
    kernel: &dyn ArrayKernel,
    devices: &dyn DeviceAccess,
    dev_st: &mut dyn Supertype,
    tst: &dyn Supertype,
    dv: &ResolvedDevice,
    rdev: DevId,
    path: &str,
    req: &AddRequest<'_>,
) -> Result<ReAddOutcome> {
    let Ok(mdi) = dev_st.recorded_disk() else {
        return Ok(ReAddOutcome::NotPossible);
    };
    let Ok(ouuid) = dev_st.uuid() else {
        return Ok(ReAddOutcome::NotPossible);
    };
    let duuid = if tst.has_super() {
        tst.uuid()?
    } else {
        // No template to compare against; the kernel will check.
        ouuid
    };

    let previously_active =
        mdi.state.contains(DiskFlag::Active) && !mdi.state.contains(DiskFlag::Faulty);
    if !previously_active || duuid != ouuid {
        return Ok(ReAddOutcome::NotPossible);
    }

    // Version-1 re-add regressed in a known kernel window.
    if req.array.major_version == 1 && !req.kernel_version.supports_v1_re_add() {
        return Ok(ReAddOutcome::NotPossible);
    }

    // The previous slot must still be free.
    match kernel.disk_info(mdi.number) {
        Ok(slot) if slot.is_empty() => {}
        _ => return Ok(ReAddOutcome::NotPossible),
    }

    let mut state = mdi.state;
    match dv.spec.write_mostly {
        WriteMostly::Set => state |= DiskFlag::WriteMostly,
        WriteMostly::Clear => state &= !DiskState::from(DiskFlag::WriteMostly),
        WriteMostly::Unset => {}
    }
    let slot = DiskSlot {
        number: mdi.number,
        dev: rdev,
        raid_disk: mdi.raid_disk,
        state,
    };

    let _ = devices.drop_partitions(path);

    if req.update.is_some() || dv.spec.write_mostly != WriteMostly::Unset {
        refresh_candidate_super(dev_st, dv, req, path).map_err(|err| {
            ManageError::action(
                format!("failed to update superblock of {} during re-add", dv.spec.name),
                err,
            )
        })?;
    }

    match kernel.add_disk(&slot) {
        Ok(()) => {
            if req.verbosity.announces() {
                info!("re-added {}", dv.spec.name);
            }
            Ok(ReAddOutcome::ReAdded)
        }
        Err(err) if err.maybe_transient() => {
            if dv.spec.disposition == Disposition::MissingReAdd {
                return Ok(ReAddOutcome::NotPossible);
            }
            Err(ManageError::action(
                format!("add new device failed for {}", dv.spec.name),
                err,
            ))
        }
        // Anything else falls through to a fresh add.
        Err(_) => Ok(ReAddOutcome::NotPossible),
    }
}

fn refresh_candidate_super(
    dev_st: &mut dyn Supertype,
    dv: &ResolvedDevice,
    req: &AddRequest<'_>,
    path: &str,
) -> raid_sys::Result<()> {
    match dv.spec.write_mostly {
        WriteMostly::Set => dev_st.update_super(&MetaUpdate::WriteMostly, path)?,
        WriteMostly::Clear => dev_st.update_super(&MetaUpdate::ReadWrite, path)?,
        WriteMostly::Unset => {}
    }
    if let Some(update) = &req.update {
        dev_st.update_super(update, path)?;
    }
    dev_st.store_super(path)
}

/// Commit to this candidate: slot assignment, superblock write, and
/// the kernel add.
#[allow(clippy::too_many_arguments)]
fn commit_add(
    kernel: &dyn ArrayKernel,
    sysfs: &dyn SysfsApi,
    devices: &dyn DeviceAccess,
    monitor: &dyn MonitorGateway,
    tst: &mut dyn Supertype,
    dv: &ResolvedDevice,
    req: &AddRequest<'_>,
    rdev: DevId,
    path: &str,
) -> Result<AddOutcome> {
    let _ = devices.drop_partitions(path);

    // Old kernels pick their own slot counting up from raid_disks; we
    // must land on the same number.
    let number = probe::next_spare_slot(kernel, req.array, tst.max_devs());
    let mut slot = DiskSlot {
        number,
        dev: rdev,
        raid_disk: -1,
        state: DiskState::empty(),
    };

    if req.array.is_persistent() {
        if dv.spec.write_mostly == WriteMostly::Set {
            slot.state |= DiskFlag::WriteMostly;
        }
        tst.add_to_super(&slot, path)?;
        tst.write_init_super()?;
    } else if dv.spec.disposition == Disposition::ReAdd {
        // Without metadata, a re-add just fills a free position.
        if let Some(position) = probe::free_position(kernel, req.array, tst.max_devs()) {
            slot.raid_disk = position;
            slot.state |= DiskFlag::Sync;
        }
    }
    if dv.spec.write_mostly == WriteMostly::Set {
        slot.state |= DiskFlag::WriteMostly;
    }

    if tst.is_external() {
        let container = kernel.dev_num();
        let guard = devices.open_array_excl(container).map_err(|_| {
            tst.free_super();
            ManageError::Busy(format!(
                "add failed for {}: could not get exclusive access to container",
                dv.spec.name
            ))
        })?;

        if monitor.running(container) {
            tst.queue_updates();
        }
        tst.add_to_super(&slot, path)?;
        if tst.has_queued_updates() {
            tst.flush_updates()?;
        } else {
            tst.sync_metadata()?;
        }

        // Exclusive metadata handles must be closed before the kernel
        // is asked to claim the device.
        tst.free_super();
        sysfs
            .add_disk(&NewMember {
                dev: rdev,
                recovery_start: 0,
            })
            .map_err(|err| {
                ManageError::action(
                    format!("add new device to external metadata failed for {}", dv.spec.name),
                    err,
                )
            })?;
        monitor.ping_monitor_by_id(container);
        drop(guard);
    } else {
        tst.free_super();
        kernel.add_disk(&slot).map_err(|err| {
            ManageError::action(
                format!("add new device failed for {} as {}", dv.spec.name, slot.number),
                err,
            )
        })?;
    }

    if req.verbosity.announces() {
        info!("added {}", dv.spec.name);
    }
    Ok(AddOutcome::Added)
}

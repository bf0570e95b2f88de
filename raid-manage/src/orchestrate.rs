// SPDX-License-Identifier: GPL-3.0-only

//! The batch orchestrator: resolve each entry of an ordered device
//! list, dispatch to the add/remove/fault engines, and track how many
//! actions landed.

use raid_sys::{ArrayKernel, DeviceAccess, MonitorGateway, Supertype, SysfsApi};
use raid_types::{DeviceSpec, DeviceTarget, Disposition, KernelVersion, MetaUpdate};
use tracing::info;

use crate::add::{self, AddOutcome, AddRequest};
use crate::common::{Outcome, Verbosity};
use crate::error::{ManageError, Result};
use crate::remove;
use crate::resolve::{self, Resolution};

/// Everything needed to operate on one open array.
pub struct ArraySession<'a> {
    /// Array name for diagnostics.
    pub devname: &'a str,
    pub kernel: &'a dyn ArrayKernel,
    pub sysfs: &'a dyn SysfsApi,
    pub devices: &'a dyn DeviceAccess,
    pub monitor: &'a dyn MonitorGateway,
    pub supertype: &'a mut dyn Supertype,
}

pub struct BatchOptions {
    pub force: bool,
    pub verbosity: Verbosity,
    /// Superblock update applied to candidates during re-add.
    pub update: Option<MetaUpdate>,
    /// Device pool that `missing` expands over.
    pub device_pool: Vec<String>,
    pub kernel_version: KernelVersion,
    /// Report a distinct no-op outcome when nothing was done.
    pub test: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            force: false,
            verbosity: Verbosity::default(),
            update: None,
            device_pool: Vec::new(),
            kernel_version: raid_sys::kernel_version(),
            test: false,
        }
    }
}

/// Thaws background activity when the batch ends, on every exit path.
struct FreezeGuard<'a> {
    sysfs: &'a dyn SysfsApi,
    armed: bool,
}

impl<'a> FreezeGuard<'a> {
    fn new(sysfs: &'a dyn SysfsApi) -> Self {
        let armed = sysfs.freeze();
        FreezeGuard { sysfs, armed }
    }
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sysfs.thaw();
        }
    }
}

/// Apply an ordered list of device requests to one array.
///
/// Symbolic entries expand in place; concrete entries dispatch to the
/// engines. A hard add/remove/fault failure ends the batch at that
/// entry, with background activity thawed on the way out.
pub fn apply_device_list(
    session: &mut ArraySession<'_>,
    specs: Vec<DeviceSpec>,
    opts: &BatchOptions,
) -> Result<Outcome> {
    let array = session.kernel.array_info().map_err(|_| {
        ManageError::Config(format!("cannot get array info for {}", session.devname))
    })?;

    // The kernel's in-struct size is 32-bit and may be truncated;
    // prefer the sysfs value.
    let component_size = match session.sysfs.component_size() {
        Ok(sectors) if sectors > 0 => sectors,
        _ => u64::from(array.size_kib) * 2,
    };

    let subarray = session.supertype.subarray().map(str::to_string);

    let mut count = 0usize;
    let mut freeze: Option<FreezeGuard<'_>> = None;
    let mut queue = specs;
    let mut index = 0;

    while index < queue.len() {
        let spec = queue[index].clone();
        index += 1;

        let resolution = resolve::resolve_spec(
            session.kernel,
            session.sysfs,
            session.devices,
            &array,
            session.devname,
            spec,
            &opts.device_pool,
        )?;
        let mut dv = match resolution {
            Resolution::Expand(items) => {
                queue.splice(index..index, items);
                continue;
            }
            Resolution::Skip => continue,
            Resolution::Device(dv) => dv,
        };

        match dv.spec.disposition {
            Disposition::Add | Disposition::ReAdd | Disposition::MissingReAdd => {
                if subarray.is_some() {
                    return Err(ManageError::Config(
                        "cannot add disks to a member array; perform this operation \
                         on the parent container"
                            .to_string(),
                    ));
                }

                // Make sure nobody else is using the candidate before
                // committing anything to it.
                if let Some(path) = claimable_path(session.devices, &dv) {
                    if let Err(err) = session.devices.claim_check(&path) {
                        if dv.spec.disposition == Disposition::MissingReAdd {
                            continue;
                        }
                        return Err(ManageError::Access {
                            device: dv.spec.name.clone(),
                            source: err,
                        });
                    }
                }

                if freeze.is_none() {
                    freeze = Some(FreezeGuard::new(session.sysfs));
                }

                let request = AddRequest {
                    array: &array,
                    component_size,
                    force: opts.force,
                    update: opts.update.clone(),
                    kernel_version: opts.kernel_version,
                    verbosity: opts.verbosity,
                    devname: session.devname,
                };
                match add::add_device(
                    session.kernel,
                    session.sysfs,
                    session.devices,
                    session.monitor,
                    &mut *session.supertype,
                    &dv,
                    &request,
                )? {
                    AddOutcome::Added => count += 1,
                    AddOutcome::Skipped => {}
                }
            }

            Disposition::Remove => {
                let outcome = if subarray.is_some() {
                    Err(ManageError::Config(
                        "cannot remove disks from a member array; perform this \
                         operation on the parent container"
                            .to_string(),
                    ))
                } else {
                    remove::remove_device(
                        session.kernel,
                        session.sysfs,
                        session.devices,
                        session.monitor,
                        &*session.supertype,
                        &mut dv,
                        session.devname,
                        opts.verbosity,
                    )
                };
                dv.state_handle = None;
                outcome?;
                count += 1;
            }

            Disposition::Fault => {
                let outcome = if let Some(handle) = dv.state_handle.as_mut() {
                    handle
                        .write_state("faulty")
                        .map_err(raid_sys::SysError::from)
                } else if let Some(rdev) = dv.rdev {
                    session.kernel.set_faulty(rdev)
                } else {
                    // Nothing left to address the member by.
                    Ok(())
                };
                let failure = outcome.err();
                // The state handle is released before the batch aborts.
                dv.state_handle = None;
                if let Some(err) = failure {
                    return Err(ManageError::action(
                        format!("set device faulty failed for {}", dv.spec.name),
                        err,
                    ));
                }
                count += 1;
                if opts.verbosity.announces() {
                    info!("set {} faulty in {}", dv.spec.name, session.devname);
                }
            }
        }
    }

    drop(freeze);

    if opts.test && count == 0 {
        return Ok(Outcome::NoChange);
    }
    Ok(Outcome::Changed(count))
}

/// A path to probe with an exclusive open, when the target has one.
fn claimable_path(devices: &dyn DeviceAccess, dv: &resolve::ResolvedDevice) -> Option<String> {
    match &dv.spec.target {
        DeviceTarget::Path(path) => Some(path.clone()),
        DeviceTarget::DevNum(_) => dv.rdev.and_then(|dev| devices.path_of(dev)),
        _ => None,
    }
}

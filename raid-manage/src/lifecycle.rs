// SPDX-License-Identifier: GPL-3.0-only

//! Run/stop lifecycle and the read-only toggle.
//!
//! Stopping is the delicate path: exclusive access has to be taken
//! before anything destructive, monitor-managed subarrays are asked to
//! go inactive rather than stopped directly, and containers refuse to
//! stop while a member array still references them.

use std::fs;

use raid_sys::{
    ArrayEnumerator, ArrayKernel, ArrayOpener, MonitorGateway, NameMap, SysfsApi, external_part,
    is_subarray, subarray_parent,
};
use raid_types::DevId;
use tracing::{debug, info};

use crate::common::Verbosity;
use crate::error::{ManageError, Result};
use crate::retry::{RetryBudget, retry_while_busy};

/// Capability bundle for lifecycle transitions.
pub struct LifecycleCtx<'a> {
    pub opener: &'a dyn ArrayOpener,
    pub sysfs: &'a dyn SysfsApi,
    pub monitor: &'a dyn MonitorGateway,
    pub arrays: &'a dyn ArrayEnumerator,
    pub names: &'a mut dyn NameMap,
    pub retry: RetryBudget,
    pub verbosity: Verbosity,
    /// Clean up device-node aliases ourselves; off when udev owns the
    /// nodes.
    pub manage_nodes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    ReadOnly,
    ReadWrite,
}

fn ensure_managed(kernel: &dyn ArrayKernel) -> Result<()> {
    if !kernel.driver_version()?.supports_management() {
        return Err(ManageError::Unsupported(
            "need md driver version 0.90.0 or later".to_string(),
        ));
    }
    Ok(())
}

pub fn run_array(kernel: &dyn ArrayKernel, devname: &str, verbosity: Verbosity) -> Result<()> {
    ensure_managed(kernel)?;
    kernel
        .run()
        .map_err(|err| ManageError::action(format!("failed to run array {devname}"), err))?;
    if verbosity.announces() {
        info!("started {devname}");
    }
    Ok(())
}

pub fn stop_array(
    ctx: &mut LifecycleCtx<'_>,
    kernel: Box<dyn ArrayKernel>,
    devname: &str,
    will_retry: bool,
) -> Result<()> {
    let verbosity = if will_retry {
        ctx.verbosity.quieter()
    } else {
        ctx.verbosity
    };

    if !kernel.driver_version()?.supports_management() {
        return kernel.legacy_stop().map_err(|err| {
            ManageError::action(format!("stopping device {devname} failed"), err)
        });
    }

    let devnum = kernel.dev_num();
    // Exclusive access first; if that cannot be had, attempting to
    // stop is a bad idea. The original handle must go before the
    // re-open or it would block its own exclusivity.
    drop(kernel);
    let mut excl = match ctx.opener.open_excl(devname) {
        Ok(handle) if handle.dev_num() == devnum => handle,
        _ => {
            return Err(ManageError::Busy(format!(
                "cannot get exclusive access to {devname}: perhaps a running process, \
                 mounted filesystem or active volume group?"
            )));
        }
    };

    let level = ctx.sysfs.level().unwrap_or(None);
    let text_version = ctx.sysfs.metadata_version().unwrap_or(None);
    let subarray_member = text_version.as_deref().is_some_and(is_subarray);

    if subarray_member && level.is_some_and(|l| l.to_raw() > 0) {
        // Monitor-managed member: request the state change and let the
        // monitor do the teardown.
        drop(excl);
        retry_while_busy(&ctx.retry, || ctx.sysfs.write_array_state("inactive")).map_err(
            |err| ManageError::action(format!("failed to stop array {devname}"), err),
        )?;

        if let Some((container, _)) = text_version.as_deref().and_then(subarray_parent) {
            ctx.monitor.ping_monitor(container);
        }

        // Confirm the kernel actually released the device.
        excl = ctx.opener.open_excl_by_num(devnum).map_err(|_| {
            ManageError::Busy(format!("failed to completely stop {devname}: device is busy"))
        })?;
    } else if text_version
        .as_deref()
        .is_some_and(|v| external_part(v).is_some() && !is_subarray(v))
    {
        // A container. Make sure the monitor is not mid-operation on
        // it, then refuse while any member array still references it.
        ctx.monitor.ping_monitor(ctx.sysfs.sys_name());

        for member in ctx.arrays.active_arrays()? {
            let parent = member
                .metadata_version
                .as_deref()
                .and_then(subarray_parent)
                .map(|(container, _)| container.to_string());
            if parent.as_deref() == Some(ctx.sysfs.sys_name()) {
                return Err(ManageError::Hazard(format!(
                    "cannot stop container {devname}: member {} still active",
                    member.name
                )));
            }
        }
    }

    retry_while_busy(&ctx.retry, || excl.stop()).map_err(|err| {
        if err.is_busy() {
            ManageError::Busy(format!(
                "failed to stop array {devname}: {err}; perhaps a running process, \
                 mounted filesystem or active volume group?"
            ))
        } else {
            ManageError::action(format!("failed to stop array {devname}"), err)
        }
    })?;

    // Older kernels sent no change event on stop; emit one ourselves
    // and drop stale partitions while at it.
    let _ = excl.reread_partitions();
    ctx.sysfs.uevent_change();

    if ctx.manage_nodes {
        let alias = ctx.names.lookup_path(devnum).unwrap_or(None);
        remove_device_aliases(devnum, alias.as_deref());
    }

    if verbosity.announces() {
        info!("stopped {devname}");
    }
    if let Err(err) = ctx.names.remove(devnum) {
        debug!("name map cleanup for {devname} failed: {err}");
    }
    Ok(())
}

pub fn set_array_rw_mode(
    kernel: &dyn ArrayKernel,
    sysfs: &dyn SysfsApi,
    monitor: &dyn MonitorGateway,
    devname: &str,
    mode: RwMode,
) -> Result<()> {
    ensure_managed(kernel)?;

    // Externally-managed subarrays need the metadata-version guard
    // flipped so the monitor does not undo the change.
    if let Ok(Some(version)) = sysfs.metadata_version()
        && is_subarray(&version)
    {
        let rest = external_part(&version)
            .map(|r| &r[1..])
            .unwrap_or_default()
            .to_string();
        match mode {
            RwMode::ReadOnly => {
                sysfs.write_metadata_version(&format!("external:-{rest}"))?;
                if let Err(err) = sysfs.write_array_state("readonly") {
                    // Put the guard back before reporting failure.
                    let _ = sysfs.write_metadata_version(&version);
                    return Err(ManageError::action(
                        format!("failed to set readonly for {devname}"),
                        err,
                    ));
                }
            }
            RwMode::ReadWrite => {
                // Read-write cannot be set directly; signal the monitor.
                sysfs.write_metadata_version(&format!("external:/{rest}"))?;
                let container = rest.split('/').next().unwrap_or(&rest);
                monitor.ping_monitor(container);
                if sysfs.level().unwrap_or(None).is_none_or(|l| l.to_raw() <= 0) {
                    let _ = sysfs.write_array_state("active");
                }
            }
        }
        return Ok(());
    }

    kernel
        .array_info()
        .map_err(|_| ManageError::Config(format!("{devname} does not appear to be active")))?;

    match mode {
        RwMode::ReadOnly => kernel.set_readonly().map_err(|err| {
            ManageError::action(format!("failed to set readonly for {devname}"), err)
        }),
        RwMode::ReadWrite => kernel.set_readwrite().map_err(|err| {
            ManageError::action(format!("failed to set writable for {devname}"), err)
        }),
    }
}

/// Names at `alias` (plus partition suffixes) linking to the standard
/// node for `dev` were created when the array was assembled; drop the
/// stale ones after a stop.
fn remove_device_aliases(dev: DevId, alias: Option<&str>) {
    let Some(alias) = alias else { return };
    if dev.major != 9 {
        return;
    }
    let base = format!("/dev/md{}", dev.minor);

    for part in 0..16u32 {
        let target = partition_suffixed(&base, part, true);
        let link_path = partition_suffixed(alias, part, alias_uses_p_suffix(alias));
        if let Ok(existing) = fs::read_link(&link_path)
            && existing.as_os_str() == std::ffi::OsStr::new(&target)
        {
            let _ = fs::remove_file(&link_path);
        }
    }
}

fn alias_uses_p_suffix(alias: &str) -> bool {
    alias.chars().last().is_some_and(|c| c.is_ascii_digit())
}

fn partition_suffixed(name: &str, part: u32, with_p: bool) -> String {
    if part == 0 {
        name.to_string()
    } else if with_p {
        format!("{name}p{part}")
    } else {
        format!("{name}{part}")
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Attribute updates on a subarray, mediated by its container
//! metadata and, when one is running, the owning monitor.

use raid_sys::{MonitorGateway, Supertype};
use raid_types::SubarrayUpdate;
use tracing::info;

use crate::common::Verbosity;
use crate::error::{ManageError, Result};

pub fn update_subarray(
    st: &mut dyn Supertype,
    monitor: &dyn MonitorGateway,
    devname: &str,
    subarray: &str,
    update: &SubarrayUpdate,
    verbosity: Verbosity,
) -> Result<()> {
    if let Some(container) = st.container_dev()
        && monitor.running(container)
    {
        st.queue_updates();
    }

    st.update_subarray(subarray, update).map_err(|err| {
        ManageError::action(
            format!(
                "failed to update {} of subarray-{subarray} in {devname}",
                update.kind()
            ),
            err,
        )
    })?;

    if st.has_queued_updates() {
        st.flush_updates()?;
    } else {
        st.sync_metadata()?;
    }

    if matches!(update, SubarrayUpdate::Name(_)) && verbosity.announces() {
        info!("updated subarray-{subarray} name from {devname}, UUIDs may have changed");
    }
    Ok(())
}

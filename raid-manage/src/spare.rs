// SPDX-License-Identifier: GPL-3.0-only

//! Spare migration between two arrays: remove from one, add to the
//! other, and put it back where it came from if the add fails.

use raid_types::{DevId, DeviceSpec, Disposition};

use crate::common::Verbosity;
use crate::orchestrate::{ArraySession, BatchOptions, apply_device_list};

/// Move the spare `dev` from one array to another. Runs silent; the
/// caller decides what is worth reporting. Returns whether the spare
/// ended up in the target array.
pub fn move_spare(
    from: &mut ArraySession<'_>,
    to: &mut ArraySession<'_>,
    dev: DevId,
) -> bool {
    let quiet = BatchOptions {
        verbosity: Verbosity::Quiet,
        ..BatchOptions::default()
    };

    let removal = vec![DeviceSpec::for_dev(dev, Disposition::Remove)];
    if apply_device_list(from, removal, &quiet).is_err() {
        return false;
    }

    let addition = vec![DeviceSpec::for_dev(dev, Disposition::Add)];
    if apply_device_list(to, addition.clone(), &quiet).is_ok() {
        // Both managers should hear about the change.
        to.monitor.ping_manager(to.devname);
        from.monitor.ping_manager(from.devname);
        return true;
    }

    // The target would not take it; put it back.
    let _ = apply_device_list(from, addition, &quiet);
    false
}

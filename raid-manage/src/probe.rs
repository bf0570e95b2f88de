// SPDX-License-Identifier: GPL-3.0-only

//! Read-only queries of current array and member state. No mutation
//! happens here; everything is read fresh from the kernel each time,
//! since any membership change invalidates earlier answers.

use raid_sys::{ArrayKernel, DeviceAccess, NodeProbe};
use raid_types::{ArrayInfo, DiskFlag, DiskSlot, MAX_DISKS};

/// All occupied member slots, in slot order. The scan stops once the
/// kernel's member count is accounted for.
pub fn occupied_slots(kernel: &dyn ArrayKernel, array: &ArrayInfo) -> Vec<DiskSlot> {
    let mut remaining = array.nr_disks;
    let mut slots = Vec::new();
    let mut number = 0;

    while number < MAX_DISKS && remaining > 0 {
        if let Ok(slot) = kernel.disk_info(number)
            && !slot.is_empty()
        {
            remaining -= 1;
            slots.push(slot);
        }
        number += 1;
    }

    slots
}

/// Members currently marked faulty.
pub fn faulty_members(kernel: &dyn ArrayKernel, array: &ArrayInfo) -> Vec<DiskSlot> {
    occupied_slots(kernel, array)
        .into_iter()
        .filter(DiskSlot::is_faulty)
        .collect()
}

/// Members whose backing node is gone from the kernel — physically
/// detached disks. When collecting fault targets, members already
/// marked faulty are left alone.
pub fn detached_members(
    kernel: &dyn ArrayKernel,
    devices: &dyn DeviceAccess,
    array: &ArrayInfo,
    skip_faulty: bool,
) -> Vec<DiskSlot> {
    occupied_slots(kernel, array)
        .into_iter()
        .filter(|slot| !(skip_faulty && slot.is_faulty()))
        .filter(|slot| devices.probe_node(slot.dev) == NodeProbe::Gone)
        .collect()
}

/// Whether the array has lost enough members that adding a spare
/// could no longer help and a rebuild might destroy data.
pub fn array_failed(kernel: &dyn ArrayKernel, array: &ArrayInfo) -> bool {
    if array.active_disks >= array.raid_disks {
        return false;
    }

    let mut covered = vec![false; array.raid_disks.max(0) as usize];
    let mut found = 0;
    let mut number = 0;
    while number < MAX_DISKS && found < array.active_disks {
        if let Ok(slot) = kernel.disk_info(number)
            && !slot.is_empty()
        {
            if slot.in_sync()
                && slot.raid_disk >= 0
                && (slot.raid_disk as usize) < covered.len()
                && !covered[slot.raid_disk as usize]
            {
                covered[slot.raid_disk as usize] = true;
                found += 1;
            }
        }
        number += 1;
    }

    let avail = covered.iter().filter(|position| **position).count() as i32;
    !array.level.redundancy_met(array.raid_disks, avail)
}

/// Lowest free slot number at or above the configured disk count,
/// matching how old kernels allocate slots on their own.
pub fn next_spare_slot(kernel: &dyn ArrayKernel, array: &ArrayInfo, max_devs: i32) -> i32 {
    let mut number = array.raid_disks;
    while number < max_devs {
        match kernel.disk_info(number) {
            Err(_) => break,
            Ok(slot) if slot.is_empty() => break,
            Ok(slot) if slot.state.contains(DiskFlag::Removed) => break,
            Ok(_) => number += 1,
        }
    }
    number
}

/// First array position not covered by any current member; used when
/// re-adding to an array without persistent metadata.
pub fn free_position(kernel: &dyn ArrayKernel, array: &ArrayInfo, max_devs: i32) -> Option<i32> {
    if array.raid_disks <= 0 {
        return None;
    }

    let mut used = vec![false; array.raid_disks as usize];
    for number in 0..max_devs {
        if let Ok(slot) = kernel.disk_info(number)
            && !slot.is_empty()
            && !slot.state.contains(DiskFlag::Removed)
            && slot.raid_disk >= 0
            && (slot.raid_disk as usize) < used.len()
        {
            used[slot.raid_disk as usize] = true;
        }
    }

    used.iter().position(|taken| !taken).map(|p| p as i32)
}

// SPDX-License-Identifier: GPL-3.0-only

//! The metadata-format ("supertype") capability.
//!
//! Format codecs live in collaborating crates; the control plane only
//! drives this trait. A handle is bound to one array or container and
//! may or may not hold a loaded superblock image at any moment —
//! absence is a state, not an error.

use raid_types::{ArrayInfo, DevId, DiskSlot, MetaUpdate, SubarrayUpdate};
use uuid::Uuid;

use crate::error::Result;

pub trait Supertype {
    /// Format name for diagnostics.
    fn format_name(&self) -> &str;

    /// Whether a separate monitor process owns live metadata updates.
    fn is_external(&self) -> bool;

    /// Highest slot number this format can describe.
    fn max_devs(&self) -> i32;

    /// Is a superblock image currently loaded?
    fn has_super(&self) -> bool;

    fn load_super(&mut self, device: &str) -> Result<()>;

    fn store_super(&self, device: &str) -> Result<()>;

    fn free_super(&mut self);

    /// Load container-wide metadata for an externally-managed array.
    fn load_container(&mut self, container: DevId) -> Result<()>;

    /// The member entry recorded in the loaded superblock.
    fn recorded_disk(&self) -> Result<DiskSlot>;

    /// Array identity of the loaded superblock.
    fn uuid(&self) -> Result<Uuid>;

    /// Whether a candidate of this size works with the array geometry.
    fn fits_geometry(&self, array: &ArrayInfo, size_sectors: u64) -> bool;

    /// Usable sectors once format overhead is subtracted.
    fn avail_size(&self, size_sectors: u64) -> u64;

    /// Record a new member in the in-memory superblock image.
    fn add_to_super(&mut self, slot: &DiskSlot, device: &str) -> Result<()>;

    /// Write the initialised superblock out to the recorded members.
    fn write_init_super(&mut self) -> Result<()>;

    /// Apply a named update to the loaded superblock image.
    fn update_super(&mut self, update: &MetaUpdate, device: &str) -> Result<()>;

    fn sync_metadata(&mut self) -> Result<()>;

    /// Stage subsequent updates for the owning monitor instead of
    /// writing them directly.
    fn queue_updates(&mut self);

    fn has_queued_updates(&self) -> bool;

    fn flush_updates(&mut self) -> Result<()>;

    /// Independent second view of the same metadata.
    fn dup(&self) -> Box<dyn Supertype>;

    /// Device number of the owning container, for external formats.
    fn container_dev(&self) -> Option<DevId>;

    /// The subarray this handle was opened against, if any.
    fn subarray(&self) -> Option<&str>;

    fn update_subarray(&mut self, subarray: &str, update: &SubarrayUpdate) -> Result<()>;
}

// SPDX-License-Identifier: GPL-3.0-only

//! Membership control plane for md arrays
//!
//! Sits between a command surface and two lower layers: the kernel's
//! array control interface and the metadata ("supertype") capability,
//! both consumed through the traits in `raid-sys`. The entry points:
//!
//! - [`apply_device_list`] — add / re-add / remove / fault a batch of
//!   devices against one array
//! - [`run_array`] / [`stop_array`] — lifecycle transitions
//! - [`set_array_rw_mode`] — read-only / read-write toggle
//! - [`update_subarray`] — attribute update through container metadata
//! - [`move_spare`] — migrate a spare between two arrays
//!
//! Everything is synchronous and single-threaded; concurrency comes
//! from other processes racing on the same devices, handled with
//! exclusive opens and bounded busy-retries.

pub mod add;
pub mod common;
pub mod error;
pub mod lifecycle;
pub mod orchestrate;
pub mod probe;
pub mod remove;
pub mod resolve;
pub mod retry;
pub mod spare;
pub mod subarray;

pub use common::{Outcome, Verbosity};
pub use error::{ManageError, Result};
pub use lifecycle::{LifecycleCtx, RwMode, run_array, set_array_rw_mode, stop_array};
pub use orchestrate::{ArraySession, BatchOptions, apply_device_list};
pub use retry::{RetryBudget, retry_while_busy};
pub use spare::move_spare;
pub use subarray::update_subarray;

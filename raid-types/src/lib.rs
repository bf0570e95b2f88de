// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for md-array management
//!
//! This crate defines the types shared across the stack:
//!
//! - **raid-sys**: exchanges these types with the kernel and sysfs
//! - **raid-manage**: drives membership changes in terms of them
//!
//! Everything here is plain data. System access lives in `raid-sys`.

pub mod array;
pub mod dev;
pub mod disk;
pub mod request;

pub use array::*;
pub use dev::*;
pub use disk::*;
pub use request::*;

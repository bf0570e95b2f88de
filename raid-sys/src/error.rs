// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Error type for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{op} failed: {errno}")]
    Kernel { op: &'static str, errno: Errno },

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("not a block device: {0}")]
    NotBlockDevice(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl SysError {
    pub fn kernel(op: &'static str, errno: Errno) -> Self {
        SysError::Kernel { op, errno }
    }

    /// Capture `errno` right after a failed raw call.
    pub fn last_kernel(op: &'static str) -> Self {
        SysError::Kernel {
            op,
            errno: Errno::last(),
        }
    }

    pub fn errno(&self) -> Option<Errno> {
        match self {
            SysError::Kernel { errno, .. } => Some(*errno),
            SysError::Io(err) => err.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }

    /// Transiently-held resource; worth retrying within a bounded budget.
    pub fn is_busy(&self) -> bool {
        self.errno() == Some(Errno::EBUSY)
    }

    /// The device is gone from the kernel's view.
    pub fn is_gone(&self) -> bool {
        matches!(self.errno(), Some(Errno::ENXIO | Errno::ENODEV))
    }

    /// Kernel conditions that bulk re-add treats as skippable rather
    /// than fatal.
    pub fn maybe_transient(&self) -> bool {
        matches!(self.errno(), Some(Errno::ENOMEM | Errno::EROFS))
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;

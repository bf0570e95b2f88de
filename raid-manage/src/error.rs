// SPDX-License-Identifier: GPL-3.0-only

use raid_sys::SysError;
use thiserror::Error;

/// Error taxonomy for membership operations.
///
/// `Config` and `Unsupported` abort a whole batch before any mutation;
/// the rest are resolved per device, with [`crate::orchestrate`]
/// deciding whether a device failure ends the batch.
#[derive(Debug, Error)]
pub enum ManageError {
    /// Bad request; nothing was mutated.
    #[error("{0}")]
    Config(String),

    /// Metadata or driver version this tool cannot manage.
    #[error("{0}")]
    Unsupported(String),

    /// Exclusive access could not be obtained.
    #[error("{0}")]
    Busy(String),

    /// Candidate size incompatible with the array geometry.
    #[error("{candidate} is larger than {array} can effectively use")]
    TooLarge { candidate: String, array: String },

    #[error("{0} not large enough to join array")]
    TooSmall(String),

    /// Refused: proceeding could destroy data.
    #[error("{0}")]
    Hazard(String),

    #[error("cannot load array metadata from {0}")]
    NoMetadata(String),

    /// An explicit re-add could not be honoured.
    #[error("{0}")]
    NotPossible(String),

    #[error("cannot find {device}: {source}")]
    Access { device: String, source: SysError },

    #[error("{device} is not a block device")]
    NotBlock { device: String },

    /// A kernel or sysfs action failed.
    #[error("{what}: {source}")]
    Action { what: String, source: SysError },

    #[error(transparent)]
    Sys(#[from] SysError),
}

impl ManageError {
    pub(crate) fn action(what: impl Into<String>, source: SysError) -> Self {
        ManageError::Action {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManageError>;

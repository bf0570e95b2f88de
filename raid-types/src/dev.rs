// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kernel device number, printed and parsed as `major:minor`.
///
/// `0:0` marks an empty array slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevId {
    pub major: u32,
    pub minor: u32,
}

impl DevId {
    pub const EMPTY: DevId = DevId { major: 0, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        DevId { major, minor }
    }

    pub fn is_empty(&self) -> bool {
        self.major == 0 && self.minor == 0
    }

    /// Pack into the `dev_t` layout used by the kernel interface.
    pub fn to_raw(self) -> u64 {
        ((u64::from(self.major) & 0xfff) << 8)
            | (u64::from(self.minor) & 0xff)
            | ((u64::from(self.major) & !0xfffu64) << 32)
            | ((u64::from(self.minor) & !0xffu64) << 12)
    }

    pub fn from_raw(raw: u64) -> Self {
        DevId {
            major: (((raw >> 8) & 0xfff) | ((raw >> 32) & !0xfffu64)) as u32,
            minor: ((raw & 0xff) | ((raw >> 12) & !0xffu64)) as u32,
        }
    }
}

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for DevId {
    type Err = ParseDevIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (major, minor) = value
            .split_once(':')
            .ok_or_else(|| ParseDevIdError(value.to_string()))?;

        let major = major
            .parse()
            .map_err(|_| ParseDevIdError(value.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| ParseDevIdError(value.to_string()))?;

        Ok(DevId { major, minor })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDevIdError(pub String);

impl fmt::Display for ParseDevIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a major:minor device number: {}", self.0)
    }
}

impl std::error::Error for ParseDevIdError {}

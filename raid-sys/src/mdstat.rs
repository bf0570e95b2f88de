// SPDX-License-Identifier: GPL-3.0-only

//! Enumeration of active arrays from `/proc/mdstat`.

use std::fs;

use crate::error::Result;
use crate::sysfs::MdSysfs;
use crate::SysfsApi;

/// One active array and the metadata version sysfs reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveArray {
    pub name: String,
    pub metadata_version: Option<String>,
}

/// Lists currently-active arrays; the container stop path uses this to
/// refuse stopping a container with live members.
pub trait ArrayEnumerator {
    fn active_arrays(&self) -> Result<Vec<ActiveArray>>;
}

/// Array names from `/proc/mdstat`, in file order.
pub fn parse_mdstat_names(input: &str) -> Vec<String> {
    input
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("Personalities") || line.starts_with("unused") {
                return None;
            }
            let (name, rest) = line.split_once(':')?;
            let name = name.trim();
            if !name.starts_with("md") || !rest.trim_start().starts_with("active") {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}

/// Production [`ArrayEnumerator`] joining `/proc/mdstat` with each
/// array's sysfs metadata version.
pub struct MdstatScan;

impl ArrayEnumerator for MdstatScan {
    fn active_arrays(&self) -> Result<Vec<ActiveArray>> {
        let mdstat = fs::read_to_string("/proc/mdstat").unwrap_or_default();
        Ok(parse_mdstat_names(&mdstat)
            .into_iter()
            .map(|name| {
                let metadata_version = MdSysfs::with_name(&name)
                    .metadata_version()
                    .unwrap_or(None);
                ActiveArray {
                    name,
                    metadata_version,
                }
            })
            .collect())
    }
}

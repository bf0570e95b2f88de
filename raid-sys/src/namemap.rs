// SPDX-License-Identifier: GPL-3.0-only

//! Persistent device-number → (identity, path) map shared with other
//! invocations of this tool. Every mutation takes an exclusive file
//! lock for just that one operation.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;

use nix::fcntl::{Flock, FlockArg};
use raid_types::DevId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMapEntry {
    pub dev: DevId,
    pub uuid: Uuid,
    pub path: String,
}

pub trait NameMap {
    fn lookup_path(&self, dev: DevId) -> Result<Option<String>>;
    fn insert(&mut self, entry: NameMapEntry) -> Result<()>;
    fn remove(&mut self, dev: DevId) -> Result<()>;
}

/// JSON-line records, one entry per line.
pub struct NameMapFile {
    path: PathBuf,
}

impl NameMapFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        NameMapFile { path: path.into() }
    }

    pub fn system_default() -> Self {
        NameMapFile::new("/run/raid/map")
    }

    fn lock(&self) -> Result<Flock<File>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| SysError::kernel("flock", errno))
    }

    fn read_entries(file: &mut File) -> Result<Vec<NameMapEntry>> {
        file.seek(SeekFrom::Start(0))?;
        let mut entries = Vec::new();
        for line in BufReader::new(&mut *file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                // A torn write from a crashed invocation loses one
                // record, not the map.
                Err(_) => continue,
            }
        }
        Ok(entries)
    }

    fn write_entries(file: &mut File, entries: &[NameMapEntry]) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|err| SysError::OperationFailed(format!("map encode: {err}")))?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(())
    }
}

impl NameMap for NameMapFile {
    fn lookup_path(&self, dev: DevId) -> Result<Option<String>> {
        let mut locked = self.lock()?;
        let entries = Self::read_entries(&mut locked)?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.dev == dev)
            .map(|entry| entry.path))
    }

    fn insert(&mut self, entry: NameMapEntry) -> Result<()> {
        let mut locked = self.lock()?;
        let mut entries = Self::read_entries(&mut locked)?;
        entries.retain(|existing| existing.dev != entry.dev);
        entries.push(entry);
        Self::write_entries(&mut locked, &entries)
    }

    fn remove(&mut self, dev: DevId) -> Result<()> {
        let mut locked = self.lock()?;
        let mut entries = Self::read_entries(&mut locked)?;
        entries.retain(|entry| entry.dev != dev);
        Self::write_entries(&mut locked, &entries)
    }
}

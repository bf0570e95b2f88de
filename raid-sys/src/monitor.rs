// SPDX-License-Identifier: GPL-3.0-only

//! Fire-and-forget notification channel to the external metadata
//! monitor. The monitor converges eventually; delivery failures are
//! logged and never affect control flow.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use raid_types::DevId;
use tracing::debug;

use crate::sysfs::md_name;

pub trait MonitorGateway {
    /// Is a monitor currently managing this container?
    fn running(&self, container: DevId) -> bool;

    /// Nudge the monitor thread for a container by name.
    fn ping_monitor(&self, container: &str);

    /// Same, resolving the container from its device number.
    fn ping_monitor_by_id(&self, dev: DevId);

    /// Nudge the manager thread, used after membership changes so the
    /// monitor reconciles a remove before it can observe a later add.
    fn ping_manager(&self, devname: &str);
}

/// Production gateway talking to the monitor's socket directory.
pub struct MdmonClient {
    run_dir: PathBuf,
}

impl Default for MdmonClient {
    fn default() -> Self {
        MdmonClient {
            run_dir: PathBuf::from("/run/mdadm"),
        }
    }
}

impl MdmonClient {
    pub fn with_run_dir(run_dir: impl Into<PathBuf>) -> Self {
        MdmonClient {
            run_dir: run_dir.into(),
        }
    }

    fn send(&self, container: &str, line: &str) {
        let container = container.trim_start_matches("/dev/");
        let socket = self.run_dir.join(format!("{container}.sock"));
        match UnixStream::connect(&socket) {
            Ok(mut stream) => {
                if let Err(err) = stream.write_all(line.as_bytes()) {
                    debug!("monitor nudge to {} failed: {err}", socket.display());
                }
            }
            Err(err) => debug!("no monitor at {}: {err}", socket.display()),
        }
    }
}

impl MonitorGateway for MdmonClient {
    fn running(&self, container: DevId) -> bool {
        match md_name(container) {
            Some(name) => self.run_dir.join(format!("{name}.pid")).exists(),
            None => false,
        }
    }

    fn ping_monitor(&self, container: &str) {
        self.send(container, "ping\n");
    }

    fn ping_monitor_by_id(&self, dev: DevId) {
        if let Some(name) = md_name(dev) {
            self.ping_monitor(&name);
        } else {
            debug!("no array name for {dev}, monitor not pinged");
        }
    }

    fn ping_manager(&self, devname: &str) {
        self.send(devname, "manage\n");
    }
}

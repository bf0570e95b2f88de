// SPDX-License-Identifier: GPL-3.0-only

use std::thread;
use std::time::Duration;

/// Bounded budget for waiting out a transiently-busy resource.
///
/// The default is 25 attempts 200ms apart, about five seconds in
/// total. With an exclusive open already held, anything still
/// blocking the operation is probably a transient user, so a short
/// wait is reasonable; anything longer is a real holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub quantum: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        RetryBudget {
            attempts: 25,
            quantum: Duration::from_millis(200),
        }
    }
}

/// Run `op` until it succeeds, fails with something other than a busy
/// condition, or the budget runs out. Only busy conditions are
/// retried; the final error is returned as-is.
pub fn retry_while_busy<T>(
    budget: &RetryBudget,
    mut op: impl FnMut() -> raid_sys::Result<T>,
) -> raid_sys::Result<T> {
    let mut remaining = budget.attempts.max(1);
    loop {
        match op() {
            Err(err) if err.is_busy() && remaining > 1 => {
                remaining -= 1;
                thread::sleep(budget.quantum);
            }
            other => return other,
        }
    }
}

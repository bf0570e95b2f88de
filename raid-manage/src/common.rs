// SPDX-License-Identifier: GPL-3.0-only

/// How chatty an operation should be. Automated callers run `Quiet`
/// without changing control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Announce consequential state changes?
    pub fn announces(self) -> bool {
        self != Verbosity::Quiet
    }

    pub fn chatty(self) -> bool {
        self == Verbosity::Verbose
    }

    /// Demote `Normal` to `Quiet` for callers that intend to retry.
    pub fn quieter(self) -> Self {
        match self {
            Verbosity::Normal => Verbosity::Quiet,
            other => other,
        }
    }
}

/// What an entry point did, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Number of successful device actions.
    Changed(usize),
    /// Nothing needed doing.
    NoChange,
}

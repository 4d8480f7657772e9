// Engine Configuration

use super::sweeper::constants::{DEFAULT_IN_FLIGHT_RELEASE, DEFAULT_LEDGER_RETENTION};
use crate::domain::LeavePolicy;
use std::time::Duration;

/// Tunables the composition root passes into the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pointer handling when a member ahead of it leaves
    pub leave_policy: LeavePolicy,
    /// How long a sweep keeps a queue id in its in-flight set after an attempt
    pub in_flight_release: Duration,
    /// How long observer entries of an ended queue are kept for a final poll
    pub ledger_retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            leave_policy: LeavePolicy::default(),
            in_flight_release: DEFAULT_IN_FLIGHT_RELEASE,
            ledger_retention: DEFAULT_LEDGER_RETENTION,
        }
    }
}

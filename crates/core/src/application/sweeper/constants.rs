// Sweep constants (no magic values)
use std::time::Duration;

/// Tick period of the advance and break sweeps (1s)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long a queue id stays in a sweep's in-flight set after an attempt (300ms)
pub const DEFAULT_IN_FLIGHT_RELEASE: Duration = Duration::from_millis(300);

/// Upper bound the daemon waits for sweeps to stop on shutdown (5s)
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long observer entries of an ended queue stay pollable (1h)
pub const DEFAULT_LEDGER_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Tick period of the ledger purge (60s)
pub const DEFAULT_LEDGER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

// Rolling Average Service Time

use serde::{Deserialize, Serialize};

/// Seed value used until the first real sample lands (3 minutes)
pub const DEFAULT_AVG_SERVE_MS: i64 = 180_000;

/// Samples at or beyond this window are treated as outliers (4 hours)
pub const MAX_SAMPLE_MS: i64 = 4 * 60 * 60 * 1000;

/// Lower clamp for the per-position ETA unit (5 seconds)
pub const MIN_ETA_UNIT_MS: i64 = 5_000;

/// Upper clamp for the per-position ETA unit (60 minutes)
pub const MAX_ETA_UNIT_MS: i64 = 60 * 60 * 1000;

/// Incremental mean of the time between successful advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEstimate {
    pub avg_serve_ms: i64,
    pub samples: i64,
}

impl Default for ServiceEstimate {
    fn default() -> Self {
        Self {
            avg_serve_ms: DEFAULT_AVG_SERVE_MS,
            samples: 0,
        }
    }
}

impl ServiceEstimate {
    /// Fold one inter-advance duration into the mean.
    ///
    /// Returns false (state untouched) when there is no prior timestamp or
    /// the sample falls outside `(0, MAX_SAMPLE_MS)`.
    pub fn record(&mut self, elapsed_ms: Option<i64>) -> bool {
        let Some(elapsed) = elapsed_ms else {
            return false;
        };
        if elapsed <= 0 || elapsed >= MAX_SAMPLE_MS {
            return false;
        }

        let n = self.samples + 1;
        let total = self.avg_serve_ms * self.samples + elapsed;
        // round half up; all operands are positive
        self.avg_serve_ms = (total + n / 2) / n;
        self.samples = n;
        true
    }

    /// `samples == 0` means the average is still the seed, not a measurement
    pub fn is_estimated(&self) -> bool {
        self.samples > 0
    }

    /// Per-position wait used for ETA display
    pub fn eta_unit_ms(&self) -> i64 {
        self.avg_serve_ms.clamp(MIN_ETA_UNIT_MS, MAX_ETA_UNIT_MS)
    }
}

//! Rest-state baseline estimation
//!
//! For the first stretch of a session the wearer lies still and the engine
//! accumulates filtered samples into a plain running average. The result is
//! the stable level every later tolerance band hangs off.
//!
//! Time-bounding is the phase controller's job: it stops feeding the
//! estimator when the calibration window elapses. That makes the average
//! robust to acquisition gaps; a thin window simply averages fewer points
//! instead of inventing zeros.

use crate::error::{EngineError, EngineResult};

/// Running average of filtered samples seen during calibration
#[derive(Debug, Clone, Default)]
pub struct CalibrationEstimator {
    total: f64,
    count: u64,
}

impl CalibrationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one filtered sample into the average.
    pub fn accumulate(&mut self, filtered: f64) {
        self.total += filtered;
        self.count += 1;
    }

    /// Baseline over everything accumulated so far.
    ///
    /// Fails with [`EngineError::NotYetCalibrated`] if the window closed
    /// without a single sample, which means acquisition was dead for the
    /// whole calibration period.
    pub fn average(&self) -> EngineResult<f64> {
        if self.count == 0 {
            return Err(EngineError::NotYetCalibrated);
        }
        Ok(self.total / self.count as f64)
    }

    pub fn sample_count(&self) -> u64 {
        self.count
    }
}

//! Engine error types
//!
//! Faults are split by how the session reacts to them:
//! - recoverable faults (sensor hiccups, garbled lines, a failed recording
//!   cycle) are logged and the session continues
//! - fatal faults (acquisition stalled past its bound, I/O loss on the
//!   session record) abort the session after the log is flushed

use std::io;
use thiserror::Error;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Faults raised by the signal path and session machinery
#[derive(Error, Debug)]
pub enum EngineError {
    /// Sensor read fault (device gone, permission lost, garbled stream)
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// No fresh reading arrived within the configured staleness bound
    #[error("acquisition stalled: no fresh sample for {stale_for_s:.1}s (bound {max_gap_s:.1}s)")]
    AcquisitionStalled { stale_for_s: f64, max_gap_s: f64 },

    /// A sample carried a timestamp at or before the previous one
    #[error("time went backwards: t={t:.6}s after t_prev={t_prev:.6}s")]
    TimeOrdering { t: f64, t_prev: f64 },

    /// Baseline requested before any calibration sample was accumulated
    #[error("calibration average requested with no samples accumulated")]
    NotYetCalibrated,

    /// The recording collaborator reported a broken cycle
    #[error("recording cycle {cycle} failed: {reason}")]
    RecordingFailure { cycle: u32, reason: String },

    /// I/O fault at the source or session-record boundary
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// True for faults the session absorbs without terminating: the affected
    /// tick or cycle is skipped and the loop carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Acquisition(_)
                | EngineError::TimeOrdering { .. }
                | EngineError::RecordingFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_ordering_message_carries_both_timestamps() {
        let err = EngineError::TimeOrdering {
            t: 1.5,
            t_prev: 2.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("1.500000"), "message was: {}", msg);
        assert!(msg.contains("2.000000"), "message was: {}", msg);
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(EngineError::Acquisition("unplugged".into()).is_recoverable());
        assert!(EngineError::TimeOrdering { t: 0.0, t_prev: 1.0 }.is_recoverable());
        assert!(EngineError::RecordingFailure {
            cycle: 1,
            reason: "no audio device".into()
        }
        .is_recoverable());

        assert!(!EngineError::NotYetCalibrated.is_recoverable());
        assert!(!EngineError::AcquisitionStalled {
            stale_for_s: 5.0,
            max_gap_s: 2.0
        }
        .is_recoverable());
        let io = EngineError::Io(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(!io.is_recoverable());
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> EngineResult<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}

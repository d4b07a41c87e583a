use crate::phase::Phase;
use serde::{Deserialize, Serialize};

/// Session status snapshot shared with the presentation side
///
/// This struct carries everything an observer process needs to:
/// - show where the session is in its lifecycle
/// - plot the signal level against the detection bands
/// - display cycle progress without touching engine state
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionStatus {
    /// Current lifecycle phase
    pub phase: Phase,

    /// Completed recording cycles
    pub cycle: u32,

    /// Cycle budget for this session
    pub max_cycles: u32,

    /// Accepted baseline level (0.0 until calibration completes)
    pub stable_level: f64,

    /// Most recent raw reading
    pub last_raw: f64,

    /// Most recent filtered value
    pub last_filtered: f64,

    /// Trailing 1-second window average the detector judges
    pub window_avg: f64,

    /// True while an excursion above the tolerance band is in progress
    pub changing: bool,

    /// Candidate level of the in-progress excursion (0.0 otherwise)
    pub candidate_level: f64,

    /// Detections fired so far
    pub detections: u32,

    /// Raw samples processed so far
    pub samples_seen: u64,

    /// Unix timestamp of last status update
    pub updated_ts: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus {
            phase: Phase::Calibration,
            cycle: 0,
            max_cycles: 0,
            stable_level: 0.0,
            last_raw: 0.0,
            last_filtered: 0.0,
            window_avg: 0.0,
            changing: false,
            candidate_level: 0.0,
            detections: 0,
            samples_seen: 0,
            updated_ts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_default() {
        let status = SessionStatus::default();
        assert_eq!(status.phase, Phase::Calibration);
        assert_eq!(status.cycle, 0);
        assert_eq!(status.stable_level, 0.0);
        assert!(!status.changing);
    }

    #[test]
    fn test_session_status_serde_roundtrip() {
        let mut status = SessionStatus::default();
        status.phase = Phase::Running;
        status.stable_level = 1.042;
        status.cycle = 2;
        status.changing = true;
        status.candidate_level = 1.21;

        let json = serde_json::to_string(&status).expect("serialize failed");
        let restored: SessionStatus = serde_json::from_str(&json).expect("deserialize failed");

        assert_eq!(restored.phase, Phase::Running);
        assert!((restored.stable_level - 1.042).abs() < f64::EPSILON);
        assert_eq!(restored.cycle, 2);
        assert!(restored.changing);
        assert!((restored.candidate_level - 1.21).abs() < f64::EPSILON);
    }
}

//! Session lifecycle phases
//!
//! A session moves through a fixed lifecycle: Calibration establishes the
//! rest baseline, Running watches for a durable grip change, and each
//! detection walks Detected -> Prompting -> Recording before returning to
//! Running. When the cycle budget is spent the session parks in Finished.
//!
//! Phase markers are written into the session record using stable string
//! tokens so that old logs replay against newer builds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a session. Exactly one phase is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Accumulating the rest-state baseline
    Calibration,
    /// Detector armed, watching for a durable state change
    Running,
    /// Durable change found, collaborator hand-off in progress
    Detected,
    /// Collaborator is playing the scripted prompts
    Prompting,
    /// Collaborator is capturing the subject's response
    Recording,
    /// Cycle budget spent, no further evaluation
    Finished,
}

impl Phase {
    /// True while a recording cycle owns the session and the detector is
    /// frozen.
    pub fn in_cycle(self) -> bool {
        matches!(self, Phase::Detected | Phase::Prompting | Phase::Recording)
    }

    /// Token written into the session record. Replay depends on these never
    /// changing.
    pub fn token(self) -> &'static str {
        match self {
            Phase::Calibration => "Phases.CALIBRATION",
            Phase::Running => "Phases.RUNNING",
            Phase::Detected => "Phases.DETECTED",
            Phase::Prompting => "Phases.PROMPTING",
            Phase::Recording => "Phases.RECORDING",
            Phase::Finished => "Phases.FINISHED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_stable() {
        // Existing session logs contain these exact strings
        assert_eq!(Phase::Calibration.token(), "Phases.CALIBRATION");
        assert_eq!(Phase::Running.token(), "Phases.RUNNING");
        assert_eq!(Phase::Detected.token(), "Phases.DETECTED");
        assert_eq!(Phase::Prompting.token(), "Phases.PROMPTING");
        assert_eq!(Phase::Recording.token(), "Phases.RECORDING");
        assert_eq!(Phase::Finished.token(), "Phases.FINISHED");
    }

    #[test]
    fn test_display_matches_token() {
        assert_eq!(format!("{}", Phase::Running), "Phases.RUNNING");
        assert_eq!(Phase::Detected.to_string(), Phase::Detected.token());
    }

    #[test]
    fn test_in_cycle_freezes_detector_phases_only() {
        assert!(Phase::Detected.in_cycle());
        assert!(Phase::Prompting.in_cycle());
        assert!(Phase::Recording.in_cycle());

        assert!(!Phase::Calibration.in_cycle());
        assert!(!Phase::Running.in_cycle());
        assert!(!Phase::Finished.in_cycle());
    }

    #[test]
    fn test_phase_serde_round_trip() {
        let json = serde_json::to_string(&Phase::Prompting).unwrap();
        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Phase::Prompting);
    }
}

//! Durable state-change detection
//!
//! ## The Problem
//! An absolute voltage threshold misfires constantly on this hardware:
//! - the rest baseline differs per wearer and per fitting
//! - the sensor repeats the same force only to within a few percent
//! - a momentary twitch crosses any fixed line without meaning anything
//!
//! ## The Solution
//! Everything is judged relative to a tracked reference level with a
//! percentage tolerance band, and a new level only counts once it has
//! *stopped climbing* and held for a dwell window. The band half-width sums
//! two separately tunable budgets (sensor repeatability and the intended
//! state-change magnitude) so each can be recalibrated from hardware
//! characterization without touching the algorithm.
//!
//! ## Algorithm (per tick, on the 1-second window average `avg`)
//! 1. Inside a grace window: skip entirely
//! 2. Not changing: `avg >= stable_level * (1 + delta)` opens an excursion
//! 3. Changing, `avg >= candidate_level * (1 + delta)`: still rising, the
//!    candidate moves up and the dwell timer restarts
//! 4. Changing, `avg <= candidate_level * (1 - delta)`: fell out of the
//!    candidate band, the excursion is abandoned
//! 5. Changing, inside the band: plateau; fire once the dwell time is spent
//!
//! Falls are judged against the candidate band, never against the stable
//! band, so a level that sags part-way keeps dwelling while a collapse all
//! the way down abandons cleanly.

use crate::config::DetectorConfig;
use log::debug;

/// Reference levels tracked across ticks
#[derive(Debug, Clone)]
pub struct ReferenceState {
    /// Accepted baseline for the current cycle
    pub stable_level: f64,
    /// True while an excursion above the tolerance band is in progress
    pub changing: bool,
    /// Level of the in-progress excursion; meaningful only while `changing`
    pub candidate_level: f64,
    /// Time the candidate last rose; meaningful only while `changing`
    pub candidate_since: f64,
    /// Evaluation suppressed until this time, when set
    pub grace_until: Option<f64>,
}

impl ReferenceState {
    fn at_rest(stable_level: f64) -> Self {
        ReferenceState {
            stable_level,
            changing: false,
            candidate_level: 0.0,
            candidate_since: 0.0,
            grace_until: None,
        }
    }
}

/// Outcome of one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Grace window active, nothing evaluated
    Graced,
    /// Within tolerance of the stable level
    Idle,
    /// Excursion opened or extended; the dwell timer (re)started
    Rising { candidate: f64 },
    /// Plateau holding inside the candidate band
    Dwelling { candidate: f64, held_s: f64 },
    /// Fell out of the candidate band before the dwell completed
    Abandoned { candidate: f64 },
    /// The candidate held for the full dwell window: durable change
    Detected { level: f64 },
}

/// Hysteresis state machine over [`ReferenceState`]
///
/// Must only be evaluated while the session is in `Running`; during a
/// recording cycle the phase controller stops calling it, which is what
/// guarantees at most one detection per cycle.
#[derive(Debug)]
pub struct TriggerDetector {
    /// Tolerance band half-width as a fraction of the level under test
    delta_pct: f64,
    dwell_s: f64,
    grace_s: f64,
    reference: ReferenceState,
}

impl TriggerDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        TriggerDetector {
            delta_pct: config.delta_pct(),
            dwell_s: config.dwell_s,
            grace_s: config.grace_s,
            reference: ReferenceState::at_rest(0.0),
        }
    }

    /// Arm with the calibration baseline. No grace window: detection is live
    /// immediately.
    pub fn arm(&mut self, stable_level: f64) {
        debug!("[Trigger] armed at stable level {:.4}", stable_level);
        self.reference = ReferenceState::at_rest(stable_level);
    }

    /// Cycle-end reset: restore the calibration baseline, drop any candidate
    /// and suppress evaluation for the grace window.
    pub fn rearm(&mut self, baseline: f64, now: f64) {
        let grace_until = now + self.grace_s;
        debug!(
            "[Trigger] rearmed at {:.4}, grace until t={:.1}s",
            baseline, grace_until
        );
        self.reference = ReferenceState::at_rest(baseline);
        self.reference.grace_until = Some(grace_until);
    }

    /// Evaluate one window average taken at time `t`.
    pub fn evaluate(&mut self, avg: f64, t: f64) -> Evaluation {
        if let Some(grace_until) = self.reference.grace_until {
            if t < grace_until {
                debug!(
                    "[Trigger] graced: {:.1}s of suppression left",
                    grace_until - t
                );
                return Evaluation::Graced;
            }
            debug!("[Trigger] grace window over at t={:.1}s", t);
            self.reference.grace_until = None;
        }

        if !self.reference.changing {
            let upper_bound = self.reference.stable_level * (1.0 + self.delta_pct);
            if avg >= upper_bound {
                self.reference.changing = true;
                self.reference.candidate_level = avg;
                self.reference.candidate_since = t;
                debug!(
                    "[Trigger] excursion opened: avg={:.4} above bound {:.4}",
                    avg, upper_bound
                );
                return Evaluation::Rising { candidate: avg };
            }
            return Evaluation::Idle;
        }

        let candidate = self.reference.candidate_level;
        let candidate_upper = candidate * (1.0 + self.delta_pct);
        let candidate_lower = candidate * (1.0 - self.delta_pct);

        if avg >= candidate_upper {
            // Still climbing: only a level that stops rising can stabilize
            self.reference.candidate_level = avg;
            self.reference.candidate_since = t;
            debug!(
                "[Trigger] candidate raised to {:.4}, dwell restarted at t={:.1}s",
                avg, t
            );
            return Evaluation::Rising { candidate: avg };
        }

        if avg <= candidate_lower {
            self.reference.changing = false;
            self.reference.candidate_level = 0.0;
            self.reference.candidate_since = 0.0;
            debug!(
                "[Trigger] candidate {:.4} abandoned: avg fell to {:.4}",
                candidate, avg
            );
            return Evaluation::Abandoned { candidate };
        }

        let held_s = t - self.reference.candidate_since;
        if held_s >= self.dwell_s {
            debug!(
                "[Trigger] candidate {:.4} held {:.1}s: durable",
                candidate, held_s
            );
            return Evaluation::Detected { level: candidate };
        }
        Evaluation::Dwelling {
            candidate,
            held_s,
        }
    }

    pub fn reference(&self) -> &ReferenceState {
        &self.reference
    }

    /// True while evaluation is suppressed at time `t`.
    pub fn in_grace(&self, t: f64) -> bool {
        matches!(self.reference.grace_until, Some(until) if t < until)
    }
}

// ============================================================================
// TESTS
// ============================================================================

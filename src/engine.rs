//! Detection engine - core state machine for a glove session
//!
//! This engine ties the whole signal path together, one tick at a time:
//! 1. **Calibration phase**: average the filtered rest signal into a baseline
//! 2. **Running phase**: adaptive filter -> 1 s window average -> hysteresis
//!    trigger detection against the baseline
//! 3. **Recording cycles**: on detection, hand the session to the recording
//!    collaborator and freeze the detector until it reports back
//!
//! Key properties:
//! - single-writer: every piece of state here is touched only by the control
//!   loop thread, so there is no locking anywhere in the engine
//! - at most one detection per cycle; the detector is simply not evaluated
//!   while a cycle owns the session
//! - every raw sample is recorded before filtering touches it, so a session
//!   log replays bit-exactly through different tuning

use log::{debug, info, warn};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::calibration::CalibrationEstimator;
use crate::config::EngineConfig;
use crate::detector::{Evaluation, TriggerDetector};
use crate::error::EngineResult;
use crate::filter::{AdaptiveFilter, WindowAverage};
use crate::phase::Phase;
use crate::recorder::{CycleEvent, CycleHandle};
use crate::samplelog::SampleLog;
use crate::status::SessionStatus;
use crate::traits::Recorder;

// ============================================================================
// CYCLE COUNTER
// ============================================================================

/// Completed-cycle accounting. The session is over once `current == max`.
#[derive(Debug, Clone, Copy)]
pub struct CycleCounter {
    current: u32,
    max: u32,
}

impl CycleCounter {
    pub fn new(max: u32) -> Self {
        CycleCounter { current: 0, max }
    }

    /// Consume one cycle. Saturates at the budget; a completion signal can
    /// never push the counter past `max`.
    pub fn complete_one(&mut self) {
        self.current = (self.current + 1).min(self.max);
    }

    pub fn exhausted(&self) -> bool {
        self.current >= self.max
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// What one tick did, for the session loop and for tests
#[derive(Debug)]
pub struct TickReport {
    pub phase: Phase,
    /// Present only on ticks where the detector actually evaluated
    pub evaluation: Option<Evaluation>,
}

/// Session detection engine, generic over the recording collaborator
pub struct Engine<R: Recorder> {
    config: EngineConfig,
    recorder: R,

    // Signal path
    filter: AdaptiveFilter,
    window: WindowAverage,
    calibration: CalibrationEstimator,
    detector: TriggerDetector,

    // Lifecycle
    phase: Phase,
    cycles: CycleCounter,
    /// Calibration result; meaningful once the phase has left Calibration
    baseline: f64,
    /// Handle onto the in-flight recording cycle, if one owns the session
    active_cycle: Option<CycleHandle>,

    // Session record
    log: SampleLog,

    // Metrics for status display
    last_raw: f64,
    last_filtered: f64,
    last_avg: f64,
    detections: u32,
    samples_seen: u64,

    // Shared snapshot for the presentation side
    status_shared: Arc<RwLock<SessionStatus>>,
}

impl<R: Recorder> Engine<R> {
    pub fn new(
        recorder: R,
        status_shared: Arc<RwLock<SessionStatus>>,
        config: EngineConfig,
    ) -> Self {
        info!("=== Detection Engine Initialization ===");
        info!(
            "Sampling: {} Hz nominal, window 1s ({} samples)",
            config.sampling_rate_hz,
            (config.sampling_rate_hz).round() as usize
        );
        info!(
            "Filter: min_cutoff={} Hz, beta={}, derivative_cutoff={} Hz",
            config.filter.min_cutoff, config.filter.beta, config.filter.derivative_cutoff
        );
        info!(
            "Detector: band ±{:.1}%, dwell {}s, grace {}s",
            config.detector.delta_pct() * 100.0,
            config.detector.dwell_s,
            config.detector.grace_s
        );
        info!(
            "Protocol: calibration {}s, {} recording cycles",
            config.calibration.duration_s, config.cycles.max
        );
        info!("=== Ready ===");

        let filter = AdaptiveFilter::from_config(&config.filter);
        let window = WindowAverage::spanning(1.0, config.sampling_rate_hz);
        let detector = TriggerDetector::new(&config.detector);
        let cycles = CycleCounter::new(config.cycles.max);

        if let Ok(mut status) = status_shared.write() {
            status.max_cycles = cycles.max();
        }

        Engine {
            config,
            recorder,
            filter,
            window,
            calibration: CalibrationEstimator::new(),
            detector,
            phase: Phase::Calibration,
            cycles,
            baseline: 0.0,
            active_cycle: None,
            log: SampleLog::new(),
            last_raw: 0.0,
            last_filtered: 0.0,
            last_avg: 0.0,
            detections: 0,
            samples_seen: 0,
            status_shared,
        }
    }

    /// Replace the session record, e.g. with one carrying a live tap.
    pub fn with_log(mut self, log: SampleLog) -> Self {
        self.log = log;
        self
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cycles(&self) -> &CycleCounter {
        &self.cycles
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    pub fn get_status_shared(&self) -> Arc<RwLock<SessionStatus>> {
        self.status_shared.clone()
    }

    /// One-line progress summary for the program log.
    pub fn log_status(&self) {
        info!(
            "[Session] {} cycle={}/{} raw={:.4} avg={:.4} stable={:.4} changing={} samples={}",
            self.phase,
            self.cycles.current(),
            self.cycles.max(),
            self.last_raw,
            self.last_avg,
            self.detector.reference().stable_level,
            self.detector.reference().changing,
            self.samples_seen
        );
    }

    /// Advance the session by one tick.
    ///
    /// `raw` is the latest published reading (the same value is passed again
    /// on ticks where no fresh one arrived); `None` means nothing has ever
    /// been read. `t` is seconds since session start and must be strictly
    /// increasing across ticks that carry a sample.
    pub fn tick(&mut self, raw: Option<f64>, t: f64) -> EngineResult<TickReport> {
        if self.phase == Phase::Finished {
            return Ok(self.report(None));
        }

        // Collaborator progress first, so a finished cycle frees the
        // detector before this tick's sample is judged
        self.drain_cycle_events(t);
        if self.phase == Phase::Finished {
            self.update_shared_status();
            return Ok(self.report(None));
        }

        // Calibration window is time-bounded, checked even on gap ticks
        if self.phase == Phase::Calibration && t >= self.config.calibration.duration_s {
            self.finish_calibration()?;
        }

        let Some(raw) = raw else {
            debug!("[Session] tick without any reading yet (t={:.2}s)", t);
            self.update_shared_status();
            return Ok(self.report(None));
        };

        // Raw first: the record must replay exactly what was acquired
        self.log.record_sample(raw);
        self.samples_seen += 1;
        self.last_raw = raw;

        let filtered = match self.filter.filter(raw, t) {
            Ok(filtered) => filtered,
            Err(e) => {
                // Fatal to this tick's computation only
                warn!("[Session] sample dropped: {}", e);
                self.update_shared_status();
                return Ok(self.report(None));
            }
        };
        self.last_filtered = filtered;
        let avg = self.window.push(filtered);
        self.last_avg = avg;

        let evaluation = match self.phase {
            Phase::Calibration => {
                self.calibration.accumulate(filtered);
                None
            }
            Phase::Running => Some(self.evaluate(avg, t)),
            // A cycle owns the session; the detector stays frozen
            Phase::Detected | Phase::Prompting | Phase::Recording => None,
            Phase::Finished => None,
        };

        self.update_shared_status();
        Ok(self.report(evaluation))
    }

    // ========================================================================
    // PHASE TRANSITIONS
    // ========================================================================

    fn set_phase(&mut self, phase: Phase) {
        debug!("[Session] phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.log.record_phase(phase);
    }

    fn finish_calibration(&mut self) -> EngineResult<()> {
        let baseline = self.calibration.average()?;
        self.baseline = baseline;
        self.detector.arm(baseline);
        self.set_phase(Phase::Running);
        self.log.record_note(format!("CAL_AVG: {}", baseline));
        info!(
            "[Calib] baseline {:.4} from {} samples over {}s",
            baseline,
            self.calibration.sample_count(),
            self.config.calibration.duration_s
        );
        Ok(())
    }

    fn evaluate(&mut self, avg: f64, t: f64) -> Evaluation {
        let evaluation = self.detector.evaluate(avg, t);
        if let Evaluation::Detected { level } = evaluation {
            self.detections += 1;
            info!(
                "[Trigger] detection #{} at level {:.4} (stable {:.4}, t={:.1}s)",
                self.detections, level, self.baseline, t
            );
            self.set_phase(Phase::Detected);
            self.begin_cycle(t);
        }
        evaluation
    }

    fn begin_cycle(&mut self, t: f64) {
        let cycle = self.cycles.current();
        match self.recorder.begin_cycle(cycle) {
            Ok(handle) => {
                info!("[Cycle] recording cycle {} started", cycle);
                self.active_cycle = Some(handle);
            }
            Err(e) => {
                warn!("[Cycle] recording cycle {} failed to start: {:#}", cycle, e);
                self.log
                    .record_note(format!("Recording failed: {:#}", e));
                self.conclude_cycle(t);
            }
        }
    }

    fn drain_cycle_events(&mut self, t: f64) {
        let events = match &self.active_cycle {
            Some(handle) => handle.poll(),
            None => return,
        };

        for event in events {
            match event {
                CycleEvent::Prompting => self.set_phase(Phase::Prompting),
                CycleEvent::Capturing => self.set_phase(Phase::Recording),
                CycleEvent::Note(text) => self.log.record_note(text),
                CycleEvent::Completed => {
                    info!(
                        "[Cycle] recording cycle {} complete",
                        self.cycles.current()
                    );
                    self.active_cycle = None;
                    self.conclude_cycle(t);
                    break;
                }
                CycleEvent::Failed(reason) => {
                    warn!(
                        "[Cycle] recording cycle {} failed: {}",
                        self.cycles.current(),
                        reason
                    );
                    self.log.record_note(format!("Recording failed: {}", reason));
                    self.active_cycle = None;
                    self.conclude_cycle(t);
                    break;
                }
            }
        }
    }

    /// Shared tail of every cycle, clean or broken: count it, restore the
    /// calibration baseline, open the grace window, and either resume
    /// detection or park the session.
    fn conclude_cycle(&mut self, t: f64) {
        self.cycles.complete_one();
        self.detector.rearm(self.baseline, t);

        if self.cycles.exhausted() {
            info!(
                "[Cycle] all {} cycles complete, session finished",
                self.cycles.max()
            );
            self.set_phase(Phase::Finished);
        } else {
            info!(
                "[Cycle] {}/{} cycles done, detection resumes after {}s grace",
                self.cycles.current(),
                self.cycles.max(),
                self.config.detector.grace_s
            );
            self.set_phase(Phase::Running);
        }
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    fn report(&self, evaluation: Option<Evaluation>) -> TickReport {
        TickReport {
            phase: self.phase,
            evaluation,
        }
    }

    fn update_shared_status(&self) {
        if let Ok(mut status) = self.status_shared.write() {
            let reference = self.detector.reference();
            status.phase = self.phase;
            status.cycle = self.cycles.current();
            status.max_cycles = self.cycles.max();
            status.stable_level = reference.stable_level;
            status.last_raw = self.last_raw;
            status.last_filtered = self.last_filtered;
            status.window_avg = self.last_avg;
            status.changing = reference.changing;
            status.candidate_level = if reference.changing {
                reference.candidate_level
            } else {
                0.0
            };
            status.detections = self.detections;
            status.samples_seen = self.samples_seen;
            status.updated_ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

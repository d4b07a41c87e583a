//! Session loops - pacing the engine against a sample feed
//!
//! Two ways to run the same engine:
//! - **Live**: a fixed-rate tick loop against the acquisition worker's feed.
//!   The loop itself never blocks on the device; each tick takes whatever
//!   reading is currently published and the engine reuses it when no fresh
//!   one arrived. A feed that stays silent past the configured gap aborts
//!   the session.
//! - **Replay**: full speed over a recorded sample file, with tick
//!   timestamps synthesized at the nominal rate so filter and detector see
//!   the same time base the live session saw.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::phase::Phase;
use crate::sampler::SampleFeed;
use crate::source::ReplaySource;
use crate::traits::{Recorder, SampleSource};

/// Why a session loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// All recording cycles completed
    Finished,
    /// The sample source ran out of data
    SourceDrained,
    /// Stop flag raised (Ctrl+C)
    OperatorStop,
}

/// Drive the engine at the nominal sampling rate against a live feed.
pub fn run_live<R: Recorder>(
    engine: &mut Engine<R>,
    feed: &SampleFeed,
    running: &AtomicBool,
) -> EngineResult<SessionEnd> {
    let tick = Duration::from_secs_f64(1.0 / engine.config().sampling_rate_hz);
    let max_gap_s = engine.config().acquisition.max_gap_s;
    let status_interval = Duration::from_secs_f64(engine.config().session.status_interval_s);

    let start = Instant::now();
    let mut next_tick = start + tick;
    let mut last_status = Instant::now();

    info!(
        "[Session] live loop started: {:.0} Hz, stall bound {}s",
        engine.config().sampling_rate_hz, max_gap_s
    );

    loop {
        if !running.load(Ordering::SeqCst) {
            info!("[Session] stop requested, ending session");
            return Ok(SessionEnd::OperatorStop);
        }

        if feed.is_exhausted() {
            info!("[Session] sample source drained");
            return Ok(SessionEnd::SourceDrained);
        }

        let reading = feed.latest();

        // Silence bound: a wedged or unplugged sensor must not leave the
        // session running blind
        let stale_for = match &reading {
            Some(reading) => reading.at.elapsed(),
            None => start.elapsed(),
        };
        if stale_for.as_secs_f64() > max_gap_s {
            return Err(EngineError::AcquisitionStalled {
                stale_for_s: stale_for.as_secs_f64(),
                max_gap_s,
            });
        }

        let t = start.elapsed().as_secs_f64();
        let report = engine.tick(reading.map(|r| r.raw), t)?;
        if report.phase == Phase::Finished {
            return Ok(SessionEnd::Finished);
        }

        if last_status.elapsed() >= status_interval {
            engine.log_status();
            last_status = Instant::now();
        }

        // Deadline pacing; a long tick shortens the next sleep instead of
        // dragging the whole schedule
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        next_tick += tick;
    }
}

/// Re-run a recorded session at full speed.
///
/// Timestamps are synthesized at the nominal rate, so the engine walks the
/// exact trajectory the live session walked regardless of how fast the
/// replay itself runs.
pub fn run_replay<R: Recorder>(
    engine: &mut Engine<R>,
    mut source: ReplaySource,
    running: &AtomicBool,
) -> EngineResult<SessionEnd> {
    let dt = 1.0 / engine.config().sampling_rate_hz;
    let status_every = engine.config().session.status_interval_s;

    info!(
        "[Session] replaying {} samples at dt={}s",
        source.remaining(),
        dt
    );

    let mut index: u64 = 0;
    let mut next_status_t = status_every;
    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(SessionEnd::OperatorStop);
        }

        let raw = match source.read_sample() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("[Session] replay drained after {} samples", index);
                return Ok(SessionEnd::SourceDrained);
            }
            Err(e) => return Err(EngineError::Acquisition(e.to_string())),
        };

        let t = index as f64 * dt;
        let report = engine.tick(Some(raw), t)?;
        index += 1;
        if report.phase == Phase::Finished {
            return Ok(SessionEnd::Finished);
        }

        if t >= next_status_t {
            engine.log_status();
            next_status_t += status_every;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

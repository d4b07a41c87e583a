//! Sensor acquisition worker
//!
//! Reads from the sensor can block (serial line waits, device hiccups), and
//! the control loop must never wait on I/O. The worker owns the source and
//! publishes each reading into a single latest-value slot, overwriting
//! whatever the loop has not consumed. A late control loop therefore sees
//! only the newest reading, never a backlog; a tick with no fresh reading
//! reuses the last one it saw.

use crate::traits::SampleSource;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One published reading
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    pub raw: f64,
    /// When the worker published it
    pub at: Instant,
    /// Monotonic counter; lets the loop tell fresh from reused
    pub seq: u64,
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Reading>,
    /// Consecutive read faults since the last good reading
    faults: u32,
    /// Source drained (replay reached its end)
    exhausted: bool,
}

/// Control-loop handle onto the shared slot
#[derive(Clone)]
pub struct SampleFeed {
    slot: Arc<Mutex<Slot>>,
}

impl SampleFeed {
    /// Newest published reading, if any yet.
    pub fn latest(&self) -> Option<Reading> {
        self.slot.lock().ok().and_then(|slot| slot.latest)
    }

    pub fn fault_count(&self) -> u32 {
        self.slot.lock().ok().map(|slot| slot.faults).unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.slot.lock().ok().map(|slot| slot.exhausted).unwrap_or(true)
    }
}

/// Owns the worker thread for one source
pub struct Sampler {
    feed: SampleFeed,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Spawn the worker. `gap_pause` is the idle delay after a gap or fault
    /// so a non-blocking source does not spin a core.
    pub fn spawn<S>(source: S, gap_pause: Duration) -> Result<Self>
    where
        S: SampleSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let slot = Arc::new(Mutex::new(Slot::default()));
        let feed = SampleFeed { slot: slot.clone() };

        let stop_flag = stop.clone();
        let worker = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || acquisition_loop(source, slot, stop_flag, gap_pause))
            .context("spawning acquisition worker")?;

        Ok(Sampler {
            feed,
            stop,
            worker: Some(worker),
        })
    }

    pub fn feed(&self) -> SampleFeed {
        self.feed.clone()
    }

    /// Signal the worker and wait for it to wind down. The worker notices
    /// the flag on its next read return, so a source that delivers (or hits
    /// EOF) promptly unblocks this quickly.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // Abort path: signal but do not join, a wedged device must not
        // hang teardown
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn acquisition_loop<S: SampleSource>(
    mut source: S,
    slot: Arc<Mutex<Slot>>,
    stop: Arc<AtomicBool>,
    gap_pause: Duration,
) {
    let mut seq: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        match source.read_sample() {
            Ok(Some(raw)) => {
                seq += 1;
                if let Ok(mut slot) = slot.lock() {
                    slot.latest = Some(Reading {
                        raw,
                        at: Instant::now(),
                        seq,
                    });
                    slot.faults = 0;
                }
            }
            Ok(None) => {
                if source.exhausted() {
                    debug!("[Source] drained after {} readings", seq);
                    if let Ok(mut slot) = slot.lock() {
                        slot.exhausted = true;
                    }
                    return;
                }
                thread::sleep(gap_pause);
            }
            Err(e) => {
                warn!("[Source] read failed: {:#}", e);
                if let Ok(mut slot) = slot.lock() {
                    slot.faults = slot.faults.saturating_add(1);
                }
                thread::sleep(gap_pause);
            }
        }
    }
    debug!("[Source] acquisition worker stopped after {} readings", seq);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Scripted source for exercising the worker without hardware.
    struct ScriptedSource {
        script: Vec<Result<Option<f64>>>,
        done: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Option<f64>>>) -> Self {
            ScriptedSource {
                script,
                done: false,
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn read_sample(&mut self) -> Result<Option<f64>> {
            if self.script.is_empty() {
                self.done = true;
                return Ok(None);
            }
            self.script.remove(0)
        }

        fn exhausted(&self) -> bool {
            self.done
        }
    }

    fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("timed out waiting for {}", what);
    }

    #[test]
    fn test_slot_holds_latest_value() {
        let source = ScriptedSource::new(vec![Ok(Some(0.1)), Ok(Some(0.2)), Ok(Some(0.3))]);
        let sampler = Sampler::spawn(source, Duration::from_millis(1)).unwrap();
        let feed = sampler.feed();

        wait_for("source to drain", || feed.is_exhausted());
        let reading = feed.latest().expect("slot must hold the last reading");
        assert!((reading.raw - 0.3).abs() < 1e-12);
        assert_eq!(reading.seq, 3);
        sampler.stop();
    }

    #[test]
    fn test_fault_counter_resets_on_good_reading() {
        let source = ScriptedSource::new(vec![
            Err(anyhow!("glove unplugged")),
            Err(anyhow!("still unplugged")),
            Ok(Some(0.8)),
        ]);
        let sampler = Sampler::spawn(source, Duration::from_millis(1)).unwrap();
        let feed = sampler.feed();

        wait_for("good reading after faults", || feed.latest().is_some());
        assert_eq!(feed.fault_count(), 0);
        sampler.stop();
    }

    #[test]
    fn test_exhausted_flag_published() {
        let source = ScriptedSource::new(vec![Ok(Some(1.0))]);
        let sampler = Sampler::spawn(source, Duration::from_millis(1)).unwrap();
        let feed = sampler.feed();

        wait_for("exhaustion", || feed.is_exhausted());
        assert!(feed.latest().is_some());
        sampler.stop();
    }

    #[test]
    fn test_stop_joins_worker() {
        // Endless gaps: the worker only leaves via the stop flag
        struct GappySource;
        impl SampleSource for GappySource {
            fn read_sample(&mut self) -> Result<Option<f64>> {
                Ok(None)
            }
        }

        let sampler = Sampler::spawn(GappySource, Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(10));
        sampler.stop();
    }
}

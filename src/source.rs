//! Sample sources
//!
//! Three interchangeable producers behind [`SampleSource`]:
//! - [`LineSource`]: newline-delimited decimal readings from any byte
//!   stream, which is exactly what the glove board emits over serial
//! - [`ReplaySource`]: deterministic re-run of a recorded session log
//! - [`SyntheticSource`]: uniform noise for hardware-free smoke runs
//!
//! A gap (empty read, garbled line) is reported as `Ok(None)` and never as
//! a zero reading; zeros would poison the calibration average.

use crate::traits::SampleSource;
use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// ============================================================================
// LINE SOURCE - live device stream
// ============================================================================

/// Newline-delimited decimal readings from any `BufRead`
///
/// The glove board prints one voltage per line; pointing this at the
/// device node (configured by the OS, e.g. `/dev/ttyACM0`) is the whole
/// live acquisition path. Also works on a FIFO or stdin for rig checks.
pub struct LineSource<R: BufRead> {
    reader: R,
    line: String,
}

impl LineSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening sensor device {}", path.display()))?;
        info!("[Source] reading sensor lines from {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        LineSource {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> SampleSource for LineSource<R> {
    fn read_sample(&mut self) -> Result<Option<f64>> {
        self.line.clear();
        let n = self
            .reader
            .read_line(&mut self.line)
            .context("reading sensor line")?;
        if n == 0 {
            // EOF on a device node means it went away; the staleness bound
            // upstream decides when that becomes fatal
            return Ok(None);
        }
        match self.line.trim().parse::<f64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                debug!("[Source] unparseable line {:?}", self.line.trim());
                Ok(None)
            }
        }
    }
}

// ============================================================================
// REPLAY SOURCE - recorded session log
// ============================================================================

/// Deterministic replay of a previous session record
///
/// Numeric lines are samples; phase markers and annotations interleaved in
/// the record are skipped. The whole file is loaded up front so replay
/// cannot stall mid-session on disk I/O.
pub struct ReplaySource {
    samples: VecDeque<f64>,
}

impl ReplaySource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening session log {}", path.display()))?;
        let source = Self::from_reader(BufReader::new(file))?;
        info!(
            "[Source] replaying {} samples from {}",
            source.remaining(),
            path.display()
        );
        Ok(source)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut samples = VecDeque::new();
        for line in reader.lines() {
            let line = line.context("reading session log line")?;
            if let Ok(value) = line.trim().parse::<f64>() {
                samples.push_back(value);
            }
        }
        Ok(ReplaySource { samples })
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for ReplaySource {
    fn read_sample(&mut self) -> Result<Option<f64>> {
        Ok(self.samples.pop_front())
    }

    fn exhausted(&self) -> bool {
        self.samples.is_empty()
    }
}

// ============================================================================
// SYNTHETIC SOURCE - hardware-free noise
// ============================================================================

/// Uniform random readings in `[0, amplitude)`
///
/// Matches the amplitude range of the board's voltage divider so the whole
/// pipeline can be smoke-tested with nothing plugged in.
pub struct SyntheticSource {
    amplitude: f64,
}

impl SyntheticSource {
    pub const DEFAULT_AMPLITUDE: f64 = 1.5;

    pub fn new(amplitude: f64) -> Self {
        SyntheticSource { amplitude }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        SyntheticSource::new(Self::DEFAULT_AMPLITUDE)
    }
}

impl SampleSource for SyntheticSource {
    fn read_sample(&mut self) -> Result<Option<f64>> {
        Ok(Some(rand::random::<f64>() * self.amplitude))
    }
}

// ============================================================================
// TESTS
// ============================================================================

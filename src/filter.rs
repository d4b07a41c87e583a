//! Adaptive signal conditioning for the glove channel
//!
//! ## The Problem
//! The raw FSR voltage carries noise from several sources:
//! - contact chatter where the pad meets the skin
//! - ADC quantization on the board
//! - cable microphonics when the wearer shifts
//!
//! The detector needs a quiet baseline, but it also must not miss a real
//! grip change by minutes of smoothing lag. A fixed low-pass filter forces
//! exactly that trade-off.
//!
//! ## The Solution
//! One-euro adaptive smoothing: the value channel's cutoff frequency is not
//! fixed but rises with the magnitude of the smoothed derivative. A resting
//! hand gets heavy smoothing (jitter suppressed), a moving hand opens the
//! cutoff and the filter tracks the edge with little lag.
//!
//! ## Algorithm
//! 1. Estimate the raw derivative from the previous filtered value
//! 2. Smooth the derivative with a low-pass at `derivative_cutoff`
//! 3. Set the value cutoff to `min_cutoff + beta * |smoothed derivative|`
//! 4. Low-pass the raw value at that cutoff
//!
//! Per-sample smoothing factors come from the sample spacing, so irregular
//! arrival times are handled exactly rather than assumed nominal.

use crate::config::FilterConfig;
use crate::error::{EngineError, EngineResult};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Carried state between samples
#[derive(Debug, Clone, Copy)]
struct FilterState {
    /// Previous filtered value
    value: f64,
    /// Previous smoothed derivative (units per second)
    derivative: f64,
    /// Timestamp of the previous sample (seconds since session start)
    t: f64,
}

/// One-euro adaptive low-pass filter
///
/// Timestamps must be strictly increasing; a stale or repeated timestamp is
/// rejected with [`EngineError::TimeOrdering`] and leaves the filter state
/// untouched.
#[derive(Debug)]
pub struct AdaptiveFilter {
    /// Cutoff frequency at rest (Hz)
    min_cutoff: f64,
    /// Cutoff gain per unit of derivative magnitude
    beta: f64,
    /// Cutoff for the derivative channel (Hz)
    derivative_cutoff: f64,
    /// None until the first sample has passed through
    state: Option<FilterState>,
}

impl AdaptiveFilter {
    pub fn new(min_cutoff: f64, beta: f64, derivative_cutoff: f64) -> Self {
        AdaptiveFilter {
            min_cutoff,
            beta,
            derivative_cutoff,
            state: None,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.min_cutoff, config.beta, config.derivative_cutoff)
    }

    /// Smoothing factor for a first-order low-pass at `cutoff` Hz, sampled
    /// `t_e` seconds after the previous value.
    fn smoothing_factor(t_e: f64, cutoff: f64) -> f64 {
        let tau = 1.0 / (2.0 * PI * cutoff);
        1.0 / (1.0 + tau / t_e)
    }

    /// Filter one sample taken at `t` seconds since session start.
    ///
    /// The first sample passes through unchanged and seeds the state.
    pub fn filter(&mut self, raw: f64, t: f64) -> EngineResult<f64> {
        let Some(prev) = self.state else {
            self.state = Some(FilterState {
                value: raw,
                derivative: 0.0,
                t,
            });
            return Ok(raw);
        };

        if t <= prev.t {
            return Err(EngineError::TimeOrdering { t, t_prev: prev.t });
        }
        let t_e = t - prev.t;

        // Derivative channel: raw slope, then low-pass
        let dx = (raw - prev.value) / t_e;
        let a_d = Self::smoothing_factor(t_e, self.derivative_cutoff);
        let dx_hat = a_d * dx + (1.0 - a_d) * prev.derivative;

        // Value channel: cutoff opens with slope magnitude
        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let a = Self::smoothing_factor(t_e, cutoff);
        let x_hat = a * raw + (1.0 - a) * prev.value;

        self.state = Some(FilterState {
            value: x_hat,
            derivative: dx_hat,
            t,
        });
        Ok(x_hat)
    }

    /// Last filtered value, if any sample has been seen
    pub fn last_value(&self) -> Option<f64> {
        self.state.map(|s| s.value)
    }

    /// Forget all carried state; the next sample passes through unchanged
    pub fn reset(&mut self) {
        self.state = None;
    }
}

// ============================================================================
// TRAILING WINDOW AVERAGE
// ============================================================================

/// Trailing mean over a fixed number of filtered samples (one second's worth
/// at the nominal rate). The detector compares this mean, not individual
/// samples, against its tolerance bands.
#[derive(Debug)]
pub struct WindowAverage {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl WindowAverage {
    /// `capacity` is clamped to at least one sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        WindowAverage {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            sum: 0.0,
        }
    }

    /// Window covering `seconds` of samples at `sampling_rate_hz`.
    pub fn spanning(seconds: f64, sampling_rate_hz: f64) -> Self {
        Self::new((seconds * sampling_rate_hz).round() as usize)
    }

    /// Push one value and return the mean of the window including it.
    pub fn push(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        self.sum / self.window.len() as f64
    }

    /// Current mean, or None before the first push
    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.sum / self.window.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

// ============================================================================
// TESTS
// ============================================================================

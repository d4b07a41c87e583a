//! Engine configuration
//!
//! All tunables live in one serde tree so a study protocol can be captured
//! as a single JSON file. Defaults reproduce the standard glove protocol;
//! a config file only needs the keys it wants to override.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal sensor rate; sets the tick period and the averaging window
    pub sampling_rate_hz: f64,
    pub filter: FilterConfig,
    pub calibration: CalibrationConfig,
    pub detector: DetectorConfig,
    pub cycles: CycleConfig,
    pub acquisition: AcquisitionConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Cutoff frequency when the signal is at rest (Hz)
    pub min_cutoff: f64,
    /// How strongly the cutoff opens with signal slope
    pub beta: f64,
    /// Cutoff for smoothing the derivative estimate (Hz)
    pub derivative_cutoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Length of the rest-state averaging window (seconds)
    pub duration_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Spread seen when the same force is re-applied to the sensor
    pub sensor_repeatability_pct: f64,
    /// Additional margin a reading must clear to count as a new state
    pub state_change_pct: f64,
    /// How long a candidate level must hold before it is durable (seconds)
    pub dwell_s: f64,
    /// Detection suppression after each completed cycle (seconds)
    pub grace_s: f64,
}

impl DetectorConfig {
    /// Half-width of the tolerance band, as a fraction of the level under
    /// test. Repeatability and state-change margins are summed.
    pub fn delta_pct(&self) -> f64 {
        self.sensor_repeatability_pct + self.state_change_pct
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Recording cycles before the session parks in Finished
    pub max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Longest tolerated gap between fresh readings before the session
    /// aborts (seconds)
    pub max_gap_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cadence of the one-line status summary in the program log (seconds)
    pub status_interval_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sampling_rate_hz: 100.0,
            filter: FilterConfig::default(),
            calibration: CalibrationConfig::default(),
            detector: DetectorConfig::default(),
            cycles: CycleConfig::default(),
            acquisition: AcquisitionConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_cutoff: 1.0,
            beta: 0.1,
            derivative_cutoff: 1.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig { duration_s: 90.0 }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            sensor_repeatability_pct: 0.02,
            state_change_pct: 0.015,
            dwell_s: 10.0,
            grace_s: 10.0,
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig { max: 3 }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig { max_gap_s: 2.0 }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            status_interval_s: 10.0,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing keys fall back to the protocol
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sampling_rate_hz > 0.0,
            "sampling_rate_hz must be positive, got {}",
            self.sampling_rate_hz
        );
        ensure!(
            self.filter.min_cutoff > 0.0 && self.filter.derivative_cutoff > 0.0,
            "filter cutoffs must be positive"
        );
        ensure!(
            self.filter.beta >= 0.0,
            "filter.beta must be non-negative, got {}",
            self.filter.beta
        );
        ensure!(
            self.calibration.duration_s > 0.0,
            "calibration.duration_s must be positive, got {}",
            self.calibration.duration_s
        );
        ensure!(
            self.detector.delta_pct() > 0.0,
            "detector tolerance band must be positive"
        );
        ensure!(
            self.detector.dwell_s >= 0.0 && self.detector.grace_s >= 0.0,
            "detector dwell_s and grace_s must be non-negative"
        );
        ensure!(self.cycles.max > 0, "cycles.max must be at least 1");
        ensure!(
            self.acquisition.max_gap_s > 0.0,
            "acquisition.max_gap_s must be positive, got {}",
            self.acquisition.max_gap_s
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_glove_protocol() {
        let config = EngineConfig::default();
        assert!((config.sampling_rate_hz - 100.0).abs() < f64::EPSILON);
        assert!((config.filter.min_cutoff - 1.0).abs() < f64::EPSILON);
        assert!((config.filter.beta - 0.1).abs() < f64::EPSILON);
        assert!((config.filter.derivative_cutoff - 1.0).abs() < f64::EPSILON);
        assert!((config.calibration.duration_s - 90.0).abs() < f64::EPSILON);
        assert!((config.detector.sensor_repeatability_pct - 0.02).abs() < f64::EPSILON);
        assert!((config.detector.state_change_pct - 0.015).abs() < f64::EPSILON);
        assert!((config.detector.dwell_s - 10.0).abs() < f64::EPSILON);
        assert!((config.detector.grace_s - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.cycles.max, 3);
        assert!((config.acquisition.max_gap_s - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delta_pct_sums_both_margins() {
        let detector = DetectorConfig::default();
        assert!((detector.delta_pct() - 0.035).abs() < 1e-12);
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert!((back.detector.dwell_s - config.detector.dwell_s).abs() < f64::EPSILON);
        assert_eq!(back.cycles.max, config.cycles.max);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_keys() {
        let json = r#"{ "cycles": { "max": 5 }, "detector": { "dwell_s": 4.0 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cycles.max, 5);
        assert!((config.detector.dwell_s - 4.0).abs() < f64::EPSILON);
        // Untouched keys keep protocol defaults
        assert!((config.detector.grace_s - 10.0).abs() < f64::EPSILON);
        assert!((config.sampling_rate_hz - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sampling_rate_hz": 0.0 }}"#).unwrap();
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("sampling_rate_hz"));
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "calibration": {{ "duration_s": 2.5 }} }}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert!((config.calibration.duration_s - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_zero_cycles() {
        let mut config = EngineConfig::default();
        config.cycles.max = 0;
        assert!(config.validate().is_err());
    }
}

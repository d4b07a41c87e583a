//! Append-only session record
//!
//! Everything a session learns is written as one entry per line: raw sensor
//! readings as bare decimals, phase transitions as their stable tokens, and
//! free-form annotations. The format doubles as the replay input, so a
//! recorded session can be re-run through the whole signal path later with
//! different tuning.
//!
//! There is a single ingestion point (the control loop), so entries appear
//! in exactly the order presented. Flushing happens once at teardown; a
//! partial record after a crash is acceptable-but-incomplete.

use crate::phase::Phase;
use chrono::Local;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

/// One line of the session record
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    /// Raw sensor reading for one tick
    Sample(f64),
    /// Phase transition marker
    PhaseMarker(Phase),
    /// Free-form annotation (calibration result, protocol progress)
    Note(String),
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Sample(v) => write!(f, "{}", v),
            LogEntry::PhaseMarker(phase) => write!(f, "{}", phase),
            LogEntry::Note(text) => f.write_str(text),
        }
    }
}

/// In-memory session record with optional live tap
///
/// The tap forwards every entry to a presentation sink (live plotter,
/// remote console) as it is recorded. A dead sink is ignored; losing the
/// plotter must never stall the control loop.
#[derive(Debug, Default)]
pub struct SampleLog {
    entries: Vec<LogEntry>,
    tap: Option<Sender<LogEntry>>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tap(tap: Sender<LogEntry>) -> Self {
        SampleLog {
            entries: Vec::new(),
            tap: Some(tap),
        }
    }

    /// Record one raw reading, exactly as acquired (pre-filter).
    pub fn record_sample(&mut self, raw: f64) {
        self.push(LogEntry::Sample(raw));
    }

    /// Record a phase transition.
    pub fn record_phase(&mut self, phase: Phase) {
        self.push(LogEntry::PhaseMarker(phase));
    }

    /// Record an annotation. Notes that parse as a bare number would replay
    /// as samples, so callers keep a word in front (`CAL_AVG: 1.02`).
    pub fn record_note(&mut self, note: impl Into<String>) {
        self.push(LogEntry::Note(note.into()));
    }

    fn push(&mut self, entry: LogEntry) {
        if let Some(tap) = &self.tap {
            let _ = tap.send(entry.clone());
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry, one per line, to `path`.
    pub fn flush_to(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            writeln!(writer, "{}", entry)?;
        }
        writer.flush()
    }

    /// Timestamped file name for a session starting now, under `dir`.
    pub fn session_path(dir: &Path) -> PathBuf {
        dir.join(Local::now().format("%Y-%m-%d_%H:%M:%S%.6f").to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;

    #[test]
    fn test_entries_keep_ingestion_order() {
        let mut log = SampleLog::new();
        log.record_sample(0.5);
        log.record_phase(Phase::Running);
        log.record_note("CAL_AVG: 0.5");
        log.record_sample(0.51);

        assert_eq!(log.len(), 4);
        assert_eq!(log.entries()[0], LogEntry::Sample(0.5));
        assert_eq!(log.entries()[1], LogEntry::PhaseMarker(Phase::Running));
        assert_eq!(log.entries()[2], LogEntry::Note("CAL_AVG: 0.5".into()));
        assert_eq!(log.entries()[3], LogEntry::Sample(0.51));
    }

    #[test]
    fn test_display_formats_one_line_each() {
        assert_eq!(LogEntry::Sample(0.5323702).to_string(), "0.5323702");
        assert_eq!(
            LogEntry::PhaseMarker(Phase::Detected).to_string(),
            "Phases.DETECTED"
        );
        assert_eq!(LogEntry::Note("Prompt 1".into()).to_string(), "Prompt 1");
    }

    #[test]
    fn test_sample_text_round_trips_exactly() {
        // The replay path parses these lines back with f64::from_str
        for v in [0.0, 1.5, 0.734210341, 1e-9, 123.456] {
            let text = LogEntry::Sample(v).to_string();
            let back: f64 = text.parse().unwrap();
            assert_eq!(back.to_bits(), v.to_bits(), "lost bits for {}", v);
        }
    }

    #[test]
    fn test_flush_writes_one_entry_per_line() {
        let mut log = SampleLog::new();
        log.record_sample(1.25);
        log.record_phase(Phase::Running);
        log.record_note("CAL_AVG: 1.25");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        log.flush_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1.25\nPhases.RUNNING\nCAL_AVG: 1.25\n");
    }

    #[test]
    fn test_tap_receives_every_entry() {
        let (tx, rx) = mpsc::channel();
        let mut log = SampleLog::with_tap(tx);
        log.record_sample(0.9);
        log.record_phase(Phase::Finished);

        assert_eq!(rx.try_recv().unwrap(), LogEntry::Sample(0.9));
        assert_eq!(
            rx.try_recv().unwrap(),
            LogEntry::PhaseMarker(Phase::Finished)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_tap_does_not_stall_recording() {
        let (tx, rx) = mpsc::channel();
        let mut log = SampleLog::with_tap(tx);
        drop(rx);
        log.record_sample(0.1);
        log.record_sample(0.2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_session_path_is_timestamped_under_dir() {
        let path = SampleLog::session_path(Path::new("LOGS"));
        assert!(path.starts_with("LOGS"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        // 2024-05-01_22:10:31.123456
        assert_eq!(&name[4..5], "-");
        assert!(name.contains('_'));
        assert!(name.contains(':'));
        assert!(name.contains('.'));
    }
}

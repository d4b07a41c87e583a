//! Recording collaborator hand-off
//!
//! When a detection fires, the engine hands the session to a recording
//! collaborator: the scripted sequence of audio prompts followed by a timed
//! capture of the subject's report. The protocol runs for minutes, so it
//! lives on its own thread and reports progress back over a channel. The
//! control loop drains that channel once per tick and never blocks on it.

use crate::traits::Recorder;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

/// Protocol progress reported by an in-flight recording cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Prompt playback started
    Prompting,
    /// Response capture started
    Capturing,
    /// Free-form progress line for the session record
    Note(String),
    /// Protocol finished cleanly
    Completed,
    /// Protocol failed; the cycle still counts as consumed
    Failed(String),
}

impl CycleEvent {
    /// Completed and Failed both end the cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleEvent::Completed | CycleEvent::Failed(_))
    }
}

/// Receiving side of one in-flight recording cycle
#[derive(Debug)]
pub struct CycleHandle {
    events: Receiver<CycleEvent>,
}

impl CycleHandle {
    /// Paired sender and handle for a new cycle.
    pub fn channel() -> (Sender<CycleEvent>, CycleHandle) {
        let (tx, rx) = mpsc::channel();
        (tx, CycleHandle { events: rx })
    }

    /// Drain whatever has arrived so far. Never blocks. A task that died
    /// without reporting shows up as a synthesized failure so the session
    /// is never left stuck in a recording phase.
    pub fn poll(&self) -> Vec<CycleEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    drained.push(event);
                    if terminal {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !drained.iter().any(CycleEvent::is_terminal) {
                        drained.push(CycleEvent::Failed(
                            "recording task dropped its channel".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
        drained
    }
}

// ============================================================================
// COMMAND RECORDER - external protocol script
// ============================================================================

/// Runs an external protocol command once per cycle
///
/// The command gets the cycle index as its single argument and blocks until
/// prompts and capture are done. Every stdout line is forwarded into the
/// session record as an annotation, so the script decides its own progress
/// wording (`Prompt 1`, `Recording...`). Exit status zero reports a clean
/// cycle.
pub struct CommandRecorder {
    program: String,
}

impl CommandRecorder {
    pub fn new(program: impl Into<String>) -> Self {
        CommandRecorder {
            program: program.into(),
        }
    }
}

impl Recorder for CommandRecorder {
    fn begin_cycle(&mut self, cycle: u32) -> Result<CycleHandle> {
        let (tx, handle) = CycleHandle::channel();
        let program = self.program.clone();

        thread::Builder::new()
            .name(format!("record-cycle-{}", cycle))
            .spawn(move || run_command_cycle(&program, cycle, &tx))
            .context("spawning recording task")?;

        Ok(handle)
    }
}

fn run_command_cycle(program: &str, cycle: u32, tx: &Sender<CycleEvent>) {
    let _ = tx.send(CycleEvent::Prompting);

    let mut child = match Command::new(program)
        .arg(cycle.to_string())
        .stdout(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(CycleEvent::Failed(format!(
                "failed to launch {}: {}",
                program, e
            )));
            return;
        }
    };

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("[Cycle] protocol: {}", text);
                    let _ = tx.send(CycleEvent::Note(text));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[Cycle] protocol stdout lost: {}", e);
                    break;
                }
            }
        }
    }

    match child.wait() {
        Ok(status) if status.success() => {
            let _ = tx.send(CycleEvent::Completed);
        }
        Ok(status) => {
            let _ = tx.send(CycleEvent::Failed(format!(
                "{} exited with {}",
                program, status
            )));
        }
        Err(e) => {
            let _ = tx.send(CycleEvent::Failed(format!("waiting on {}: {}", program, e)));
        }
    }
}

// ============================================================================
// TIMED RECORDER - hardware-free stand-in
// ============================================================================

/// Walks the protocol stages on plain timers
///
/// Stands in for the real audio rig during bench checks and synthetic runs:
/// same stages, same events, no sound hardware touched.
pub struct TimedRecorder {
    prompt_s: f64,
    capture_s: f64,
}

impl TimedRecorder {
    pub fn new(prompt_s: f64, capture_s: f64) -> Self {
        TimedRecorder {
            prompt_s,
            capture_s,
        }
    }
}

impl Default for TimedRecorder {
    fn default() -> Self {
        // Rough shape of the real protocol: four prompts, one minute capture
        TimedRecorder::new(20.0, 60.0)
    }
}

impl Recorder for TimedRecorder {
    fn begin_cycle(&mut self, cycle: u32) -> Result<CycleHandle> {
        let (tx, handle) = CycleHandle::channel();
        let prompt = Duration::from_secs_f64(self.prompt_s);
        let capture = Duration::from_secs_f64(self.capture_s);

        thread::Builder::new()
            .name(format!("record-cycle-{}", cycle))
            .spawn(move || {
                let _ = tx.send(CycleEvent::Prompting);
                let _ = tx.send(CycleEvent::Note(format!("Prompt playback (cycle {})", cycle)));
                thread::sleep(prompt);
                let _ = tx.send(CycleEvent::Capturing);
                let _ = tx.send(CycleEvent::Note("Recording...".to_string()));
                thread::sleep(capture);
                let _ = tx.send(CycleEvent::Completed);
            })
            .context("spawning recording task")?;

        Ok(handle)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Poll until a terminal event arrives or the deadline passes.
    fn collect_until_terminal(handle: &CycleHandle, timeout: Duration) -> Vec<CycleEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(handle.poll());
            if events.iter().any(CycleEvent::is_terminal) {
                return events;
            }
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_poll_never_blocks_on_empty_channel() {
        let (_tx, handle) = CycleHandle::channel();
        assert!(handle.poll().is_empty());
    }

    #[test]
    fn test_poll_drains_in_order() {
        let (tx, handle) = CycleHandle::channel();
        tx.send(CycleEvent::Prompting).unwrap();
        tx.send(CycleEvent::Note("Prompt 1".into())).unwrap();
        tx.send(CycleEvent::Capturing).unwrap();

        let events = handle.poll();
        assert_eq!(
            events,
            vec![
                CycleEvent::Prompting,
                CycleEvent::Note("Prompt 1".into()),
                CycleEvent::Capturing
            ]
        );
    }

    #[test]
    fn test_dropped_task_synthesizes_failure() {
        let (tx, handle) = CycleHandle::channel();
        tx.send(CycleEvent::Prompting).unwrap();
        drop(tx);

        let events = handle.poll();
        assert_eq!(events[0], CycleEvent::Prompting);
        assert!(matches!(events[1], CycleEvent::Failed(_)));
    }

    #[test]
    fn test_clean_disconnect_after_completed_is_not_failure() {
        let (tx, handle) = CycleHandle::channel();
        tx.send(CycleEvent::Completed).unwrap();
        drop(tx);

        let events = handle.poll();
        assert_eq!(events, vec![CycleEvent::Completed]);
    }

    #[test]
    fn test_timed_recorder_walks_all_stages() {
        let mut recorder = TimedRecorder::new(0.01, 0.01);
        let handle = recorder.begin_cycle(0).unwrap();
        let events = collect_until_terminal(&handle, Duration::from_secs(5));

        assert_eq!(events.first(), Some(&CycleEvent::Prompting));
        assert!(events.contains(&CycleEvent::Capturing));
        assert_eq!(events.last(), Some(&CycleEvent::Completed));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_recorder_forwards_stdout_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("protocol.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"Prompt 1\"\necho \"Recording...\"\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut recorder = CommandRecorder::new(script.to_string_lossy());
        let handle = recorder.begin_cycle(1).unwrap();
        let events = collect_until_terminal(&handle, Duration::from_secs(5));

        assert_eq!(events.first(), Some(&CycleEvent::Prompting));
        assert!(events.contains(&CycleEvent::Note("Prompt 1".into())));
        assert!(events.contains(&CycleEvent::Note("Recording...".into())));
        assert_eq!(events.last(), Some(&CycleEvent::Completed));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_recorder_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut recorder = CommandRecorder::new(script.to_string_lossy());
        let handle = recorder.begin_cycle(2).unwrap();
        let events = collect_until_terminal(&handle, Duration::from_secs(5));

        match events.last() {
            Some(CycleEvent::Failed(reason)) => assert!(reason.contains("exit")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_command_recorder_missing_program_fails() {
        let mut recorder = CommandRecorder::new("/nonexistent/protocol-runner");
        let handle = recorder.begin_cycle(0).unwrap();
        let events = collect_until_terminal(&handle, Duration::from_secs(5));
        assert!(matches!(events.last(), Some(CycleEvent::Failed(_))));
    }
}

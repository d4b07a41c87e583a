use crate::recorder::CycleHandle;
use anyhow::Result;

#[cfg_attr(test, mockall::automock)]
pub trait SampleSource: Send {
    /// Read the next raw reading. Returns Ok(Some(value)) on a reading.
    /// Returns Ok(None) on a gap (nothing available, garbled line); a gap
    /// is never a zero reading.
    fn read_sample(&mut self) -> Result<Option<f64>>;

    /// True once the source can never produce again (replay drained).
    /// Default impl says never, which is right for live devices.
    fn exhausted(&self) -> bool {
        false
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Recorder {
    /// Start the scripted prompt-and-capture protocol for one cycle.
    /// Progress and completion arrive asynchronously on the handle; the
    /// protocol may run for minutes and must never be waited on inline.
    fn begin_cycle(&mut self, cycle: u32) -> Result<CycleHandle>;
}

//! # Acquisition Engine
//!
//! One acquisition cycle holds the serial link, reads a snapshot, drains
//! the event buffer and releases the link. The scheduler fires cycles on
//! a fixed interval.

pub mod cycle;
pub mod event_capture;
pub mod scheduler;

use std::fmt;

use crate::error::PqError;
use crate::payload::{PowerSnapshot, PqEvent};

pub use cycle::{read_snapshot, run_session};
pub use event_capture::{
    AbortReason, CaptureReport, DrainReason, EventCapture, Termination, WaveformLayout,
};
pub use scheduler::Scheduler;

/// Data gathered by one cycle. Discarded once dispatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionCycle {
    pub snapshot: Option<PowerSnapshot>,
    pub events: Vec<PqEvent>,
}

/// Why a firing did not run a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous cycle still holds the serial link.
    LinkBusy,
    /// No device is marked active in the configuration store.
    NoActiveDevice,
}

/// Result of one scheduler firing.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Snapshot read and event buffer drained.
    Completed { events: usize, drain: DrainReason },
    /// Snapshot read but the drain was cut short. Captured data was still dispatched.
    Aborted { events: usize, reason: AbortReason },
    /// The cycle failed before any data was captured.
    Failed(PqError),
    Skipped(SkipReason),
}

impl CycleOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped(_))
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CycleOutcome::Completed { events, drain } => {
                write!(f, "completed with {events} events ({drain:?})")
            }
            CycleOutcome::Aborted { events, reason } => match reason {
                AbortReason::Exchange(e) => write!(f, "aborted after {events} events: {e}"),
                AbortReason::ExceededMaxEvents(max) => {
                    write!(
                        f,
                        "aborted after {events} events: exceeded max events per cycle ({max})"
                    )
                }
            },
            CycleOutcome::Failed(e) => write!(f, "failed: {e}"),
            CycleOutcome::Skipped(SkipReason::LinkBusy) => write!(f, "skipped, link busy"),
            CycleOutcome::Skipped(SkipReason::NoActiveDevice) => {
                write!(f, "skipped, no active device")
            }
        }
    }
}

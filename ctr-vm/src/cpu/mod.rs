//! Virtual cores and the execution backends that drive them.

pub mod core;
pub mod types;

pub use self::core::VirtualCore;
pub use types::{BackendKind, CoreId, RunOutcome};

use crate::timing::Ticks;

/// An instruction-level execution engine bound to one core.
///
/// `run` executes guest code for at most `budget` ticks and returns; it is
/// never interrupted by the run loop. Blocking waits inside the backend are
/// invisible to the scheduler.
pub trait CpuBackend: Send {
    fn kind(&self) -> BackendKind;

    fn run(&mut self, budget: Ticks) -> RunOutcome;
}

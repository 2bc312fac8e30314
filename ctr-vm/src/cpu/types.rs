use crate::timing::Ticks;
use serde::{Deserialize, Serialize};

/// Index of a virtual core within the session, fixed at construction.
pub type CoreId = usize;

/// Execution backend family, chosen once when the session is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Dynamic recompiler.
    Jit,
    /// Instruction-at-a-time interpreter.
    Interpreter,
}

impl BackendKind {
    /// Whether the host architecture has a JIT backend.
    pub const fn jit_available() -> bool {
        cfg!(any(target_arch = "x86_64", target_arch = "aarch64"))
    }

    /// Pick the backend for a session. A JIT request on a host without one
    /// falls back to the interpreter.
    pub fn select(use_cpu_jit: bool) -> Self {
        if !use_cpu_jit {
            return BackendKind::Interpreter;
        }
        if Self::jit_available() {
            BackendKind::Jit
        } else {
            log::warn!("CPU JIT requested, but no JIT backend is available on this host");
            BackendKind::Interpreter
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Jit => write!(f, "jit"),
            BackendKind::Interpreter => write!(f, "interpreter"),
        }
    }
}

/// What a backend reports when it hands control back to the run loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Ticks of the granted budget actually executed.
    pub executed: Ticks,
    /// A supervisor call or event needs a thread switch on this core.
    pub reschedule: bool,
}

impl RunOutcome {
    /// The whole budget was executed.
    pub fn completed(budget: Ticks) -> Self {
        Self {
            executed: budget,
            reschedule: false,
        }
    }

    /// Execution stopped after `executed` ticks.
    pub fn stopped_at(executed: Ticks) -> Self {
        Self {
            executed,
            reschedule: false,
        }
    }

    pub fn with_reschedule(mut self) -> Self {
        self.reschedule = true;
        self
    }
}

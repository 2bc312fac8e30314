//! Kernel collaborator interface.
//!
//! The scheduler needs only two things from the guest kernel: whether a core
//! has a thread to run, and a way to trigger a thread switch on a core at a
//! step boundary.

use crate::cpu::CoreId;

pub type ThreadId = u32;

/// Kernel construction parameters, taken from the loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub system_mode: u32,
    pub n3ds_mode: u8,
    pub num_cores: usize,
}

/// A program image after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub name: String,
    pub entry_point: u64,
    pub segments: usize,
}

/// Per-core thread scheduler of the guest kernel.
pub trait ThreadManager: Send {
    /// Thread currently scheduled on this core, if any.
    fn current_thread(&self) -> Option<ThreadId>;

    /// Pick the next thread to run on this core.
    fn reschedule(&mut self);
}

pub trait Kernel: Send {
    /// Record which core is executing; lookups only.
    fn set_running_core(&mut self, core: CoreId);

    fn thread_manager(&mut self, core: CoreId) -> &mut dyn ThreadManager;

    fn set_current_process(&mut self, process: Process);

    fn shutdown(&mut self) {}
}

//! Lifecycle collaborators that do not take part in scheduling.

use crate::error::SubsystemError;
use std::fmt;

/// The collaborators a session brings up, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Memory,
    Dsp,
    RpcServer,
    ServiceManager,
    ArchiveManager,
    GdbStub,
    Video,
    CheatEngine,
    CustomTexCache,
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsystemKind::Memory => "memory",
            SubsystemKind::Dsp => "dsp",
            SubsystemKind::RpcServer => "rpc server",
            SubsystemKind::ServiceManager => "service manager",
            SubsystemKind::ArchiveManager => "archive manager",
            SubsystemKind::GdbStub => "gdb stub",
            SubsystemKind::Video => "video core",
            SubsystemKind::CheatEngine => "cheat engine",
            SubsystemKind::CustomTexCache => "custom texture cache",
        };
        f.write_str(name)
    }
}

/// Init/shutdown hooks of an external collaborator.
pub trait Subsystem: Send {
    fn kind(&self) -> SubsystemKind;

    fn init(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}

/// Initialized subsystems, torn down in exact reverse order of bring-up.
#[derive(Default)]
pub struct SubsystemStack {
    entries: Vec<Box<dyn Subsystem>>,
}

impl SubsystemStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `subsystem` and keep it on success. A subsystem that fails
    /// to initialize is dropped without a shutdown call.
    pub fn bring_up(&mut self, mut subsystem: Box<dyn Subsystem>) -> Result<(), SubsystemError> {
        subsystem.init()?;
        log::debug!("{} initialized", subsystem.kind());
        self.entries.push(subsystem);
        Ok(())
    }

    /// Shut down and release every subsystem, newest first.
    pub fn shutdown_all(&mut self) {
        while let Some(mut subsystem) = self.entries.pop() {
            subsystem.shutdown();
            log::debug!("{} shut down", subsystem.kind());
        }
    }

    pub fn contains(&self, kind: SubsystemKind) -> bool {
        self.entries.iter().any(|s| s.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<SubsystemKind> {
        self.entries.iter().map(|s| s.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for SubsystemStack {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

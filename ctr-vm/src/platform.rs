//! Host-side collaborators a session is built from.

use crate::cpu::{BackendKind, CoreId, CpuBackend};
use crate::kernel::{Kernel, KernelConfig};
use crate::loader::{self, Loader};
use crate::settings::Settings;
use crate::subsystem::{Subsystem, SubsystemKind};
use crate::telemetry::TelemetryField;
use std::path::Path;

/// Peripheral devices ticked once per scheduling step.
pub trait Hardware: Send {
    fn init(&mut self) {}

    /// Called once per step, after every core has taken its turn.
    fn update(&mut self);

    fn shutdown(&mut self) {}
}

/// What a multiplayer room is told about the local session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfo {
    pub name: String,
    pub program_id: u64,
}

/// Membership in a multiplayer room.
pub trait RoomMember {
    fn send_game_info(&mut self, info: GameInfo);
}

/// Factory for every collaborator of a session.
pub trait Platform: Send {
    fn create_kernel(&mut self, config: &KernelConfig) -> Box<dyn Kernel>;

    fn create_cpu(&mut self, core: CoreId, kind: BackendKind) -> Box<dyn CpuBackend>;

    fn create_hardware(&mut self) -> Box<dyn Hardware>;

    /// Build a lifecycle-only collaborator. The DSP variant is taken from
    /// `settings.dsp_kind()`.
    fn create_subsystem(&mut self, kind: SubsystemKind, settings: &Settings) -> Box<dyn Subsystem>;

    fn get_loader(&mut self, path: &Path) -> Option<Box<dyn Loader>> {
        loader::get_loader(path)
    }

    /// Receive the fields of a finished session.
    fn submit_telemetry(&mut self, fields: Vec<TelemetryField>) {
        for field in &fields {
            log::debug!("telemetry {:?} {} = {}", field.field_type, field.name, field.value);
        }
    }

    fn room_member(&mut self) -> Option<&mut dyn RoomMember> {
        None
    }
}

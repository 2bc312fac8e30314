//! Multi-core virtual-time scheduler for a handheld console emulator.
//!
//! [`System`] owns one session: a [`GlobalClock`](timing::GlobalClock), one
//! [`VirtualCore`](cpu::VirtualCore) per emulated processor, and the external
//! collaborators supplied by a [`Platform`]. Each call to
//! [`System::run_loop`] runs one scheduling step.

pub mod control;
pub mod cpu;
pub mod error;
pub mod headless;
pub mod kernel;
pub mod loader;
pub mod perf_stats;
pub mod platform;
pub mod scheduler;
pub mod settings;
pub mod subsystem;
pub mod system;
pub mod telemetry;
pub mod timing;

pub use control::{SessionControl, SharedSessionControl};
pub use error::{LoaderError, ResultStatus, SubsystemError, SystemError};
pub use platform::Platform;
pub use scheduler::{Machine, SchedulerConfig, StepReport, SyncMode};
pub use settings::{Settings, TitleOverrides};
pub use system::{SessionState, System};

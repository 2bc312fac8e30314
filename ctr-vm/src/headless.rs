//! Deterministic stand-in collaborators.
//!
//! Cores burn whatever budget they are given and yield every few turns, the
//! kernel round-robins a fixed set of threads per core, and every device is a
//! no-op. Used by the `ctr-vm` binary and by lifecycle tests.

use crate::cpu::{BackendKind, CoreId, CpuBackend, RunOutcome};
use crate::kernel::{Kernel, KernelConfig, Process, ThreadId, ThreadManager};
use crate::platform::{Hardware, Platform};
use crate::settings::{DspKind, Settings};
use crate::subsystem::{Subsystem, SubsystemKind};
use crate::telemetry::TelemetryField;
use crate::timing::Ticks;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Backend that executes its full budget and asks for a thread switch every
/// `yield_every` turns.
pub struct HeadlessCpu {
    core: CoreId,
    kind: BackendKind,
    yield_every: u64,
    turns: u64,
    executed: Ticks,
}

impl HeadlessCpu {
    pub fn new(core: CoreId, kind: BackendKind, yield_every: u64) -> Self {
        Self {
            core,
            kind,
            yield_every,
            turns: 0,
            executed: 0,
        }
    }

    pub fn executed(&self) -> Ticks {
        self.executed
    }
}

impl CpuBackend for HeadlessCpu {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn run(&mut self, budget: Ticks) -> RunOutcome {
        self.turns += 1;
        self.executed += budget;
        let outcome = RunOutcome::completed(budget);
        if self.yield_every > 0 && self.turns % self.yield_every == 0 {
            log::trace!("Core {} yielding after {} turns", self.core, self.turns);
            outcome.with_reschedule()
        } else {
            outcome
        }
    }
}

/// Round-robin thread queue of one core.
#[derive(Debug, Default)]
pub struct RoundRobin {
    threads: Vec<ThreadId>,
    current: usize,
    switches: u64,
}

impl RoundRobin {
    pub fn spawn(&mut self, thread: ThreadId) {
        self.threads.push(thread);
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }
}

impl ThreadManager for RoundRobin {
    fn current_thread(&self) -> Option<ThreadId> {
        self.threads.get(self.current).copied()
    }

    fn reschedule(&mut self) {
        self.switches += 1;
        if !self.threads.is_empty() {
            self.current = (self.current + 1) % self.threads.len();
        }
    }
}

/// Kernel that starts the loaded program's main thread on core 0.
pub struct HeadlessKernel {
    config: KernelConfig,
    managers: Vec<RoundRobin>,
    running_core: CoreId,
    process: Option<Process>,
    next_thread: ThreadId,
}

impl HeadlessKernel {
    pub fn new(config: KernelConfig) -> Self {
        let managers = (0..config.num_cores).map(|_| RoundRobin::default()).collect();
        Self {
            config,
            managers,
            running_core: 0,
            process: None,
            next_thread: 1,
        }
    }

    pub fn config(&self) -> KernelConfig {
        self.config
    }

    /// Create a thread on `core` and return its id.
    pub fn spawn_thread(&mut self, core: CoreId) -> Option<ThreadId> {
        let manager = self.managers.get_mut(core)?;
        let thread = self.next_thread;
        self.next_thread += 1;
        manager.spawn(thread);
        Some(thread)
    }

    pub fn running_core(&self) -> CoreId {
        self.running_core
    }

    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }
}

impl Kernel for HeadlessKernel {
    fn set_running_core(&mut self, core: CoreId) {
        self.running_core = core;
    }

    fn thread_manager(&mut self, core: CoreId) -> &mut dyn ThreadManager {
        &mut self.managers[core]
    }

    fn set_current_process(&mut self, process: Process) {
        log::debug!(
            "Starting process {} at entry 0x{:x}",
            process.name,
            process.entry_point
        );
        self.process = Some(process);
        self.spawn_thread(0);
    }

    fn shutdown(&mut self) {
        self.managers.clear();
        self.process = None;
    }
}

/// Counts peripheral ticks.
#[derive(Debug, Default)]
pub struct HeadlessHardware {
    updates: Arc<AtomicU64>,
}

impl HeadlessHardware {
    pub fn new(updates: Arc<AtomicU64>) -> Self {
        Self { updates }
    }
}

impl Hardware for HeadlessHardware {
    fn update(&mut self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// Subsystem without behaviour.
pub struct NullSubsystem {
    kind: SubsystemKind,
}

impl NullSubsystem {
    pub fn new(kind: SubsystemKind) -> Self {
        Self { kind }
    }
}

impl Subsystem for NullSubsystem {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }
}

/// Self-contained platform with no host devices.
pub struct HeadlessPlatform {
    yield_every: u64,
    hardware_updates: Arc<AtomicU64>,
    last_telemetry: Vec<TelemetryField>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self {
            yield_every: 4,
            hardware_updates: Arc::new(AtomicU64::new(0)),
            last_telemetry: Vec::new(),
        }
    }

    /// Make every core yield after this many turns (0 disables yielding).
    pub fn with_yield_every(mut self, turns: u64) -> Self {
        self.yield_every = turns;
        self
    }

    /// Peripheral ticks seen across every session.
    pub fn hardware_updates(&self) -> u64 {
        self.hardware_updates.load(Ordering::Relaxed)
    }

    /// Telemetry handed over by the most recent shutdown.
    pub fn last_telemetry(&self) -> &[TelemetryField] {
        &self.last_telemetry
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HeadlessPlatform {
    fn create_kernel(&mut self, config: &KernelConfig) -> Box<dyn Kernel> {
        Box::new(HeadlessKernel::new(*config))
    }

    fn create_cpu(&mut self, core: CoreId, kind: BackendKind) -> Box<dyn CpuBackend> {
        Box::new(HeadlessCpu::new(core, kind, self.yield_every))
    }

    fn create_hardware(&mut self) -> Box<dyn Hardware> {
        Box::new(HeadlessHardware::new(Arc::clone(&self.hardware_updates)))
    }

    fn create_subsystem(&mut self, kind: SubsystemKind, settings: &Settings) -> Box<dyn Subsystem> {
        if kind == SubsystemKind::Dsp {
            match settings.dsp_kind() {
                DspKind::Hle => log::debug!("Using HLE DSP"),
                DspKind::Lle { multithread } => {
                    log::debug!("Using LLE DSP (multithread: {})", multithread)
                }
            }
        }
        Box::new(NullSubsystem::new(kind))
    }

    fn submit_telemetry(&mut self, fields: Vec<TelemetryField>) {
        for field in &fields {
            log::debug!("telemetry {} = {}", field.name, field.value);
        }
        self.last_telemetry = fields;
    }
}

//! Run-loop orchestration.
//!
//! Each call to [`Machine::step`] is one scheduling step:
//!
//! 1. Measure how far every core's timer trails the global clock.
//! 2. If the worst lag is above the catch-up threshold, only that core takes a
//!    turn and the global clock stays put. Otherwise every core is brought up
//!    to the global clock, all cores are granted the same bounded slice, each
//!    takes a turn in core order, and the global clock advances by the slice.
//! 3. Peripheral hardware is ticked once.
//! 4. Cores that asked for a thread switch during the step are rescheduled.
//!
//! A core whose kernel thread manager has no current thread idles instead of
//! running, and always asks for a reschedule.

use crate::cpu::{CoreId, VirtualCore};
use crate::kernel::Kernel;
use crate::platform::Hardware;
use crate::timing::{CATCHUP_THRESHOLD, GlobalClock, MAX_SLICE_LENGTH, Ticks};
use serde::{Deserialize, Serialize};

/// Tunables of the orchestration algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lag above which a single core is caught up on its own.
    pub catchup_threshold: Ticks,
    /// Upper bound on a grouped slice.
    pub max_slice_length: Ticks,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catchup_threshold: CATCHUP_THRESHOLD,
            max_slice_length: MAX_SLICE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// One lagging core ran alone; the global clock did not move.
    Catchup,
    /// Every core ran the same slice and the global clock followed.
    Grouped,
}

/// What happened during one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub mode: SyncMode,
    /// Largest lag behind the global clock seen at step entry.
    pub max_delay: Ticks,
    /// Ticks granted on top of the lag: the grouped slice, or the distance
    /// the caught-up core was moved.
    pub slice: Ticks,
    pub executed: Vec<CoreId>,
    pub idled: Vec<CoreId>,
    pub rescheduled: Vec<CoreId>,
}

impl StepReport {
    fn new(max_delay: Ticks) -> Self {
        Self {
            mode: SyncMode::Grouped,
            max_delay,
            slice: 0,
            executed: Vec::new(),
            idled: Vec::new(),
            rescheduled: Vec::new(),
        }
    }
}

/// The scheduled half of a session: global clock, cores, kernel and
/// peripheral hook.
pub struct Machine {
    clock: GlobalClock,
    cores: Vec<VirtualCore>,
    kernel: Box<dyn Kernel>,
    hardware: Box<dyn Hardware>,
    config: SchedulerConfig,
    running_core: CoreId,
    reschedule_pending: bool,
}

impl Machine {
    pub fn new(
        clock: GlobalClock,
        cores: Vec<VirtualCore>,
        mut kernel: Box<dyn Kernel>,
        hardware: Box<dyn Hardware>,
        mut config: SchedulerConfig,
    ) -> Self {
        if config.max_slice_length < 1 {
            log::warn!("Ignoring non-positive max slice length {}", config.max_slice_length);
            config.max_slice_length = MAX_SLICE_LENGTH;
        }
        kernel.set_running_core(0);
        Self {
            clock,
            cores,
            kernel,
            hardware,
            config,
            running_core: 0,
            reschedule_pending: false,
        }
    }

    /// Run one scheduling step.
    pub fn step(&mut self) -> StepReport {
        let global = self.clock.ticks();
        let mut max_delay = 0;
        let mut lagging = None;
        for core in &self.cores {
            let delay = global - core.timer().ticks();
            if delay > max_delay {
                max_delay = delay;
                lagging = Some(core.id());
            }
        }

        let mut report = StepReport::new(max_delay);
        match lagging {
            Some(id) if max_delay > self.config.catchup_threshold => {
                self.catch_up(id, max_delay, &mut report)
            }
            _ => self.run_grouped(&mut report),
        }

        self.hardware.update();
        report.rescheduled = self.reschedule();

        log::trace!(
            "{:?} step: slice={} executed={:?} idled={:?} global={}",
            report.mode,
            report.slice,
            report.executed,
            report.idled,
            self.clock.ticks()
        );
        report
    }

    /// Let the most lagging core absorb its whole debt alone. Core events
    /// passed on the way fire late after its turn.
    fn catch_up(&mut self, id: CoreId, delay: Ticks, report: &mut StepReport) {
        self.cores[id].timer_mut().advance(delay);

        report.mode = SyncMode::Catchup;
        report.slice = delay;
        self.take_turn(id, report);
    }

    fn run_grouped(&mut self, report: &mut StepReport) {
        let global = self.clock.ticks();
        for core in &mut self.cores {
            let delay = global - core.timer().ticks();
            if delay > 0 {
                core.timer_mut().advance(delay);
            }
        }

        let slice = self.max_slice();
        for core in &mut self.cores {
            core.timer_mut().advance(slice);
        }
        for id in 0..self.cores.len() {
            self.take_turn(id, report);
        }
        self.clock.advance(slice);

        report.mode = SyncMode::Grouped;
        report.slice = slice;
    }

    /// Smallest distance to any pending event, capped by the configured
    /// maximum slice.
    fn max_slice(&self) -> Ticks {
        let bound = self.config.max_slice_length;
        let global = self.clock.ticks();
        let mut slice = match self.clock.next_event_tick() {
            Some(next) if next > global => bound.min(next - global),
            _ => bound,
        };
        for core in &self.cores {
            slice = slice.min(core.timer().max_slice_length_within(bound));
        }
        slice
    }

    fn take_turn(&mut self, id: CoreId, report: &mut StepReport) {
        self.running_core = id;
        self.kernel.set_running_core(id);
        let has_thread = self.kernel.thread_manager(id).current_thread().is_some();

        let registry = self.clock.registry_mut();
        let core = &mut self.cores[id];
        if has_thread {
            if core.run(registry).reschedule {
                self.reschedule_pending = true;
            }
            report.executed.push(id);
        } else {
            log::trace!("Core {} idling", id);
            core.idle(registry);
            core.prepare_reschedule();
            self.reschedule_pending = true;
            report.idled.push(id);
        }
    }

    /// Flag the running core for a thread switch at the end of the step.
    pub fn prepare_reschedule(&mut self) {
        if let Some(core) = self.cores.get_mut(self.running_core) {
            core.prepare_reschedule();
            self.reschedule_pending = true;
        }
    }

    /// Reschedule every flagged core exactly once and clear the flags.
    /// Returns the cores that were rescheduled.
    pub fn reschedule(&mut self) -> Vec<CoreId> {
        self.reschedule_pending = false;
        let mut rescheduled = Vec::new();
        for core in &mut self.cores {
            if core.take_reschedule() {
                let id = core.id();
                log::trace!("Reschedule core {}", id);
                self.kernel.thread_manager(id).reschedule();
                rescheduled.push(id);
            }
        }
        rescheduled
    }

    pub fn reschedule_pending(&self) -> bool {
        self.reschedule_pending
    }

    pub fn clock(&self) -> &GlobalClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut GlobalClock {
        &mut self.clock
    }

    pub fn cores(&self) -> &[VirtualCore] {
        &self.cores
    }

    pub fn core(&self, id: CoreId) -> Option<&VirtualCore> {
        self.cores.get(id)
    }

    pub fn core_mut(&mut self, id: CoreId) -> Option<&mut VirtualCore> {
        self.cores.get_mut(id)
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    /// Core that took the most recent turn.
    pub fn running_core(&self) -> CoreId {
        self.running_core
    }

    pub fn kernel_mut(&mut self) -> &mut dyn Kernel {
        self.kernel.as_mut()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Tear down in reverse order of construction: hardware, cores, kernel.
    pub fn shutdown(mut self) {
        self.hardware.shutdown();
        self.cores.clear();
        self.kernel.shutdown();
    }
}

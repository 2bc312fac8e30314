use super::{BackendKind, CoreId, CpuBackend, RunOutcome};
use crate::timing::{EventRegistry, LogicalTimer};

/// One emulated processor: an execution backend plus its logical timer.
pub struct VirtualCore {
    id: CoreId,
    timer: LogicalTimer,
    backend: Box<dyn CpuBackend>,
    reschedule_pending: bool,
    runs: u64,
    idles: u64,
}

impl VirtualCore {
    pub fn new(id: CoreId, backend: Box<dyn CpuBackend>) -> Self {
        Self {
            id,
            timer: LogicalTimer::new(id),
            backend,
            reschedule_pending: false,
            runs: 0,
            idles: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn timer(&self) -> &LogicalTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut LogicalTimer {
        &mut self.timer
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Execute the timer's outstanding budget, then fire due core events.
    pub fn run(&mut self, registry: &mut EventRegistry) -> RunOutcome {
        let budget = self.timer.downcount();
        let outcome = if budget > 0 {
            self.backend.run(budget)
        } else {
            RunOutcome::completed(0)
        };

        let shortfall = self.timer.retire(outcome.executed);
        if shortfall > 0 {
            log::trace!("Core {} stopped {} ticks short of its slice", self.id, shortfall);
        }
        if outcome.reschedule {
            self.prepare_reschedule();
        }
        self.runs += 1;
        self.timer.dispatch_due(registry);
        outcome
    }

    /// Skip the outstanding budget without executing, then fire due core events.
    pub fn idle(&mut self, registry: &mut EventRegistry) {
        self.timer.idle();
        self.idles += 1;
        self.timer.dispatch_due(registry);
    }

    /// Ask for a thread switch on this core at the end of the current step.
    pub fn prepare_reschedule(&mut self) {
        self.reschedule_pending = true;
    }

    pub fn reschedule_pending(&self) -> bool {
        self.reschedule_pending
    }

    /// Consume the reschedule flag.
    pub fn take_reschedule(&mut self) -> bool {
        std::mem::take(&mut self.reschedule_pending)
    }

    /// Number of turns spent executing.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Number of turns spent idle.
    pub fn idles(&self) -> u64 {
        self.idles
    }
}

//! Per-core logical timer.

use super::event::{EventQueue, EventRegistry, EventTypeId};
use super::{MAX_SLICE_LENGTH, Ticks};

/// Local clock of one virtual core.
///
/// `ticks` is how far the owning core's timeline has progressed. Advancing
/// the timer also grants the same amount as execution budget (`downcount`);
/// the core then either runs that budget or idles through it. Events the core
/// schedules live in the timer's own queue and fire once `ticks` reaches them.
#[derive(Debug)]
pub struct LogicalTimer {
    core: usize,
    ticks: Ticks,
    downcount: Ticks,
    executed_ticks: Ticks,
    idled_ticks: Ticks,
    events: EventQueue,
}

impl LogicalTimer {
    pub fn new(core: usize) -> Self {
        Self {
            core,
            ticks: 0,
            downcount: 0,
            executed_ticks: 0,
            idled_ticks: 0,
            events: EventQueue::new(),
        }
    }

    /// Index of the core this timer belongs to.
    pub fn core(&self) -> usize {
        self.core
    }

    #[inline]
    pub fn ticks(&self) -> Ticks {
        self.ticks
    }

    /// Budget granted but not yet run or idled.
    #[inline]
    pub fn downcount(&self) -> Ticks {
        self.downcount
    }

    /// Total ticks spent executing guest code.
    pub fn executed_ticks(&self) -> Ticks {
        self.executed_ticks
    }

    /// Total ticks skipped while the core had nothing to run.
    pub fn idled_ticks(&self) -> Ticks {
        self.idled_ticks
    }

    /// Move local time forward by `delta` and grant it as budget.
    pub fn advance(&mut self, delta: Ticks) {
        debug_assert!(delta >= 0, "timer {} advanced by negative delta {}", self.core, delta);
        let delta = delta.max(0);
        self.ticks += delta;
        self.downcount += delta;
    }

    /// Skip the outstanding budget without executing anything.
    ///
    /// A granted slice never reaches past the timer's next event, so after
    /// idling the timer rests at or before that event, and exactly on it when
    /// the event is what bounded the slice. Returns the ticks skipped.
    pub fn idle(&mut self) -> Ticks {
        let skipped = self.downcount;
        self.idled_ticks += skipped;
        self.downcount = 0;
        skipped
    }

    /// Settle the outstanding budget after the core ran `executed` ticks of it.
    ///
    /// A backend that returned early leaves the timer where execution stopped;
    /// the shortfall becomes lag against the global clock. Returns the
    /// shortfall.
    pub fn retire(&mut self, executed: Ticks) -> Ticks {
        let budget = self.downcount.max(0);
        let executed = executed.clamp(0, budget);
        let shortfall = budget - executed;
        self.ticks -= shortfall;
        self.executed_ticks += executed;
        self.downcount = 0;
        shortfall
    }

    /// Largest delta the timer can advance before its next event fires, or
    /// [`MAX_SLICE_LENGTH`] when nothing is pending.
    pub fn max_slice_length(&self) -> Ticks {
        self.max_slice_length_within(MAX_SLICE_LENGTH)
    }

    /// Like [`max_slice_length`](Self::max_slice_length) with a caller-chosen upper bound.
    pub fn max_slice_length_within(&self, bound: Ticks) -> Ticks {
        match self.events.next_tick_after(self.ticks) {
            Some(time) => (time - self.ticks).min(bound),
            None => bound,
        }
    }

    /// Schedule an event `cycles_into_future` ticks from the timer's current time.
    pub fn schedule_event(&mut self, cycles_into_future: Ticks, event_type: EventTypeId, userdata: u64) {
        let time = self.ticks + cycles_into_future.max(0);
        self.events.schedule(time, event_type, userdata);
    }

    pub fn unschedule_event(&mut self, event_type: EventTypeId, userdata: u64) -> usize {
        self.events.unschedule(event_type, userdata)
    }

    /// Trigger tick of the next pending event.
    pub fn next_event_tick(&self) -> Option<Ticks> {
        self.events.next_tick()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Fire every event that is due at the timer's current tick.
    pub fn dispatch_due(&mut self, registry: &mut EventRegistry) -> usize {
        self.events.dispatch(registry, self.ticks)
    }
}

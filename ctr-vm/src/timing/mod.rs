//! Virtual time.
//!
//! A single [`GlobalClock`] is the authoritative tick counter of the session.
//! Every virtual core carries its own [`LogicalTimer`] which may trail the
//! global clock; the run loop brings them back in line at each step.

mod event;
mod timer;

pub use event::{EventCallback, EventQueue, EventRegistry, EventTypeId, ScheduledEvent};
pub use timer::LogicalTimer;

/// Smallest unit of emulated time (one ARM11 cycle).
pub type Ticks = i64;

/// ARM11 clock rate in Hz.
pub const BASE_CLOCK_RATE_ARM11: u64 = 268_111_856;

/// Upper bound on how far a grouped step advances the cores.
pub const MAX_SLICE_LENGTH: Ticks = 20_000;

/// Lag beyond which a single core is caught up on its own.
pub const CATCHUP_THRESHOLD: Ticks = 4096;

pub const fn ms_to_cycles(ms: u64) -> Ticks {
    (BASE_CLOCK_RATE_ARM11 as u128 * ms as u128 / 1_000) as Ticks
}

pub const fn us_to_cycles(us: u64) -> Ticks {
    (BASE_CLOCK_RATE_ARM11 as u128 * us as u128 / 1_000_000) as Ticks
}

pub const fn cycles_to_us(cycles: Ticks) -> u64 {
    if cycles <= 0 {
        return 0;
    }
    (cycles as u128 * 1_000_000 / BASE_CLOCK_RATE_ARM11 as u128) as u64
}

/// Session-wide clock plus the queue of events not bound to any core.
///
/// Only the run loop moves it, and only forward.
pub struct GlobalClock {
    ticks: Ticks,
    events: EventQueue,
    registry: EventRegistry,
}

impl GlobalClock {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            events: EventQueue::new(),
            registry: EventRegistry::new(),
        }
    }

    #[inline]
    pub fn ticks(&self) -> Ticks {
        self.ticks
    }

    /// Emulated time in microseconds.
    pub fn global_time_us(&self) -> u64 {
        cycles_to_us(self.ticks)
    }

    /// Register a named event type usable by the clock and every core timer.
    pub fn register_event<F>(&mut self, name: &str, callback: F) -> EventTypeId
    where
        F: FnMut(u64, Ticks) + Send + 'static,
    {
        self.registry.register(name, callback)
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EventRegistry {
        &mut self.registry
    }

    /// Schedule an event relative to the global tick count.
    pub fn schedule_event(&mut self, cycles_into_future: Ticks, event_type: EventTypeId, userdata: u64) {
        let time = self.ticks + cycles_into_future.max(0);
        self.events.schedule(time, event_type, userdata);
    }

    pub fn unschedule_event(&mut self, event_type: EventTypeId, userdata: u64) -> usize {
        self.events.unschedule(event_type, userdata)
    }

    pub fn next_event_tick(&self) -> Option<Ticks> {
        self.events.next_tick()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Move the clock forward by exactly `delta` and fire every global event
    /// that became due, in trigger order. Returns the number fired.
    pub fn advance(&mut self, delta: Ticks) -> usize {
        debug_assert!(delta >= 0, "global clock advanced by negative delta {}", delta);
        self.ticks += delta.max(0);
        self.events.dispatch(&mut self.registry, self.ticks)
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new()
    }
}

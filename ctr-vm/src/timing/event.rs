//! Time-triggered events.
//!
//! Events are registered once by name and scheduled as (trigger tick, type,
//! userdata) triples. The queue is a min-heap ordered by trigger tick; events
//! sharing a tick come out in the order they were scheduled.

use super::Ticks;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Callback invoked when an event fires: `(userdata, cycles_late)`.
pub type EventCallback = Box<dyn FnMut(u64, Ticks) + Send>;

/// Handle to a registered event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTypeId(usize);

struct EventType {
    name: String,
    callback: EventCallback,
}

/// Named event types and their callbacks.
#[derive(Default)]
pub struct EventRegistry {
    types: Vec<EventType>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event type. Registering an existing name replaces its
    /// callback and returns the existing handle.
    pub fn register<F>(&mut self, name: &str, callback: F) -> EventTypeId
    where
        F: FnMut(u64, Ticks) + Send + 'static,
    {
        if let Some(idx) = self.types.iter().position(|t| t.name == name) {
            log::warn!("Event type {} already registered, replacing callback", name);
            self.types[idx].callback = Box::new(callback);
            return EventTypeId(idx);
        }
        self.types.push(EventType {
            name: name.to_string(),
            callback: Box::new(callback),
        });
        EventTypeId(self.types.len() - 1)
    }

    /// Look up a registered event type by name.
    pub fn find(&self, name: &str) -> Option<EventTypeId> {
        self.types.iter().position(|t| t.name == name).map(EventTypeId)
    }

    pub fn name(&self, id: EventTypeId) -> Option<&str> {
        self.types.get(id.0).map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn fire(&mut self, event: &ScheduledEvent, now: Ticks) {
        match self.types.get_mut(event.event_type.0) {
            Some(t) => {
                log::trace!("Firing event {} at {} (late by {})", t.name, now, now - event.time);
                (t.callback)(event.userdata, now - event.time);
            }
            None => log::error!("Dropping event with unknown type {:?}", event.event_type),
        }
    }
}

/// A pending entry in an [`EventQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Tick at which the event becomes due.
    pub time: Ticks,
    /// Insertion sequence, breaks ties between equal `time`s.
    pub seq: u64,
    pub event_type: EventTypeId,
    pub userdata: u64,
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the earliest event on top.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of scheduled events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event to fire at absolute tick `time`.
    pub fn schedule(&mut self, time: Ticks, event_type: EventTypeId, userdata: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent {
            time,
            seq,
            event_type,
            userdata,
        });
    }

    /// Remove every pending event matching `(event_type, userdata)`.
    /// Returns the number of events removed.
    pub fn unschedule(&mut self, event_type: EventTypeId, userdata: u64) -> usize {
        let before = self.heap.len();
        self.heap
            .retain(|e| !(e.event_type == event_type && e.userdata == userdata));
        before - self.heap.len()
    }

    /// Trigger tick of the earliest pending event.
    pub fn next_tick(&self) -> Option<Ticks> {
        self.heap.peek().map(|e| e.time)
    }

    /// Trigger tick of the earliest event strictly after `now`.
    pub fn next_tick_after(&self, now: Ticks) -> Option<Ticks> {
        self.heap.iter().map(|e| e.time).filter(|&t| t > now).min()
    }

    /// Pop the earliest event if it is due at `now`.
    pub fn pop_due(&mut self, now: Ticks) -> Option<ScheduledEvent> {
        match self.heap.peek() {
            Some(e) if e.time <= now => self.heap.pop(),
            _ => None,
        }
    }

    /// Fire every event due at `now`, in trigger order. Returns how many fired.
    pub fn dispatch(&mut self, registry: &mut EventRegistry, now: Ticks) -> usize {
        let mut fired = 0;
        while let Some(event) = self.pop_due(now) {
            registry.fire(&event, now);
            fired += 1;
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_registry() -> (EventRegistry, EventTypeId, Arc<Mutex<Vec<(u64, Ticks)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let mut registry = EventRegistry::new();
        let id = registry.register("test", move |userdata, late| {
            sink.lock().unwrap().push((userdata, late));
        });
        (registry, id, log)
    }

    #[test]
    fn test_events_fire_in_tick_order() {
        let (mut registry, id, log) = recording_registry();
        let mut queue = EventQueue::new();
        queue.schedule(300, id, 3);
        queue.schedule(100, id, 1);
        queue.schedule(200, id, 2);

        assert_eq!(queue.dispatch(&mut registry, 250), 2);
        assert_eq!(*log.lock().unwrap(), vec![(1, 150), (2, 50)]);
        assert_eq!(queue.next_tick(), Some(300));
    }

    #[test]
    fn test_equal_ticks_fire_in_insertion_order() {
        let (mut registry, id, log) = recording_registry();
        let mut queue = EventQueue::new();
        for userdata in [7, 3, 9, 1] {
            queue.schedule(500, id, userdata);
        }
        queue.dispatch(&mut registry, 500);

        let order: Vec<u64> = log.lock().unwrap().iter().map(|(u, _)| *u).collect();
        assert_eq!(order, vec![7, 3, 9, 1]);
    }

    #[test]
    fn test_unschedule_matches_type_and_userdata() {
        let (mut registry, id, _log) = recording_registry();
        let other = registry.register("other", |_, _| {});
        let mut queue = EventQueue::new();
        queue.schedule(10, id, 1);
        queue.schedule(20, id, 1);
        queue.schedule(30, id, 2);
        queue.schedule(40, other, 1);

        assert_eq!(queue.unschedule(id, 1), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_tick(), Some(30));
    }

    #[test]
    fn test_next_tick_after_skips_due_events() {
        let (_registry, id, _log) = recording_registry();
        let mut queue = EventQueue::new();
        queue.schedule(100, id, 0);
        queue.schedule(400, id, 0);

        assert_eq!(queue.next_tick_after(100), Some(400));
        assert_eq!(queue.next_tick_after(50), Some(100));
        assert_eq!(queue.next_tick_after(400), None);
    }

    #[test]
    fn test_register_same_name_reuses_handle() {
        let mut registry = EventRegistry::new();
        let a = registry.register("vblank", |_, _| {});
        let b = registry.register("vblank", |_, _| {});
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("vblank"), Some(a));
        assert_eq!(registry.name(a), Some("vblank"));
    }
}

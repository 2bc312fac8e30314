//! Cross-thread session requests.
//!
//! A front-end thread raises reset or shutdown requests; the run loop
//! consumes each one at a single point per step with an atomic swap, so a
//! request is acted on at most once and never lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Request flags shared between the orchestration thread and its controllers.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct SessionControl {
    reset_requested: AtomicBool,
    shutdown_requested: AtomicBool,
}

pub type SharedSessionControl = Arc<SessionControl>;

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run loop to rebuild the session from the same program.
    #[inline]
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// Ask the run loop to stop at the end of the current step.
    #[inline]
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    /// Consume a pending reset request.
    #[inline]
    pub fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    /// Consume a pending shutdown request.
    #[inline]
    pub fn take_shutdown(&self) -> bool {
        self.shutdown_requested.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_reset_requested(&self) -> bool {
        self.reset_requested.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Drop any requests left over from a previous session.
    pub fn clear(&self) {
        self.reset_requested.store(false, Ordering::Release);
        self.shutdown_requested.store(false, Ordering::Release);
    }
}

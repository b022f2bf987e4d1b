//! Waitable user-space events.
//!
//! Used where a waitable is needed outside the transport's completion queue:
//! context readiness, connect synchronization, writer-idle waits.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A manually-reset event: once signalled, every waiter past and future
/// proceeds until [`Event::clear`] is called.
#[derive(Default)]
pub struct Event {
    signalled: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event and wake all waiters.
    pub fn signal(&self) {
        let mut signalled = self.signalled.lock().expect("event mutex");
        *signalled = true;
        drop(signalled);
        self.cv.notify_all();
    }

    /// Reset to the unsignalled state.
    pub fn clear(&self) {
        *self.signalled.lock().expect("event mutex") = false;
    }

    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.signalled.lock().expect("event mutex")
    }

    /// Block until the event is signalled.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock().expect("event mutex");
        while !*signalled {
            signalled = self.cv.wait(signalled).expect("event mutex");
        }
    }

    /// Block until the event is signalled or `timeout` elapses. Returns
    /// whether the event was signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut signalled = self.signalled.lock().expect("event mutex");
        while !*signalled {
            let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now())
            else {
                return false;
            };
            let (guard, result) = self
                .cv
                .wait_timeout(signalled, remaining)
                .expect("event mutex");
            signalled = guard;
            if result.timed_out() && !*signalled {
                return false;
            }
        }
        true
    }
}

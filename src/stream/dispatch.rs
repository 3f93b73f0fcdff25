use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::event::{StreamEvent, StreamState};
use crate::error::StreamError;

pub type EventCallback = Box<dyn FnMut(StreamEvent) + Send>;
pub type ErrorCallback = Box<dyn FnMut(StreamError) + Send>;

struct Sinks {
    on_event: EventCallback,
    on_error: ErrorCallback,
}

thread_local! {
    /// Dispatcher currently running a callback on this thread, 0 if none
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Restores the previous `DELIVERING` value even if a callback panics
struct DeliveringGuard {
    previous: usize,
}

impl DeliveringGuard {
    fn enter(id: usize) -> Self {
        Self {
            previous: DELIVERING.with(|d| d.replace(id)),
        }
    }
}

impl Drop for DeliveringGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// Serializes callback invocations and guarantees none run after `close`
/// returns.
///
/// Every delivery holds the sink lock and checks `closed` under it. `close`
/// sets the flag and then takes the lock, so it waits out any in-flight
/// callback on another thread. When `close` is called from inside a callback
/// the lock is already held by this thread; the flag alone is set and the
/// delivering frame drops the sinks on its way out.
pub(crate) struct Dispatcher {
    closed: AtomicBool,
    sinks: Mutex<Option<Sinks>>,
    state: watch::Sender<StreamState>,
}

impl Dispatcher {
    pub fn new(on_event: EventCallback, on_error: ErrorCallback) -> Self {
        let (state, _) = watch::channel(StreamState::Idle);
        Self {
            closed: AtomicBool::new(false),
            sinks: Mutex::new(Some(Sinks { on_event, on_error })),
            state,
        }
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sinks>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn event(&self, event: StreamEvent) {
        let mut guard = self.lock();
        self.deliver(&mut guard, |sinks| (sinks.on_event)(event));
    }

    pub fn error(&self, error: StreamError) {
        let mut guard = self.lock();
        self.deliver(&mut guard, |sinks| (sinks.on_error)(error));
    }

    /// Record a state transition and announce it as a status event
    pub fn set_state(&self, state: StreamState) {
        let mut guard = self.lock();
        if self.is_closed() {
            return;
        }
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            self.deliver(&mut guard, |sinks| {
                (sinks.on_event)(StreamEvent::Status(state))
            });
        }
    }

    fn deliver(&self, guard: &mut MutexGuard<'_, Option<Sinks>>, f: impl FnOnce(&mut Sinks)) {
        if self.is_closed() {
            return;
        }
        let Some(sinks) = guard.as_mut() else {
            return;
        };

        {
            let _delivering = DeliveringGuard::enter(self.id());
            f(sinks);
        }

        if self.is_closed() {
            guard.take();
        }
    }

    /// Permanently silence all callbacks. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if DELIVERING.with(|d| d.get()) != self.id() {
            self.lock().take();
        }
        self.state.send_replace(StreamState::Closed);
    }
}

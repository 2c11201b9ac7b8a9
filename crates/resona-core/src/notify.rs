//! Engine notifications and subscription handles.
//!
//! Callbacks are registered against a [`NotificationHub`] and identified by
//! an explicit [`SubscriptionHandle`] that must be passed back to
//! unsubscribe. Notifications are delivered synchronously on the thread that
//! detected the condition — which may be the render thread for low-level
//! faults — so callback bodies must be cheap and non-blocking.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which subsystem produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The graph store / real-time processor.
    Graph,
    /// The linear processing chain.
    Chain,
    /// The device-coupled realtime engine.
    Realtime,
    /// The offline batch engine.
    Offline,
}

/// A notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A component's lifecycle state changed.
    StateChanged {
        /// Producing subsystem.
        origin: Origin,
        /// New state, human-readable.
        state: String,
    },
    /// An error was detected and handled.
    Error {
        /// Producing subsystem.
        origin: Origin,
        /// Error description.
        message: String,
    },
    /// Progress update for an offline task.
    Progress {
        /// Task identifier.
        task: u64,
        /// Completed fraction in `0.0..=1.0`.
        fraction: f32,
    },
    /// Smoothed input/output level update from the realtime engine.
    Levels {
        /// Input level, linear peak.
        input: f32,
        /// Output level, linear peak.
        output: f32,
    },
}

/// Identifies one registered callback.
///
/// Returned by [`NotificationHub::subscribe`] and consumed by
/// [`NotificationHub::unsubscribe`]. Dropping the handle does not
/// unsubscribe; removal is always explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Callback = Box<dyn Fn(&Notification) + Send>;

/// Registry of notification callbacks.
#[derive(Default)]
pub struct NotificationHub {
    callbacks: Mutex<HashMap<u64, Callback>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its handle.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Notification) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .expect("notification hub poisoned")
            .insert(id, Box::new(callback));
        SubscriptionHandle(id)
    }

    /// Removes a callback. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.callbacks
            .lock()
            .expect("notification hub poisoned")
            .remove(&handle.0)
            .is_some()
    }

    /// Delivers a notification to every registered callback, synchronously.
    pub fn notify(&self, notification: &Notification) {
        let callbacks = self.callbacks.lock().expect("notification hub poisoned");
        for callback in callbacks.values() {
            callback(notification);
        }
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .lock()
            .expect("notification hub poisoned")
            .len()
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

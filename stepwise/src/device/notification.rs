use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::StreamHandle;

/// Cross-stream signal created by its owning stream and waited on by consumers.
///
/// Activation is monotonic: once activated a notification stays activated for
/// the lifetime of the execution context that holds it.
#[derive(Debug)]
pub struct Notification {
    owner: StreamHandle,
    num_consumers: usize,
    activated: AtomicBool,
    waits: AtomicUsize,
}

impl Notification {
    pub fn new(owner: StreamHandle, num_consumers: usize) -> Self {
        Self {
            owner,
            num_consumers,
            activated: AtomicBool::new(false),
            waits: AtomicUsize::new(0),
        }
    }

    /// Handle of the stream that created this notification.
    pub fn owner(&self) -> StreamHandle {
        self.owner
    }

    pub fn num_consumers(&self) -> usize {
        self.num_consumers
    }

    /// Activate the notification. Returns true on the first activation only.
    pub fn activate(&self) -> bool {
        !self.activated.swap(true, Ordering::AcqRel)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Record that a consumer stream synchronised on this notification.
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of completed waits on this notification.
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::Acquire)
    }
}

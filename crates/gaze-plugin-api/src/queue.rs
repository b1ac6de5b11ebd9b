//! Cancellable bounded queue for source plugins.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Bounded hand-off between a source plugin's producer thread and the
/// pipeline worker's blocking pull.
///
/// `cancel` is sticky: once requested, every pending and future
/// `wait_and_pop` returns `None` until [`reset`](Self::reset) is called from
/// the source's next `init`. That guarantee is what lets the runtime tear a
/// source down without racing a blocked consumer.
pub struct SourceQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    cancelled: AtomicBool,
}

impl<T: Send> SourceQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        let (cancel_tx, cancel_rx) = bounded(1);
        Self {
            tx,
            rx,
            cancel_tx,
            cancel_rx,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Offer a value from the producer side. Returns false when the queue is
    /// full; the sample is dropped rather than blocking the producer.
    pub fn push(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    /// Block until a value arrives or the queue is cancelled.
    pub fn wait_and_pop(&self) -> Option<T> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        crossbeam_channel::select! {
            recv(self.rx) -> value => value.ok(),
            recv(self.cancel_rx) -> _ => None,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let _ = self.cancel_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear the cancel latch and drop any stale queued values.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        while self.cancel_rx.try_recv().is_ok() {}
        while self.rx.try_recv().is_ok() {}
    }
}

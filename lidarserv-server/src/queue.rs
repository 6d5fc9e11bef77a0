use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;

/// A bounded queue that never backpressures its producer: when full, the
/// oldest entry is dropped (and counted) to make room for the new one. Models
/// the persistence-queue policy in spec 5: a slow persist must not block
/// frame processing.
pub struct DropOldestQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: u64,
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        DropOldestQueue { tx, rx, dropped: 0 }
    }

    /// Enqueues `item`, dropping the oldest entry first if the queue is full.
    pub fn push(&mut self, item: T) {
        let mut pending = item;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    pending = returned;
                    if self.rx.try_recv().is_ok() {
                        self.dropped += 1;
                        warn!("persistence queue full, dropped oldest entry ({} total)", self.dropped);
                    }
                }
            }
        }
    }

    /// Drains everything currently queued, for a persistence collaborator to consume.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

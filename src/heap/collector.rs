//! Delivery of reclaim notifications: deferred queue and background collector thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use flume::Sender;
use parking_lot::Mutex;

use crate::identity::ObjectId;
use crate::observer::ReclaimCallback;

/// Callbacks owed to one reclaimed object.
pub(crate) struct Notification {
    pub(crate) id: ObjectId,
    pub(crate) callbacks: Vec<ReclaimCallback>,
}

impl Notification {
    /// Runs every callback. A panicking callback is logged and does not stop the rest.
    pub(crate) fn deliver(self) {
        let id = self.id;
        for callback in self.callbacks {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                tracing::error!(%id, "reclaim callback panicked");
            }
        }
        tracing::trace!(%id, "reclaim notification delivered");
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Notifications held back until the next explicit collection.
pub(crate) struct DeferredQueue {
    pending: Mutex<Vec<Notification>>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, notification: Notification) {
        self.pending.lock().push(notification);
    }

    /// Delivers queued notifications until none remain.
    ///
    /// Callbacks may reclaim further objects; those are delivered in the same
    /// call. Returns the number of notifications delivered.
    pub(crate) fn drain(&self, pending_counter: &AtomicUsize) -> usize {
        let mut delivered = 0;
        loop {
            let batch = std::mem::take(&mut *self.pending.lock());
            if batch.is_empty() {
                break;
            }
            for notification in batch {
                notification.deliver();
                pending_counter.fetch_sub(1, Ordering::AcqRel);
                delivered += 1;
            }
        }
        delivered
    }
}

enum Message {
    Reclaimed(Notification),
    Flush(Sender<()>),
}

/// Dedicated thread that delivers reclaim notifications off the mutator threads.
pub(crate) struct BackgroundCollector {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl BackgroundCollector {
    pub(crate) fn spawn(
        name: &str,
        capacity: usize,
        pending_counter: Arc<AtomicUsize>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = flume::bounded::<Message>(capacity.max(1));

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Exits once every sender is gone and the queue is drained.
                for message in receiver.iter() {
                    match message {
                        Message::Reclaimed(notification) => {
                            notification.deliver();
                            pending_counter.fetch_sub(1, Ordering::AcqRel);
                        }
                        Message::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                tracing::debug!("background collector stopped");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn sender(&self) -> Option<Sender<Message>> {
        self.sender.lock().clone()
    }

    /// Queues a notification for the collector thread.
    ///
    /// Hands the notification back when it must be delivered by the caller:
    /// the collector is stopped, or the caller is the collector thread itself
    /// (a full queue would otherwise never drain).
    pub(crate) fn submit(&self, notification: Notification) -> Result<(), Notification> {
        if self.on_worker_thread() {
            return Err(notification);
        }
        let Some(sender) = self.sender() else {
            return Err(notification);
        };
        match sender.send(Message::Reclaimed(notification)) {
            Ok(()) => Ok(()),
            Err(flume::SendError(Message::Reclaimed(notification))) => Err(notification),
            Err(flume::SendError(Message::Flush(_))) => Ok(()),
        }
    }

    /// Blocks until every notification queued before this call has been delivered.
    pub(crate) fn flush(&self) {
        if self.on_worker_thread() {
            return;
        }
        let Some(sender) = self.sender() else {
            return;
        };
        let (ack_tx, ack_rx) = flume::bounded(1);
        if sender.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Stops accepting work and waits for the thread to drain its queue.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if self.on_worker_thread() {
                // Joining ourselves would deadlock; the loop ends on its own.
                return;
            }
            if worker.join().is_err() {
                tracing::error!("background collector thread panicked");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::slots::SlotRef;
use crate::error::NetError;
use crate::Core::futex::{futex_wait, futex_wake_all};
use crate::Net::collaborators::ResponseCorrelator;
use crate::Net::Message::ReceivedMessage;

/// Callback for decoded messages of one (type, subtype).
pub trait MessageReceiver: Send + Sync {
    fn on_message(&self, message: &ReceivedMessage);
}

impl<F> MessageReceiver for F
where
    F: Fn(&ReceivedMessage) + Send + Sync,
{
    fn on_message(&self, message: &ReceivedMessage) {
        self(message)
    }
}

pub(crate) enum JobKind {
    Deliver,
    Response(Arc<dyn ResponseCorrelator>),
}

/// A decoded message on its way to a handler thread. Holds its receive slot
/// until the handler is done with it.
pub(crate) struct HandlerJob {
    pub received: ReceivedMessage,
    pub kind: JobKind,
    pub slot: SlotRef,
}

struct HandlerShared {
    queue: ArrayQueue<HandlerJob>,
    receivers: RwLock<HashMap<(u8, u8), Vec<Arc<dyn MessageReceiver>>>>,
    running: AtomicBool,
    /// Bumped on every submit. Futex word idle workers sleep on.
    signal: AtomicU32,
    idle: AtomicU32,
}

/// Pool of handler threads running receiver callbacks for decoded messages.
pub struct MessageHandlers {
    shared: Arc<HandlerShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl MessageHandlers {
    /// Start `threads` handler threads fed by a queue of `queue_depth` jobs.
    pub fn new(threads: usize, queue_depth: usize) -> Result<Arc<Self>, NetError> {
        if threads == 0 || queue_depth == 0 {
            return Err(NetError::config(
                "handler pool needs at least one thread and a non-empty queue",
            ));
        }
        let shared = Arc::new(HandlerShared {
            queue: ArrayQueue::new(queue_depth),
            receivers: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            signal: AtomicU32::new(0),
            idle: AtomicU32::new(0),
        });

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("dmxp-handler-{id}"))
                .spawn(move || worker_loop(id, &shared))?;
            workers.push(handle);
        }
        info!(threads, queue_depth, "message handler pool started");

        Ok(Arc::new(Self {
            shared,
            workers: Mutex::new(workers),
            threads,
        }))
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Jobs waiting for a handler thread.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Add a receiver for (type, subtype). Several receivers may share a key;
    /// each sees every message.
    pub fn register(&self, message_type: u8, subtype: u8, receiver: Arc<dyn MessageReceiver>) {
        self.shared
            .receivers
            .write()
            .entry((message_type, subtype))
            .or_default()
            .push(receiver);
        debug!(message_type, subtype, "message receiver registered");
    }

    /// Remove every receiver for (type, subtype).
    pub fn unregister(&self, message_type: u8, subtype: u8) {
        self.shared.receivers.write().remove(&(message_type, subtype));
    }

    pub(crate) fn submit(&self, job: HandlerJob) {
        let backoff = Backoff::new();
        let mut job = job;
        loop {
            match self.shared.queue.push(job) {
                Ok(()) => break,
                Err(rejected) => {
                    if !self.shared.running.load(Ordering::Acquire) {
                        warn!(
                            header = %rejected.received.header,
                            "handler pool stopped, dropping message"
                        );
                        return;
                    }
                    job = rejected;
                    backoff.snooze();
                }
            }
        }
        self.shared.signal.fetch_add(1, Ordering::Release);
        if self.shared.idle.load(Ordering::Acquire) > 0 {
            futex_wake_all(&self.shared.signal);
        }
    }

    /// Stop the pool after the queued jobs ran. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.signal.fetch_add(1, Ordering::Release);
        futex_wake_all(&self.shared.signal);
        for worker in self.workers.lock().drain(..) {
            if worker.join().is_err() {
                error!("message handler thread panicked");
            }
        }
        info!("message handler pool stopped");
    }
}

impl Drop for MessageHandlers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, shared: &HandlerShared) {
    let backoff = Backoff::new();
    loop {
        if let Some(job) = shared.queue.pop() {
            run_job(shared, job);
            backoff.reset();
            continue;
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if !backoff.is_completed() {
            backoff.snooze();
            continue;
        }

        let seen = shared.signal.load(Ordering::Acquire);
        shared.idle.fetch_add(1, Ordering::AcqRel);
        if shared.queue.is_empty() && shared.running.load(Ordering::Acquire) {
            futex_wait(&shared.signal, seen);
        }
        shared.idle.fetch_sub(1, Ordering::AcqRel);
        backoff.reset();
    }
    debug!(handler = id, "message handler thread exiting");
}

fn run_job(shared: &HandlerShared, job: HandlerJob) {
    let HandlerJob {
        received,
        kind,
        slot,
    } = job;
    let header = received.header;

    let outcome = catch_unwind(AssertUnwindSafe(|| match kind {
        JobKind::Deliver => deliver(shared, &received),
        JobKind::Response(correlator) => match correlator.remove(header.message_id) {
            Some(request) => correlator.fulfill(request, received),
            None => debug!(%header, "request gone before its response was handled, dropping"),
        },
    }));
    if outcome.is_err() {
        error!(%header, "message receiver panicked");
    }
    // the receive buffer may go back to its pool from here on
    drop(slot);
}

fn deliver(shared: &HandlerShared, received: &ReceivedMessage) {
    let key = (received.header.message_type, received.header.subtype);
    let receivers = shared.receivers.read().get(&key).cloned();
    match receivers {
        Some(receivers) if !receivers.is_empty() => {
            for receiver in receivers {
                receiver.on_message(received);
            }
        }
        _ => warn!(header = %received.header, "no receiver registered, dropping message"),
    }
}

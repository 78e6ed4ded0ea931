//! The scheduling loop that drains every user's [`PerUserQueue`] under a global concurrency cap.
//!
//! One task per `(UserId, WorkItem)` is spawned at a time; `PerUserQueue::try_acquire` keeps a
//! single user from ever having two tasks in flight, and a `tokio::sync::Semaphore` bounds the
//! total in flight across all users. The scan itself is woken by [`DispatchNotify`] rather than
//! polling, so a freshly-enqueued item starts in bounded time without the producer blocking.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use gateway_types::{UserId, wire::TranscriptionReply};
use parking_lot::Mutex;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    api::errors::GatewayError,
    metrics::{
        METRICS_ID_TASK_DURATION, METRICS_ID_TASK_SUCCESS, METRICS_ID_TASK_TIMEOUT,
        METRICS_ID_TASKS_INFLIGHT,
    },
    services::{
        per_user_queue::{DispatchNotify, PerUserQueue, WorkItem},
        session_registry::SessionRegistry,
        transcriber::{TranscriberError, TranscriberService},
        usage_store::UsageStoreService,
    },
};

/// A user's queue plus the cancellation handle for whatever task is currently serving it.
///
/// The handle is replaced wholesale on every [`Dispatcher::register_user`] call, so a task
/// belonging to a prior session for the same user can never be mistaken for the new one's.
struct UserSlot {
    queue: PerUserQueue,
    cancel: CancellationToken,
}

/// Drains [`PerUserQueue`]s under a global concurrency cap.
///
/// Cheap to `Clone`: internally an `Arc`, the same handle shape as [`SessionRegistry`].
#[derive(Clone)]
pub(crate) struct Dispatcher(Arc<Inner>);

struct Inner {
    queues: Mutex<HashMap<UserId, UserSlot>>,
    notify: DispatchNotify,
    semaphore: Arc<Semaphore>,
    usage_store: UsageStoreService,
    transcriber: TranscriberService,
    session_registry: SessionRegistry,
    shutdown: CancellationToken,
    per_task_timeout: Duration,
    scan_cursor: AtomicUsize,
}

impl Dispatcher {
    /// Builds a dispatcher bounded to `max_concurrent` simultaneous transcription tasks.
    pub(crate) fn new(
        max_concurrent: usize,
        per_task_timeout: Duration,
        usage_store: UsageStoreService,
        transcriber: TranscriberService,
        session_registry: SessionRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self(Arc::new(Inner {
            queues: Mutex::new(HashMap::new()),
            notify: DispatchNotify::default(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            usage_store,
            transcriber,
            session_registry,
            shutdown,
            per_task_timeout,
            scan_cursor: AtomicUsize::new(0),
        }))
    }

    /// Starts a fresh, empty queue for `user_id`. Any slot a prior session for this user left
    /// behind is cancelled and cleared first, mirroring the teardown `close_user` performs — an
    /// evicted predecessor's in-flight task must not keep running once its successor is Ready.
    pub(crate) fn register_user(&self, user_id: UserId) -> PerUserQueue {
        let queue = PerUserQueue::new();
        let slot = UserSlot {
            queue: queue.clone(),
            cancel: CancellationToken::new(),
        };
        let previous = self.0.queues.lock().insert(user_id, slot);
        if let Some(previous) = previous {
            previous.cancel.cancel();
            previous.queue.clear();
        }
        queue
    }

    /// Appends `item` to `user_id`'s queue and wakes the scanner. A no-op if the user has no
    /// registered slot (the session handler must call [`Dispatcher::register_user`] first).
    pub(crate) fn enqueue(&self, user_id: &UserId, item: WorkItem) {
        let queued = {
            let queues = self.0.queues.lock();
            if let Some(slot) = queues.get(user_id) {
                slot.queue.enqueue(item);
                true
            } else {
                false
            }
        };
        if queued {
            self.0.notify.notify();
        }
    }

    /// Tears down `user_id`'s slot: cancels whatever task is currently serving it, drops every
    /// not-yet-started item, and removes the slot. Called when the owning session closes.
    pub(crate) fn close_user(&self, user_id: &UserId) {
        let slot = self.0.queues.lock().remove(user_id);
        if let Some(slot) = slot {
            slot.cancel.cancel();
            slot.queue.clear();
        }
    }

    /// Finds the next user whose queue is non-empty and not already in flight, claims it, and
    /// pops its head item. Round-robins the starting point across calls for fairness.
    fn find_ready_user(&self) -> Option<(UserId, PerUserQueue, CancellationToken, WorkItem)> {
        let snapshot: Vec<(UserId, PerUserQueue, CancellationToken)> = {
            let queues = self.0.queues.lock();
            queues
                .iter()
                .map(|(user_id, slot)| (user_id.clone(), slot.queue.clone(), slot.cancel.clone()))
                .collect()
        };
        if snapshot.is_empty() {
            return None;
        }
        let start = self.0.scan_cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        for offset in 0..snapshot.len() {
            let (user_id, queue, cancel) = &snapshot[(start + offset) % snapshot.len()];
            if !queue.has_pending() {
                continue;
            }
            if !queue.try_acquire() {
                continue;
            }
            match queue.dequeue() {
                Some(item) => return Some((user_id.clone(), queue.clone(), cancel.clone(), item)),
                None => queue.release(),
            }
        }
        None
    }

    /// `true` if any user has at least one pending item, in flight or not.
    #[cfg(test)]
    fn has_pending_work(&self) -> bool {
        self.0.queues.lock().values().any(|slot| slot.queue.has_pending())
    }

    /// Runs the scheduling loop until the shutdown signal has fired and every spawned task has
    /// finished. Intended to run as its own long-lived task for the life of the process.
    pub(crate) async fn run(self) {
        let mut tasks = JoinSet::new();
        loop {
            loop {
                if self.0.shutdown.is_cancelled() {
                    break;
                }
                let permit = match self.0.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                match self.find_ready_user() {
                    Some((user_id, queue, cancel, item)) => {
                        let dispatcher = self.clone();
                        tasks.spawn(dispatcher.run_task(user_id, queue, cancel, item, permit));
                    }
                    None => {
                        drop(permit);
                        break;
                    }
                }
            }

            if self.0.shutdown.is_cancelled() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.0.notify.notified() => {}
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                _ = self.0.shutdown.cancelled(), if !self.0.shutdown.is_cancelled() => {}
            }
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Runs a single transcription task end to end: lookup, transcribe under cancellation and a
    /// deadline, update usage, reply, and close the session if the budget is now exhausted.
    #[instrument(skip_all, fields(user = %user_id, seq = item.sequence_id))]
    async fn run_task(
        self,
        user_id: UserId,
        queue: PerUserQueue,
        cancel: CancellationToken,
        item: WorkItem,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        metrics::gauge!(METRICS_ID_TASKS_INFLIGHT).increment(1);
        self.run_task_inner(&user_id, &item, &cancel).await;
        metrics::gauge!(METRICS_ID_TASKS_INFLIGHT).decrement(1);
        queue.release();
        self.0.notify.notify();
    }

    async fn run_task_inner(&self, user_id: &UserId, item: &WorkItem, cancel: &CancellationToken) {
        let Some(session) = self.0.session_registry.lookup(user_id) else {
            return;
        };

        let task_token = merge_cancellation(&self.0.shutdown, cancel);
        let _guard = task_token.clone().drop_guard();
        let started_at = Instant::now();
        let outcome = tokio::time::timeout(
            self.0.per_task_timeout,
            self.0.transcriber.transcribe(&item.payload, &task_token),
        )
        .await;
        metrics::histogram!(METRICS_ID_TASK_DURATION)
            .record(started_at.elapsed().as_millis() as f64);

        let outcome = match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(TranscriberError::Cancelled)) => {
                // Session close or shutdown already own the close path; stay silent.
                return;
            }
            Err(_elapsed) => {
                metrics::counter!(METRICS_ID_TASK_TIMEOUT).increment(1);
                task_token.cancel();
                session.sender.send_close(
                    GatewayError::Timeout
                        .close_reason()
                        .expect("Timeout always carries a close reason"),
                );
                return;
            }
        };
        metrics::counter!(METRICS_ID_TASK_SUCCESS).increment(1);

        // A newer session may have replaced this one while the transcription was running.
        match self.0.session_registry.lookup(user_id) {
            Some(current) if current.generation == session.generation => {}
            _ => return,
        }

        let usage = self
            .0
            .usage_store
            .update_usage(user_id, outcome.usage_used_ms)
            .await;
        session.sender.send_reply(TranscriptionReply {
            id: item.sequence_id,
            transcript: outcome.transcript,
            confidence: outcome.confidence,
            usage_used_ms: outcome.usage_used_ms,
            usage_remaining_ms: usage.remaining_ms,
        });

        if usage.remaining_ms == 0 {
            session.sender.send_close(
                GatewayError::ExceededAllocatedUsage
                    .close_reason()
                    .expect("ExceededAllocatedUsage always carries a close reason"),
            );
        }
    }
}

/// Builds a token that cancels as soon as either `a` or `b` does.
///
/// `tokio_util::sync::CancellationToken` has no built-in OR combinator for two independently
/// owned tokens, so a small forwarder task bridges the two into a fresh one that the
/// [`Transcriber`](super::transcriber::Transcriber) trait's single-token contract expects.
fn merge_cancellation(a: &CancellationToken, b: &CancellationToken) -> CancellationToken {
    let merged = CancellationToken::new();
    let forwarder = merged.clone();
    let a = a.clone();
    let b = b.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = a.cancelled() => {}
            _ = b.cancelled() => {}
            _ = forwarder.cancelled() => {}
        }
        forwarder.cancel();
    });
    merged
}

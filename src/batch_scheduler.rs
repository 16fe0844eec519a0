//! Drains the transfer queue and decides how each group goes on chain.
//!
//! A cycle snapshots the queue, partitions the snapshot by (collection,
//! token), and walks each group in arrival order: slices of at least
//! `min_batch_size` go out as one batch call, smaller remainders go out
//! individually. A batch attempt succeeds or fails as a unit, which keeps
//! partial-failure handling trivial at the cost of retrying the whole slice.
//!
//! Only one cycle runs at a time; a cycle started while another is in flight
//! returns immediately. Producers keep enqueueing concurrently and their
//! requests are picked up by the next cycle.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    time::Duration,
};

use rand::Rng;
use tokio::{sync::Notify, time::sleep};
use tracing::{debug, error, info};

use crate::{
    config::CourierConfig,
    dead_letter::{DeadLetterSink, FailedTransfer},
    dispatcher::{DispatchOutcome, Dispatcher},
    errors::ErrorClass,
    transfer_queue::TransferQueue,
    types::{GroupKey, TransferRequest},
};

pub struct BatchScheduler {
    queue: Arc<TransferQueue>,
    dispatcher: Dispatcher,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: CourierConfig,
    busy: AtomicBool,
    drained: Notify,
}

impl BatchScheduler {
    pub fn new(
        queue: Arc<TransferQueue>,
        dispatcher: Dispatcher,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: CourierConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            dead_letters,
            config,
            busy: AtomicBool::new(false),
            drained: Notify::new(),
        }
    }

    /// Run one drain/dispatch cycle. Returns without doing anything if a
    /// cycle is already in flight or the queue is empty.
    pub async fn process_queue(&self) {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("queue processing already in progress; skipping this cycle");
            return;
        }

        let snapshot = self.queue.drain_all().await;
        if snapshot.is_empty() {
            self.busy.store(false, Ordering::Release);
            self.drained.notify_waiters();
            return;
        }

        info!("⚙️ processing {} queued transfer(s)", snapshot.len());
        for (key, mut group) in group_by_key(snapshot) {
            while !group.is_empty() {
                let take = group.len().min(self.config.max_batch_size);
                let slice: Vec<TransferRequest> = group.drain(..take).collect();

                if slice.len() >= self.config.min_batch_size {
                    let outcome = self.dispatcher.submit_batch(key, &slice).await;
                    self.settle(key, slice, outcome).await;
                    sleep(self.config.inter_submission_delay()).await;
                } else {
                    for request in slice {
                        let outcome = self.dispatcher.submit_single(&request).await;
                        self.settle(key, vec![request], outcome).await;
                        sleep(self.config.inter_submission_delay()).await;
                    }
                }
            }
        }

        self.busy.store(false, Ordering::Release);
        if self.queue.is_empty().await {
            self.drained.notify_waiters();
        }
    }

    /// Resolve one attempt for its requests: log deliveries, dead letter
    /// fatal and retry-exhausted requests, requeue the rest at the front.
    async fn settle(
        &self,
        key: GroupKey,
        requests: Vec<TransferRequest>,
        outcome: DispatchOutcome,
    ) {
        if outcome.success {
            for request in &requests {
                info!(
                    "🚀 transfer of {key} delivered to {}",
                    request.recipient_tag()
                );
            }
            return;
        }

        let reason = outcome
            .reason
            .unwrap_or_else(|| "submission failed".to_string());

        if outcome.class == Some(ErrorClass::Fatal) {
            for mut request in requests {
                // the attempt that just failed counts, so the persisted
                // record carries the true attempt total
                request.retries += 1;
                self.dead_letter(request, &reason).await;
            }
            return;
        }

        // Nonce and transient failures retry. Back off before the requests
        // become eligible again, scaled by how often they have failed.
        let attempts_so_far = requests.iter().map(|r| r.retries).min().unwrap_or(0);
        sleep(jittered(self.config.retry_delay(attempts_so_far))).await;

        // push in reverse so the slice keeps its arrival order at the head
        for mut request in requests.into_iter().rev() {
            request.retries += 1;
            if request.retries >= self.config.max_retries {
                self.dead_letter(request, &format!("retry limit reached: {reason}"))
                    .await;
            } else {
                self.queue.requeue_front(request).await;
            }
        }
    }

    async fn dead_letter(&self, request: TransferRequest, reason: &str) {
        error!(
            "☠️ transfer of {} to {} dead lettered after {} attempt(s): {reason}",
            request.group_key(),
            request.recipient_tag(),
            request.retries
        );
        let entry = FailedTransfer::new(request, reason);
        if let Err(err) = self.dead_letters.record(entry).await {
            error!("failed to record dead letter: {err}");
        }
    }

    /// Complete once the queue is empty and no cycle is running. Bulk
    /// producers use this to observe full drain before moving on.
    pub async fn wait_until_drained(&self) {
        loop {
            // notify_waiters only reaches futures already registered with the
            // Notify, so enable this one before checking the condition
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.busy.load(Ordering::Acquire) && self.queue.is_empty().await {
                return;
            }
            notified.await;
        }
    }
}

/// Partition by (collection, token), preserving first-seen group order and
/// arrival order within each group.
fn group_by_key(requests: Vec<TransferRequest>) -> Vec<(GroupKey, Vec<TransferRequest>)> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<TransferRequest>> = HashMap::new();
    for request in requests {
        let key = request.group_key();
        if !groups.contains_key(&key) {
            order.push(key);
        }
        groups.entry(key).or_default().push(request);
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(|group| (key, group)))
        .collect()
}

/// Add up to 10% random slack so concurrent retries do not synchronize.
fn jittered(delay: Duration) -> Duration {
    let slack_ms = delay.as_millis() as u64 / 10;
    if slack_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=slack_ms))
}

//! In-process buffer of pending transfer requests.
//!
//! Producers append from any number of tasks; the batch scheduler takes an
//! atomic snapshot of everything queued at the start of a cycle. Requests
//! enqueued while a cycle is running are only visible to the next cycle.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    errors::{CourierError, Result},
    types::TransferRequest,
};

pub struct TransferQueue {
    items: Mutex<VecDeque<TransferRequest>>,
    capacity: Option<usize>,
}

impl TransferQueue {
    /// `capacity: None` keeps the queue unbounded, matching the reference
    /// behaviour. With a cap set, [`enqueue`](Self::enqueue) starts failing
    /// with [`CourierError::QueueFull`] once it is reached.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append a request at the tail.
    pub async fn enqueue(&self, request: TransferRequest) -> Result<()> {
        let mut items = self.items.lock().await;
        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                return Err(CourierError::QueueFull(capacity));
            }
        }
        items.push_back(request);
        info!(
            "📥 transfer queued for {}; queue length {}",
            items.back().map(|r| r.recipient_tag()).unwrap_or("anonymous"),
            items.len()
        );
        Ok(())
    }

    /// Remove and return everything currently queued, as one snapshot.
    pub async fn drain_all(&self) -> Vec<TransferRequest> {
        let mut items = self.items.lock().await;
        let drained: Vec<TransferRequest> = items.drain(..).collect();
        if !drained.is_empty() {
            debug!("drained {} request(s) from the queue", drained.len());
        }
        drained
    }

    /// Put a retried request back at the head so it runs before newly
    /// enqueued items. Retries bypass the capacity check: a request already
    /// admitted must not be droppable by backpressure.
    pub async fn requeue_front(&self, request: TransferRequest) {
        let mut items = self.items.lock().await;
        debug!(
            "🔁 transfer for {} requeued at the front (retry {})",
            request.recipient_tag(),
            request.retries
        );
        items.push_front(request);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

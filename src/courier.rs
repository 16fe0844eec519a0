//! Top level handle wiring the queue, nonce manager, dispatcher and batch
//! scheduler together behind a small producer-facing API.
//!
//! Enqueueing is fire-and-forget: producers get no synchronous confirmation
//! of on-chain delivery. Completion is observable through logs, the dead
//! letter sink, and [`Courier::wait_until_drained`].

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{sync::Notify, task::JoinHandle, time::sleep};
use tracing::{error, info};

use crate::{
    batch_scheduler::BatchScheduler,
    chain_client::ChainClient,
    config::CourierConfig,
    dead_letter::{DeadLetterSink, JsonlSink},
    dispatcher::Dispatcher,
    errors::{CourierError, Result},
    nonce_manager::NonceManager,
    transfer_queue::TransferQueue,
    types::{Address, Amount, CollectionId, TokenId, TransferRequest},
};

/// Default file the bundled JSON-lines dead letter sink appends to when the
/// builder is not given a sink of its own.
pub const DEFAULT_DEAD_LETTER_FILE: &str = "failed_transfers.jsonl";

pub struct CourierBuilder {
    chain: Option<Arc<dyn ChainClient>>,
    sender: Option<Address>,
    config: CourierConfig,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl CourierBuilder {
    pub fn chain(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn sender(mut self, sender: impl Into<Address>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn build(self) -> Result<Courier> {
        let chain = self
            .chain
            .ok_or_else(|| CourierError::Config("a chain client is required".to_string()))?;
        let sender = self
            .sender
            .ok_or_else(|| CourierError::Config("a sender address is required".to_string()))?;
        self.config.validate().map_err(CourierError::Config)?;

        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(JsonlSink::new(DEFAULT_DEAD_LETTER_FILE)));
        let queue = Arc::new(TransferQueue::new(self.config.max_queue_len));
        let nonces = Arc::new(NonceManager::new(chain.clone(), sender, &self.config));
        let dispatcher = Dispatcher::new(chain, nonces.clone());
        let scheduler = Arc::new(BatchScheduler::new(
            queue.clone(),
            dispatcher,
            dead_letters,
            self.config.clone(),
        ));

        Ok(Courier {
            queue,
            scheduler,
            nonces,
            config: self.config,
        })
    }
}

pub struct Courier {
    queue: Arc<TransferQueue>,
    scheduler: Arc<BatchScheduler>,
    nonces: Arc<NonceManager>,
    config: CourierConfig,
}

impl Courier {
    pub fn builder() -> CourierBuilder {
        CourierBuilder {
            chain: None,
            sender: None,
            config: CourierConfig::default(),
            dead_letters: None,
        }
    }

    /// Fetch the sending account's on-chain nonce before accepting work.
    /// Failure here means the chain is unreachable and startup should abort.
    pub async fn initialize(&self) -> Result<()> {
        self.nonces.initialize().await
    }

    /// Queue one transfer. Fire-and-forget; delivery happens on a later
    /// processing cycle and is reported via logs and the dead letter sink.
    pub async fn enqueue_transfer(
        &self,
        recipient: impl Into<Address>,
        collection: CollectionId,
        token: TokenId,
        amount: Amount,
    ) -> Result<()> {
        self.enqueue_request(TransferRequest::new(recipient, collection, token, amount))
            .await
    }

    /// Queue a fully built request, e.g. one carrying a sender context tag.
    pub async fn enqueue_request(&self, request: TransferRequest) -> Result<()> {
        if request.recipient.as_str().is_empty() {
            return Err(CourierError::InvalidRequest(
                "recipient address is empty".to_string(),
            ));
        }
        if request.amount == Amount::new(0) {
            return Err(CourierError::InvalidRequest(
                "transfer amount is zero".to_string(),
            ));
        }
        self.queue.enqueue(request).await
    }

    /// Drive one drain/dispatch cycle. For embedders that own their timer;
    /// [`spawn`](Self::spawn) covers the common case.
    pub async fn process_queue(&self) {
        self.scheduler.process_queue().await;
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Complete once the queue is empty and no cycle is running.
    pub async fn wait_until_drained(&self) {
        self.scheduler.wait_until_drained().await;
    }

    /// Start the background processing loop: one cycle, then sleep for the
    /// configured interval, until [`CourierHandle::shutdown`] is called. The
    /// cycle in flight always finishes before the loop stops.
    pub fn spawn(&self) -> CourierHandle {
        let scheduler = self.scheduler.clone();
        let interval = self.config.process_interval();
        let stopping = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let task = {
            let stopping = stopping.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!("⚙️ courier processing loop started");
                loop {
                    if stopping.load(Ordering::Acquire) {
                        break;
                    }
                    scheduler.process_queue().await;
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = sleep(interval) => {}
                    }
                }
                info!("courier processing loop stopped");
            })
        };

        CourierHandle {
            task,
            stopping,
            shutdown,
        }
    }
}

pub struct CourierHandle {
    task: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl CourierHandle {
    /// Ask the loop to stop after the cycle currently in flight.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }

    /// Wait for the loop to finish.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!("courier processing loop panicked: {err}");
        }
    }
}

//! Async dispatch engine for on-chain multi-token transfers.
//!
//! Many independent producers (tip commands, scheduled airdrops, reward
//! drops) enqueue transfer requests concurrently, while the chain demands a
//! strict, gapless nonce sequence from the sending account. This crate owns
//! the part where those two collide:
//!
//! - [`nonce_manager`] serializes nonce allocation behind one FIFO lock and
//!   resynchronizes from the chain after a conflict.
//! - [`transfer_queue`] buffers requests and hands atomic snapshots to the
//!   scheduler.
//! - [`batch_scheduler`] groups a snapshot by (collection, token) and sends
//!   large groups as single batch calls, small remainders individually.
//! - [`dispatcher`] performs one submission attempt per nonce and classifies
//!   the outcome into retry / resync-retry / dead-letter.
//! - [`dead_letter`] records permanently failed transfers for operators.
//!
//! The chain itself sits behind the [`chain_client::ChainClient`] trait;
//! signing, encoding and connection management are the embedder's business.

pub mod batch_scheduler;
pub mod chain_client;
pub mod config;
pub mod courier;
pub mod dead_letter;
pub mod dispatcher;
pub mod errors;
pub mod logging;
pub mod nonce_manager;
pub mod transfer_queue;
pub mod types;

pub use batch_scheduler::BatchScheduler;
pub use chain_client::{
    AccountState, BatchTransferCall, ChainClient, SubmissionOutcome, TransferCall,
};
pub use config::CourierConfig;
pub use courier::{Courier, CourierBuilder, CourierHandle, DEFAULT_DEAD_LETTER_FILE};
pub use dead_letter::{DeadLetterSink, FailedTransfer, JsonlSink, MemorySink};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use errors::{CourierError, ErrorClass, Result};
pub use nonce_manager::NonceManager;
pub use transfer_queue::TransferQueue;
pub use types::{
    Address, Amount, CollectionId, GroupKey, Nonce, TokenId, TransferRequest,
};

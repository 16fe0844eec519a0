//! Serialized nonce allocation for the sending account.
//!
//! The chain rejects any transaction whose nonce is not the account's next
//! expected value, so every submission attempt in the process must draw its
//! nonce from one place. `NonceManager` owns that single slot: allocation and
//! resynchronization take the same mutex, and tokio's mutex hands the lock to
//! waiters in FIFO order, so concurrent callers receive distinct, contiguous
//! nonces with no priority inversion.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, MutexGuard},
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    chain_client::ChainClient,
    config::CourierConfig,
    errors::{CourierError, Result},
    types::{Address, Nonce},
};

#[derive(Debug, Default)]
struct NonceSlot {
    /// Next nonce to hand out. `None` until first fetched from the chain.
    next: Option<Nonce>,
}

pub struct NonceManager {
    chain: Arc<dyn ChainClient>,
    sender: Address,
    slot: Mutex<NonceSlot>,
    lock_timeout: Duration,
    connect_max_retries: u32,
    initial_retry_delay: Duration,
    max_retry_delay: Duration,
}

impl NonceManager {
    pub fn new(chain: Arc<dyn ChainClient>, sender: Address, config: &CourierConfig) -> Self {
        Self {
            chain,
            sender,
            slot: Mutex::new(NonceSlot::default()),
            lock_timeout: config.nonce_lock_timeout(),
            connect_max_retries: config.connect_max_retries,
            initial_retry_delay: config.initial_retry_delay(),
            max_retry_delay: config.max_retry_delay(),
        }
    }

    /// Fetch the authoritative on-chain nonce and seed the slot with it.
    ///
    /// Intended to run once at startup; failure here means the chain could
    /// not be reached within the configured reconnect budget and is fatal.
    pub async fn initialize(&self) -> Result<()> {
        let mut slot = self.lock_slot().await?;
        let nonce = self.fetch_chain_nonce().await?;
        slot.next = Some(nonce);
        info!("✅ nonce initialized to {nonce}");
        Ok(())
    }

    /// Hand out the next nonce and advance the slot by exactly one.
    ///
    /// Lazily initializes from the chain if [`initialize`](Self::initialize)
    /// has not run yet. Callers that cannot take the lock within the
    /// configured timeout get [`CourierError::LockTimeout`] instead of
    /// blocking forever.
    pub async fn allocate(&self) -> Result<Nonce> {
        let mut slot = self.lock_slot().await?;
        let current = match slot.next {
            Some(nonce) => nonce,
            None => self.fetch_chain_nonce().await?,
        };
        slot.next = Some(current.next());
        debug!("allocated nonce {current}");
        Ok(current)
    }

    /// Overwrite the slot with the chain's view, discarding any speculative
    /// local increments. Called after the chain reports a nonce conflict.
    ///
    /// Takes the same lock as [`allocate`](Self::allocate), so a resync never
    /// races an in-flight allocation.
    pub async fn resynchronize(&self) -> Result<Nonce> {
        let mut slot = self.lock_slot().await?;
        let nonce = self.fetch_chain_nonce().await?;
        slot.next = Some(nonce);
        info!("🔄 nonce resynchronized to {nonce}");
        Ok(nonce)
    }

    async fn lock_slot(&self) -> Result<MutexGuard<'_, NonceSlot>> {
        match timeout(self.lock_timeout, self.slot.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(
                    "timed out waiting for the nonce lock after {:?}",
                    self.lock_timeout
                );
                Err(CourierError::LockTimeout)
            }
        }
    }

    /// Query the account nonce, retrying connection failures with doubling
    /// delays up to `connect_max_retries` attempts.
    async fn fetch_chain_nonce(&self) -> Result<Nonce> {
        let mut delay = self.initial_retry_delay;
        let mut attempt = 0u32;
        loop {
            match self.chain.get_account_state(&self.sender).await {
                Ok(state) => return Ok(state.nonce),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.connect_max_retries {
                        error!("❌ unable to fetch account nonce after {attempt} attempts: {err}");
                        return Err(CourierError::Connection(format!(
                            "unable to fetch account nonce after {attempt} attempts: {err}"
                        )));
                    }
                    warn!(
                        "account nonce query failed on attempt {attempt}: {err}; retrying in {delay:?}"
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_retry_delay);
                }
            }
        }
    }
}

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Tunables for queue processing, batching and retry behaviour.
///
/// Every knob has a default matching the values the dispatch engine was
/// originally operated with; none of them is load-bearing beyond "small
/// groups go out individually, retries back off".
#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    /// Largest number of transfers folded into one batch call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Below this group size, transfers are submitted individually.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    /// Failed attempts before a request is dead lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Bound on waiting for the nonce lock before surfacing backpressure.
    #[serde(default = "default_nonce_lock_timeout_ms")]
    pub nonce_lock_timeout_ms: u64,
    /// Pause between successive submission attempts within one cycle.
    #[serde(default = "default_inter_submission_delay_ms")]
    pub inter_submission_delay_ms: u64,
    /// Delay before the background loop starts the next processing cycle.
    #[serde(default = "default_process_interval_ms")]
    pub process_interval_ms: u64,
    /// Attempts to reach the chain during nonce initialization.
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,
    /// Optional cap on queued requests. `None` keeps the queue unbounded.
    #[serde(default)]
    pub max_queue_len: Option<usize>,
}

fn default_max_batch_size() -> usize {
    250
}

fn default_min_batch_size() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_nonce_lock_timeout_ms() -> u64 {
    5000
}

fn default_inter_submission_delay_ms() -> u64 {
    2000
}

fn default_process_interval_ms() -> u64 {
    5000
}

fn default_connect_max_retries() -> u32 {
    5
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            min_batch_size: default_min_batch_size(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            nonce_lock_timeout_ms: default_nonce_lock_timeout_ms(),
            inter_submission_delay_ms: default_inter_submission_delay_ms(),
            process_interval_ms: default_process_interval_ms(),
            connect_max_retries: default_connect_max_retries(),
            max_queue_len: None,
        }
    }
}

impl CourierConfig {
    /// Load a configuration from a TOML file, falling back to defaults for
    /// any missing field.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data =
            fs::read_to_string(path.as_ref()).with_context(|| "Failed to read config file")?;
        let cfg: CourierConfig =
            toml::from_str(&data).with_context(|| "Failed to parse TOML config")?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min_batch_size == 0 {
            return Err("min_batch_size must be at least 1".to_string());
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(format!(
                "min_batch_size {} exceeds max_batch_size {}",
                self.min_batch_size, self.max_batch_size
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier {} would shrink retry delays",
                self.backoff_multiplier
            ));
        }
        if self.connect_max_retries == 0 {
            return Err("connect_max_retries must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn nonce_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.nonce_lock_timeout_ms)
    }

    pub fn inter_submission_delay(&self) -> Duration {
        Duration::from_millis(self.inter_submission_delay_ms)
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }

    /// Backoff delay before the attempt following `retries` failures:
    /// `initial * multiplier^retries`, capped at `max_retry_delay`.
    pub fn retry_delay(&self, retries: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retries.min(32) as i32);
        let millis = (self.initial_retry_delay_ms as f64 * factor).round();
        let capped = millis.min(self.max_retry_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }
}

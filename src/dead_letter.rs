//! Terminal store for transfers that exhausted their retries.
//!
//! Kept behind a small trait so the engine stays storage-agnostic; the
//! bundled implementations are an append-only JSON-lines file for operators
//! and an in-memory sink for tests and embedding.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::info;

use crate::{errors::Result, types::TransferRequest};

/// Append-only record of a permanently failed transfer, kept for manual
/// reconciliation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailedTransfer {
    pub request: TransferRequest,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedTransfer {
    pub fn new(request: TransferRequest, reason: impl Into<String>) -> Self {
        Self {
            request,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, entry: FailedTransfer) -> Result<()>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl DeadLetterSink for JsonlSink {
    async fn record(&self, entry: FailedTransfer) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        info!(
            "📝 dead letter for {} appended to {}",
            entry.request.recipient_tag(),
            self.path.display()
        );
        Ok(())
    }
}

/// Keeps dead letters in memory. Useful in tests and for embedders that
/// inspect failures programmatically.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<FailedTransfer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<FailedTransfer> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemorySink {
    async fn record(&self, entry: FailedTransfer) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Amount, CollectionId, TokenId};

    fn entry() -> FailedTransfer {
        let request = TransferRequest::new(
            "alice",
            CollectionId::new(10),
            TokenId::new(5),
            Amount::ONE,
        )
        .with_context("alice#1234");
        FailedTransfer::new(request, "retry limit reached: dropped from the transaction pool")
    }

    #[tokio::test]
    async fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.record(entry()).await.unwrap();
        sink.record(entry()).await.unwrap();

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request.recipient_tag(), "alice#1234");
        assert!(entries[0].reason.contains("retry limit reached"));
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_parseable_lines() {
        let path = std::env::temp_dir().join(format!(
            "nft_courier_dead_letters_{}.jsonl",
            std::process::id()
        ));
        let _ = tokio::fs::remove_file(&path).await;

        let sink = JsonlSink::new(&path);
        sink.record(entry()).await.unwrap();
        sink.record(entry()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: FailedTransfer = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.request.recipient.as_str(), "alice");
        }

        let _ = tokio::fs::remove_file(&path).await;
    }
}

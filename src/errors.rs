use thiserror::Error;

pub type Result<T> = std::result::Result<T, CourierError>;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("chain connection error: {0}")]
    Connection(String),
    #[error("timed out waiting for the nonce lock")]
    LockTimeout,
    #[error("nonce error: {0}")]
    Nonce(String),
    #[error("transfer queue is full (capacity {0})")]
    QueueFull(usize),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid transfer request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a failed submission attempt should be handled.
///
/// `Nonce` failures additionally force a resynchronization of the local nonce
/// against the chain before the affected requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stale or already-used nonce. Resync, then retry.
    Nonce,
    /// Network-ish failure. Retry without touching the nonce state.
    Transient,
    /// The call can never succeed. Dead letter immediately.
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Nonce => f.write_str("nonce"),
            ErrorClass::Transient => f.write_str("transient"),
            ErrorClass::Fatal => f.write_str("fatal"),
        }
    }
}

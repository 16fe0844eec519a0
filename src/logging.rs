//! Optional stdout log wiring for binaries that embed the courier.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedder's choice. With the `stdout-logs` feature enabled this installs a
//! formatted subscriber honouring `RUST_LOG`.

#[cfg(feature = "stdout-logs")]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(not(feature = "stdout-logs"))]
pub fn init() {}

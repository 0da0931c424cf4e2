use crate::row::Row;
use crate::state::SyncState;

/// The upsert sink the host platform provides. Idempotent by primary key
/// (SPEC_FULL.md §6). Implementations that are shared across concurrently
/// running envelope workers must serialize writes internally — the
/// orchestrator does not take any lock around calls to this trait.
pub trait HostSink: Send + Sync {
    fn upsert(&self, table: &str, row: Row);

    /// Atomic persistence of the new watermark state. Called exactly once,
    /// after a fully successful traversal.
    fn checkpoint(&self, state: &SyncState);
}

/// Structured logger with the three levels the host contract exposes.
pub trait HostLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn severe(&self, message: &str);
}

/// A [`HostLogger`] that forwards to `tracing`, for hosts that don't need a
/// distinct sink and just want the connector's logs in their own pipeline.
pub struct TracingLogger;

impl HostLogger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn severe(&self, message: &str) {
        tracing::error!("{message}");
    }
}

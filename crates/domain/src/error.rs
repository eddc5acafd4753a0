/// Shared error type used across all AXE crates.
///
/// Recoverable per-operation failures (policy denials, tool timeouts) are
/// **not** errors — they travel as [`crate::OperationResult`] values.  This
/// enum covers the scheduler-level taxonomy: transient provider faults,
/// rate limiting, store failures, and the single fatal case
/// (`StoreCorrupt`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(String),

    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("provider transient: {0}")]
    ProviderTransient(String),

    #[error("provider rate limited (retry after {retry_after_s}s)")]
    ProviderRateLimited { retry_after_s: u64 },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Only store corruption aborts a session; everything else is
    /// recovered locally or deferred by the scheduler.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StoreCorrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_corrupt_is_fatal() {
        assert!(Error::StoreCorrupt("bad".into()).is_fatal());
        assert!(!Error::Store("busy".into()).is_fatal());
        assert!(!Error::ProviderTransient("503".into()).is_fatal());
        assert!(!Error::Timeout("exec".into()).is_fatal());
        assert!(!Error::Cancelled.is_fatal());
    }
}

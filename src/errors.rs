/// Failure taxonomy shared by the ledger, trade store, simulator and oracle adapter.
///
/// Every variant is downgraded to a log line or an attempt-log status by the
/// long-running loops; none of them is allowed to stop ingestion or settlement.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network or timeout failure against the oracle, metadata API or feed.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Persisted state could not be read back (ledger file, simulation results).
    #[error("corrupt data: {0}")]
    DataCorruption(String),

    /// A resolution payload failed a sanity check and must not be acted on.
    #[error("ambiguous resolution: {0}")]
    AmbiguousResolution(String),

    /// A write that would break a stored-state invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures that should simply be retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientIo(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::TransientIo(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

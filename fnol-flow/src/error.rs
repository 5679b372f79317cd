use thiserror::Error;

/// Errors surfaced by the FNOL intake engine.
///
/// Validation failures are deliberately not represented here: they are
/// user-correctable data carried on the turn response, and the conversation
/// continues. Everything in this enum either rejects the turn outright or
/// forces the session onto the escalation path.
#[derive(Error, Debug)]
pub enum FnolError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A second `advance` arrived while one was already in flight for the
    /// same thread id. Callers should retry after a short backoff.
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// The session reached a terminal state (submitted, escalated or
    /// abandoned) and no longer accepts input.
    #[error("Session terminated: {0}")]
    SessionTerminated(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Required policy fields (deductible, coverage limit) are missing.
    /// Reported, never defaulted.
    #[error("Policy data incomplete: {0}")]
    PolicyDataIncomplete(String),

    /// Evidence is still being processed by the extraction pipeline.
    #[error("Evidence not ready: {0}")]
    EvidenceNotReady(String),

    /// Evidence could not be processed; the claimant must re-upload.
    #[error("Evidence invalid: {0}")]
    EvidenceInvalid(String),

    /// An external dependency exhausted its retries. The session state is
    /// unchanged, so the turn is safe to retry.
    #[error("System unavailable: {0}")]
    SystemUnavailable(String),

    /// Compare-and-swap save lost a race against a concurrent writer.
    #[error("Version conflict saving session: {0}")]
    StoreConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FnolError {
    /// Whether a bounded retry with backoff is worth attempting.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FnolError::EvidenceNotReady(_)
                | FnolError::SystemUnavailable(_)
                | FnolError::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FnolError>;

use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingId, ServiceId, SiteId};

/// Faults reported by the external collaborators (booking store, roster, calendar).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown site: {0}")]
    UnknownSite(SiteId),
    #[error("booking not found: {0}")]
    NotFound(BookingId),
    #[error("booking already archived: {0}")]
    AlreadyArchived(BookingId),
    #[error("booking already exists: {0}")]
    AlreadyExists(BookingId),
    #[error("booking {inserted} conflicts with existing booking {existing}")]
    Conflict { inserted: BookingId, existing: BookingId },
    #[error("invalid write: {0}")]
    InvalidWrite(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    #[error("unknown service: {0}")]
    UnknownService(ServiceId),
    #[error("conflict detected on phase {phase_index}")]
    ConflictDetected {
        phase_index: usize,
        conflicting: Option<BookingId>,
    },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("corrupt booking record {id}: {reason}")]
    CorruptRecord { id: BookingId, reason: String },
    #[error("batch commit failed, nothing applied: {0}")]
    BatchCommitFailure(#[source] StoreError),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// A race lost at commit time; the caller should re-select a slot and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConflictDetected { .. })
    }
}

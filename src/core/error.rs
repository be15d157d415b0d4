//! Service error taxonomy.
//!
//! Over-quota is deliberately absent here: denial is a normal outcome
//! (`Admission::Denied`), not a fault.

use crate::infrastructure::traits::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The entitlement store (or ledger) could not be reached. Admission
    /// fails closed on this: unverifiable entitlement means denial.
    #[error("entitlement store unavailable")]
    StoreUnavailable(#[from] StoreError),

    /// Retry was requested for a message that is not the caller's last
    /// un-replied user message.
    #[error("message {0} is not retryable")]
    NotRetryable(i64),

    /// Admission kept losing its guarded write. Treated like an unavailable
    /// store: the caller is denied rather than admitted unverified.
    #[error("admission contention exhausted retries for user {0}")]
    AdmissionContention(uuid::Uuid),
}

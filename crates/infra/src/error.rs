//! Infrastructure and application-service errors.

use thiserror::Error;

use lotkeeper_core::ErrorCategory;
use lotkeeper_inventory::StockError;

/// Store operation error.
///
/// These are infrastructure failures (concurrency, isolation, locking), as
/// opposed to the business-rule failures in [`StockError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record changed between read and commit.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error returned by the application services and the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Category an outer API layer maps to a transport status.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Stock(e) => e.category(),
            ServiceError::Store(StoreError::Conflict(_) | StoreError::UniqueViolation(_)) => {
                ErrorCategory::Conflict
            }
            ServiceError::Store(StoreError::TenantIsolation(_) | StoreError::Poisoned) => {
                ErrorCategory::Infrastructure
            }
        }
    }

    /// Optimistic conflicts are worth retrying; nothing else is.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Store(StoreError::Conflict(_)))
    }
}

impl From<lotkeeper_core::DomainError> for ServiceError {
    fn from(value: lotkeeper_core::DomainError) -> Self {
        ServiceError::Stock(StockError::Domain(value))
    }
}

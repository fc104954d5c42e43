//! Inventory error taxonomy.

use thiserror::Error;

use lotkeeper_core::{DomainError, ErrorCategory, LocationId, ProductId};

pub type StockResult<T> = Result<T, StockError>;

/// Failures of the allocation, classification, adjustment and replenishment
/// rules.
///
/// Every variant is raised before anything is persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Validation, not-found and invariant failures shared with the rest of
    /// the domain.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },

    #[error("allocation already released")]
    AlreadyReleased,

    #[error("adjusting {quantity} units requires an authorization code (threshold {threshold})")]
    MissingAuthorization { quantity: u64, threshold: u64 },

    #[error("no stock to adjust")]
    NoStockToAdjust,

    #[error("cannot decrease by {requested}: only {current} adjustable")]
    InsufficientStockForAdjustment { requested: u64, current: u64 },

    #[error("an active restock request already exists for product {product_id}")]
    DuplicateRestockRequest {
        product_id: ProductId,
        location_id: Option<LocationId>,
    },

    #[error("location {0} is not available")]
    LocationUnavailable(LocationId),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::Domain(DomainError::not_found(entity))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::invariant(msg))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StockError::Domain(e) => e.category(),
            StockError::InsufficientStock { .. }
            | StockError::AlreadyReleased
            | StockError::MissingAuthorization { .. }
            | StockError::NoStockToAdjust
            | StockError::InsufficientStockForAdjustment { .. }
            | StockError::DuplicateRestockRequest { .. }
            | StockError::LocationUnavailable(_) => ErrorCategory::BusinessRule,
        }
    }
}

//! Tenant-tunable inventory rules.

use serde::{Deserialize, Serialize};

use crate::error::{StockError, StockResult};

pub const DEFAULT_AUTHORIZATION_THRESHOLD: u64 = 100;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Rules a tenant may tune without a code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryPolicy {
    /// Adjustments of at least this many units need an authorization code.
    pub authorization_threshold: u64,
    /// How many times an operation is re-run after losing an optimistic
    /// concurrency race before the conflict is surfaced.
    pub max_conflict_retries: u32,
}

impl Default for InventoryPolicy {
    fn default() -> Self {
        Self {
            authorization_threshold: DEFAULT_AUTHORIZATION_THRESHOLD,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl InventoryPolicy {
    pub fn requires_authorization(&self, quantity: u64) -> bool {
        quantity >= self.authorization_threshold
    }

    /// Reject an adjustment at or above the threshold that carries no
    /// (non-blank) authorization code.
    pub fn check_authorization(&self, quantity: u64, code: Option<&str>) -> StockResult<()> {
        let has_code = code.is_some_and(|c| !c.trim().is_empty());
        if self.requires_authorization(quantity) && !has_code {
            return Err(StockError::MissingAuthorization {
                quantity,
                threshold: self.authorization_threshold,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> StockResult<()> {
        if self.authorization_threshold == 0 {
            return Err(StockError::validation("authorization_threshold must be positive"));
        }
        Ok(())
    }
}

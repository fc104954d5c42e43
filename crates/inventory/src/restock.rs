//! Replenishment: restock requests raised when stock falls to its minimum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{Entity, LocationId, ProductId, TenantId};

use crate::error::{StockError, StockResult};
use crate::events::{RestockRequestGenerated, RestockRequestStatusChanged, StockEvent};
use crate::id::RestockRequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestockPriority {
    High,
    Medium,
    Low,
}

impl RestockPriority {
    /// HIGH below 50% of the minimum, MEDIUM from 50% up to (not including)
    /// 80%, LOW otherwise. Integer arithmetic, no rounding.
    pub fn for_levels(current: u64, minimum: u64) -> Self {
        let current = u128::from(current);
        let minimum = u128::from(minimum);
        if 2 * current < minimum {
            RestockPriority::High
        } else if 5 * current < 4 * minimum {
            RestockPriority::Medium
        } else {
            RestockPriority::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestockStatus {
    Pending,
    Sent,
    Completed,
    Cancelled,
}

impl RestockStatus {
    /// Active requests hold the dedup key for their product and location.
    pub fn is_active(self) -> bool {
        matches!(self, RestockStatus::Pending | RestockStatus::Sent)
    }
}

impl core::fmt::Display for RestockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RestockStatus::Pending => "PENDING",
            RestockStatus::Sent => "SENT",
            RestockStatus::Completed => "COMPLETED",
            RestockStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Minimum/maximum stock levels configured for a product, optionally per
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPoint {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    pub minimum: u64,
    pub maximum: u64,
}

impl ReorderPoint {
    pub fn validate(&self) -> StockResult<()> {
        if self.minimum > self.maximum {
            return Err(StockError::validation(format!(
                "reorder point minimum {} exceeds maximum {}",
                self.minimum, self.maximum
            )));
        }
        Ok(())
    }

    /// Evaluate the available quantity against this reorder point.
    pub fn signal(&self, current: u64) -> Option<LowStockSignal> {
        (current <= self.minimum).then(|| LowStockSignal {
            tenant_id: self.tenant_id,
            product_id: self.product_id,
            location_id: self.location_id,
            current,
            minimum: self.minimum,
            maximum: self.maximum,
        })
    }
}

/// Stock has fallen to or below its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockSignal {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub current: u64,
    pub minimum: u64,
    pub maximum: u64,
}

/// Command: generate a restock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRestock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub current: u64,
    pub minimum: u64,
    pub maximum: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Deduplication key: at most one active request per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RestockKey {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockRequest {
    id: RestockRequestId,
    tenant_id: TenantId,
    product_id: ProductId,
    location_id: Option<LocationId>,
    current_quantity: u64,
    minimum_quantity: u64,
    maximum_quantity: u64,
    requested_quantity: u64,
    priority: RestockPriority,
    status: RestockStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl RestockRequest {
    /// Factory: a new PENDING request. Deduplication is the store's job;
    /// this only validates the levels.
    pub fn generate(cmd: GenerateRestock) -> StockResult<(RestockRequest, StockEvent)> {
        if cmd.minimum > cmd.maximum {
            return Err(StockError::validation("minimum exceeds maximum"));
        }
        if cmd.current > cmd.minimum {
            return Err(StockError::validation(format!(
                "current quantity {} is above the minimum {}",
                cmd.current, cmd.minimum
            )));
        }

        let request = RestockRequest {
            id: RestockRequestId::generate(),
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            location_id: cmd.location_id,
            current_quantity: cmd.current,
            minimum_quantity: cmd.minimum,
            maximum_quantity: cmd.maximum,
            requested_quantity: cmd.maximum.saturating_sub(cmd.current),
            priority: RestockPriority::for_levels(cmd.current, cmd.minimum),
            status: RestockStatus::Pending,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
            version: 1,
        };

        let event = StockEvent::RestockRequestGenerated(RestockRequestGenerated {
            tenant_id: request.tenant_id,
            request_id: request.id,
            product_id: request.product_id,
            location_id: request.location_id,
            current_quantity: request.current_quantity,
            minimum_quantity: request.minimum_quantity,
            maximum_quantity: request.maximum_quantity,
            requested_quantity: request.requested_quantity,
            priority: request.priority,
            occurred_at: cmd.occurred_at,
        });

        Ok((request, event))
    }

    pub fn id_typed(&self) -> RestockRequestId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn key(&self) -> RestockKey {
        RestockKey {
            tenant_id: self.tenant_id,
            product_id: self.product_id,
            location_id: self.location_id,
        }
    }

    pub fn current_quantity(&self) -> u64 {
        self.current_quantity
    }

    pub fn minimum_quantity(&self) -> u64 {
        self.minimum_quantity
    }

    pub fn maximum_quantity(&self) -> u64 {
        self.maximum_quantity
    }

    pub fn requested_quantity(&self) -> u64 {
        self.requested_quantity
    }

    pub fn priority(&self) -> RestockPriority {
        self.priority
    }

    pub fn status(&self) -> RestockStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// PENDING → SENT.
    pub fn mark_sent(&mut self, occurred_at: DateTime<Utc>) -> StockResult<StockEvent> {
        match self.status {
            RestockStatus::Pending => self.transition(RestockStatus::Sent, occurred_at),
            other => Err(self.illegal(other, RestockStatus::Sent)),
        }
    }

    /// PENDING or SENT → COMPLETED. Frees the dedup key.
    pub fn complete(&mut self, occurred_at: DateTime<Utc>) -> StockResult<StockEvent> {
        match self.status {
            RestockStatus::Pending | RestockStatus::Sent => {
                self.transition(RestockStatus::Completed, occurred_at)
            }
            other => Err(self.illegal(other, RestockStatus::Completed)),
        }
    }

    /// PENDING or SENT → CANCELLED. Frees the dedup key.
    pub fn cancel(&mut self, occurred_at: DateTime<Utc>) -> StockResult<StockEvent> {
        match self.status {
            RestockStatus::Pending | RestockStatus::Sent => {
                self.transition(RestockStatus::Cancelled, occurred_at)
            }
            other => Err(self.illegal(other, RestockStatus::Cancelled)),
        }
    }

    fn transition(&mut self, new: RestockStatus, occurred_at: DateTime<Utc>) -> StockResult<StockEvent> {
        let previous = self.status;
        self.status = new;
        self.updated_at = occurred_at;
        self.version += 1;

        Ok(StockEvent::RestockRequestStatusChanged(RestockRequestStatusChanged {
            tenant_id: self.tenant_id,
            request_id: self.id,
            product_id: self.product_id,
            location_id: self.location_id,
            previous,
            new,
            occurred_at,
        }))
    }

    fn illegal(&self, from: RestockStatus, to: RestockStatus) -> StockError {
        StockError::invariant(format!("restock request cannot move from {from} to {to}"))
    }
}

impl Entity for RestockRequest {
    type Id = RestockRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

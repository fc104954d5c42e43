//! Published inventory domain events.
//!
//! Every mutating operation returns these explicitly; nothing is buffered on
//! the aggregates. Callers hand them to the commit coordinator, which
//! delivers them only after the enclosing unit of work commits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{AggregateId, LocationId, ProductId, TenantId, UserId};
use lotkeeper_events::Event;

use crate::adjustment::AdjustmentType;
use crate::allocation::AllocationType;
use crate::classification::Classification;
use crate::id::{AdjustmentId, AllocationId, LotId, RestockRequestId};
use crate::restock::{RestockPriority, RestockStatus};

pub const LOT_AGGREGATE: &str = "inventory.lot";
pub const ALLOCATION_AGGREGATE: &str = "inventory.allocation";
pub const ADJUSTMENT_AGGREGATE: &str = "inventory.adjustment";
pub const RESTOCK_REQUEST_AGGREGATE: &str = "inventory.restock_request";

/// Event: LotCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotCreated {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub quantity: u64,
    pub expiration_date: Option<NaiveDate>,
    pub classification: Classification,
    pub consignment_ref: Option<String>,
    pub received_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotPlaced (an unassigned lot was bound to a location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotPlaced {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotClassified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotClassified {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub previous: Classification,
    pub new: Classification,
    pub checked_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotExpiringAlert (lot entered CRITICAL or NEAR_EXPIRY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotExpiringAlert {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub expiration_date: NaiveDate,
    pub days_remaining: i64,
    pub new_classification: Classification,
    pub available_quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotExpired {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub expiration_date: NaiveDate,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocated (one per touched lot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    /// Effective location of the lot after this allocation.
    pub location_id: Option<LocationId>,
    /// Set when this allocation bound a previously unassigned lot.
    pub bound_location: Option<LocationId>,
    pub quantity: u64,
    pub allocation_type: AllocationType,
    pub reference_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocationReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocationReleased {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted (one per adjustment, whatever its scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub lot_id: Option<LotId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub quantity_before: u64,
    pub quantity_after: u64,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RestockRequestGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockRequestGenerated {
    pub tenant_id: TenantId,
    pub request_id: RestockRequestId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub current_quantity: u64,
    pub minimum_quantity: u64,
    pub maximum_quantity: u64,
    pub requested_quantity: u64,
    pub priority: RestockPriority,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RestockRequestStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockRequestStatusChanged {
    pub tenant_id: TenantId,
    pub request_id: RestockRequestId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub previous: RestockStatus,
    pub new: RestockStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    LotCreated(LotCreated),
    LotPlaced(LotPlaced),
    LotClassified(LotClassified),
    LotExpiringAlert(LotExpiringAlert),
    LotExpired(LotExpired),
    StockAllocated(StockAllocated),
    StockAllocationReleased(StockAllocationReleased),
    StockAdjusted(StockAdjusted),
    RestockRequestGenerated(RestockRequestGenerated),
    RestockRequestStatusChanged(RestockRequestStatusChanged),
}

impl StockEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            StockEvent::LotCreated(e) => e.tenant_id,
            StockEvent::LotPlaced(e) => e.tenant_id,
            StockEvent::LotClassified(e) => e.tenant_id,
            StockEvent::LotExpiringAlert(e) => e.tenant_id,
            StockEvent::LotExpired(e) => e.tenant_id,
            StockEvent::StockAllocated(e) => e.tenant_id,
            StockEvent::StockAllocationReleased(e) => e.tenant_id,
            StockEvent::StockAdjusted(e) => e.tenant_id,
            StockEvent::RestockRequestGenerated(e) => e.tenant_id,
            StockEvent::RestockRequestStatusChanged(e) => e.tenant_id,
        }
    }

    /// Aggregate type and id the event is filed under.
    ///
    /// Allocation events belong to the allocation stream; the lot they touch
    /// is part of the payload.
    pub fn stream(&self) -> (&'static str, AggregateId) {
        match self {
            StockEvent::LotCreated(e) => (LOT_AGGREGATE, e.lot_id.0),
            StockEvent::LotPlaced(e) => (LOT_AGGREGATE, e.lot_id.0),
            StockEvent::LotClassified(e) => (LOT_AGGREGATE, e.lot_id.0),
            StockEvent::LotExpiringAlert(e) => (LOT_AGGREGATE, e.lot_id.0),
            StockEvent::LotExpired(e) => (LOT_AGGREGATE, e.lot_id.0),
            StockEvent::StockAllocated(e) => (ALLOCATION_AGGREGATE, e.allocation_id.0),
            StockEvent::StockAllocationReleased(e) => (ALLOCATION_AGGREGATE, e.allocation_id.0),
            StockEvent::StockAdjusted(e) => (ADJUSTMENT_AGGREGATE, e.adjustment_id.0),
            StockEvent::RestockRequestGenerated(e) => (RESTOCK_REQUEST_AGGREGATE, e.request_id.0),
            StockEvent::RestockRequestStatusChanged(e) => {
                (RESTOCK_REQUEST_AGGREGATE, e.request_id.0)
            }
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            StockEvent::LotCreated(e) => e.product_id,
            StockEvent::LotPlaced(e) => e.product_id,
            StockEvent::LotClassified(e) => e.product_id,
            StockEvent::LotExpiringAlert(e) => e.product_id,
            StockEvent::LotExpired(e) => e.product_id,
            StockEvent::StockAllocated(e) => e.product_id,
            StockEvent::StockAllocationReleased(e) => e.product_id,
            StockEvent::StockAdjusted(e) => e.product_id,
            StockEvent::RestockRequestGenerated(e) => e.product_id,
            StockEvent::RestockRequestStatusChanged(e) => e.product_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::LotCreated(_) => "inventory.lot.created",
            StockEvent::LotPlaced(_) => "inventory.lot.placed",
            StockEvent::LotClassified(_) => "inventory.lot.classified",
            StockEvent::LotExpiringAlert(_) => "inventory.lot.expiring_alert",
            StockEvent::LotExpired(_) => "inventory.lot.expired",
            StockEvent::StockAllocated(_) => "inventory.stock.allocated",
            StockEvent::StockAllocationReleased(_) => "inventory.stock.allocation_released",
            StockEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            StockEvent::RestockRequestGenerated(_) => "inventory.restock_request.generated",
            StockEvent::RestockRequestStatusChanged(_) => "inventory.restock_request.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::LotCreated(e) => e.occurred_at,
            StockEvent::LotPlaced(e) => e.occurred_at,
            StockEvent::LotClassified(e) => e.occurred_at,
            StockEvent::LotExpiringAlert(e) => e.occurred_at,
            StockEvent::LotExpired(e) => e.occurred_at,
            StockEvent::StockAllocated(e) => e.occurred_at,
            StockEvent::StockAllocationReleased(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
            StockEvent::RestockRequestGenerated(e) => e.occurred_at,
            StockEvent::RestockRequestStatusChanged(e) => e.occurred_at,
        }
    }
}

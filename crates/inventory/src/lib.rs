//! Inventory domain rules for lot-tracked stock.
//!
//! Lots, FEFO allocation, expiry classification, manual adjustments and
//! replenishment, implemented as deterministic domain logic (no IO, no
//! storage). Every mutating operation returns the events it raised.

pub mod adjustment;
pub mod allocation;
pub mod classification;
pub mod error;
pub mod events;
pub mod id;
pub mod lot;
pub mod policy;
pub mod restock;

pub use adjustment::{
    apply_adjustment, resolve_scope, AdjustStock, Adjustment, AdjustmentOutcome, AdjustmentScope,
    AdjustmentType,
};
pub use allocation::{
    allocate_fefo, candidate_lots, plan_fefo, sort_fefo, AllocateStock, Allocation,
    AllocationResult, AllocationStatus, AllocationType, LotDraw,
};
pub use classification::Classification;
pub use error::{StockError, StockResult};
pub use events::StockEvent;
pub use id::{AdjustmentId, AllocationId, LotId, RestockRequestId};
pub use lot::{Lot, PlaceLot, ReceiveLot, ReclassifyLot};
pub use policy::InventoryPolicy;
pub use restock::{
    GenerateRestock, LowStockSignal, ReorderPoint, RestockKey, RestockPriority, RestockRequest,
    RestockStatus,
};

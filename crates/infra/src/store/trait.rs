use std::sync::Arc;

use lotkeeper_core::{ExpectedVersion, ProductId, TenantId};
use lotkeeper_inventory::{
    Adjustment, Allocation, AllocationId, Lot, LotId, RestockKey, RestockRequest, RestockRequestId,
};

use crate::error::StoreError;

/// Writes staged for one atomic commit.
///
/// Every versioned record carries the version the writer based its decision
/// on. The commit fails as a whole if any of them moved in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    tenant_id: TenantId,
    pub lots: Vec<(Lot, ExpectedVersion)>,
    pub allocations: Vec<(Allocation, ExpectedVersion)>,
    pub adjustments: Vec<Adjustment>,
    pub restock_requests: Vec<(RestockRequest, ExpectedVersion)>,
}

impl ChangeSet {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            lots: Vec::new(),
            allocations: Vec::new(),
            adjustments: Vec::new(),
            restock_requests: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
            && self.allocations.is_empty()
            && self.adjustments.is_empty()
            && self.restock_requests.is_empty()
    }

    /// Total number of staged records.
    pub fn len(&self) -> usize {
        self.lots.len() + self.allocations.len() + self.adjustments.len() + self.restock_requests.len()
    }
}

/// Tenant-scoped persistence for the inventory records.
///
/// Implementations must:
/// - enforce tenant isolation on reads and writes
/// - apply a `ChangeSet` atomically (all records or none)
/// - reject a stale `ExpectedVersion` with `StoreError::Conflict`
/// - keep at most one active restock request per [`RestockKey`]
///   (`StoreError::UniqueViolation`)
pub trait InventoryStore: Send + Sync {
    fn lot(&self, tenant_id: TenantId, lot_id: LotId) -> Result<Option<Lot>, StoreError>;

    /// Every lot of a product, in insertion order.
    fn lots_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Lot>, StoreError>;

    /// Every lot of a tenant, in insertion order.
    fn lots_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Lot>, StoreError>;

    fn allocation(&self, tenant_id: TenantId, allocation_id: AllocationId) -> Result<Option<Allocation>, StoreError>;

    fn allocations_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> Result<Vec<Allocation>, StoreError>;

    fn adjustments_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Adjustment>, StoreError>;

    fn restock_request(
        &self,
        tenant_id: TenantId,
        request_id: RestockRequestId,
    ) -> Result<Option<RestockRequest>, StoreError>;

    fn active_restock_request(&self, key: RestockKey) -> Result<Option<RestockRequest>, StoreError>;

    fn restock_requests(&self, tenant_id: TenantId) -> Result<Vec<RestockRequest>, StoreError>;

    /// Apply every staged write or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn lot(&self, tenant_id: TenantId, lot_id: LotId) -> Result<Option<Lot>, StoreError> {
        (**self).lot(tenant_id, lot_id)
    }

    fn lots_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Lot>, StoreError> {
        (**self).lots_for_product(tenant_id, product_id)
    }

    fn lots_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Lot>, StoreError> {
        (**self).lots_for_tenant(tenant_id)
    }

    fn allocation(&self, tenant_id: TenantId, allocation_id: AllocationId) -> Result<Option<Allocation>, StoreError> {
        (**self).allocation(tenant_id, allocation_id)
    }

    fn allocations_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> Result<Vec<Allocation>, StoreError> {
        (**self).allocations_by_reference(tenant_id, reference_id)
    }

    fn adjustments_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Adjustment>, StoreError> {
        (**self).adjustments_for_product(tenant_id, product_id)
    }

    fn restock_request(
        &self,
        tenant_id: TenantId,
        request_id: RestockRequestId,
    ) -> Result<Option<RestockRequest>, StoreError> {
        (**self).restock_request(tenant_id, request_id)
    }

    fn active_restock_request(&self, key: RestockKey) -> Result<Option<RestockRequest>, StoreError> {
        (**self).active_restock_request(key)
    }

    fn restock_requests(&self, tenant_id: TenantId) -> Result<Vec<RestockRequest>, StoreError> {
        (**self).restock_requests(tenant_id)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes)
    }
}

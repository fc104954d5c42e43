//! `InventoryEngine`: the entry point external callers (REST, CLI,
//! schedulers) drive.
//!
//! It composes the services and adds the low-stock signal: after a committed
//! allocation or decrease, each reorder point of the product is evaluated
//! against the allocatable quantity in its scope, and the replenishment
//! trigger fires when it is at or below the minimum. On that automatic path
//! an already-active request is expected and only logged.

use std::sync::Arc;

use tracing::{debug, error};

use lotkeeper_core::{LocationId, ProductId, TenantId};
use lotkeeper_inventory::{
    sort_fefo, Adjustment, AdjustmentOutcome, AdjustmentType, Allocation, AllocationId,
    AllocationResult, Lot, LotId, RestockRequest, RestockRequestId, StockError, StockEvent,
};

use crate::config::EngineConfig;
use crate::coordinator::EventCommitCoordinator;
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{
    Clock, InMemoryLocationAvailability, InMemoryProductCatalog, InMemoryReorderPoints, ReorderPoints,
};
use crate::services::{
    AdjustmentRequest, AdjustmentService, AllocationRequest, AllocationService,
    ClassificationService, ReceiveLotRequest, ReceivingService, ReplenishmentService, ServiceContext,
    SweepReport, TriggerReplenishment,
};
use crate::sink::MessageSink;
use crate::store::InMemoryInventoryStore;
use crate::workers::{SweepWorker, WorkerHandle};

#[derive(Clone)]
pub struct InventoryEngine {
    ctx: ServiceContext,
    reorder_points: Arc<dyn ReorderPoints>,
    receiving: ReceivingService,
    allocation: AllocationService,
    adjustment: AdjustmentService,
    classification: ClassificationService,
    replenishment: ReplenishmentService,
}

impl core::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// An engine wired to in-memory adapters, with handles to each of them.
#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    pub engine: InventoryEngine,
    pub store: Arc<InMemoryInventoryStore>,
    pub products: Arc<InMemoryProductCatalog>,
    pub locations: Arc<InMemoryLocationAvailability>,
    pub reorder_points: Arc<InMemoryReorderPoints>,
}

impl InventoryEngine {
    pub fn new(ctx: ServiceContext, reorder_points: Arc<dyn ReorderPoints>) -> Self {
        Self {
            receiving: ReceivingService::new(ctx.clone()),
            allocation: AllocationService::new(ctx.clone()),
            adjustment: AdjustmentService::new(ctx.clone()),
            classification: ClassificationService::new(ctx.clone()),
            replenishment: ReplenishmentService::new(ctx.clone()),
            reorder_points,
            ctx,
        }
    }

    /// Wire the engine to in-memory adapters. Reorder points come from the
    /// configuration.
    pub fn in_memory(config: EngineConfig, clock: Arc<dyn Clock>, sink: Arc<dyn MessageSink>) -> InMemoryEngine {
        let store = Arc::new(InMemoryInventoryStore::new());
        let products = Arc::new(InMemoryProductCatalog::new());
        let locations = Arc::new(InMemoryLocationAvailability::new());
        let reorder_points = Arc::new(InMemoryReorderPoints::new(config.reorder_points.clone()));

        let ctx = ServiceContext {
            store: store.clone(),
            coordinator: EventCommitCoordinator::new(sink),
            products: products.clone(),
            locations: locations.clone(),
            clock,
            config: Arc::new(config),
        };

        InMemoryEngine {
            engine: InventoryEngine::new(ctx, reorder_points.clone()),
            store,
            products,
            locations,
            reorder_points,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn receive_lot(&self, request: &ReceiveLotRequest) -> ServiceResult<Lot> {
        self.receiving.receive(request)
    }

    pub fn place_lot(&self, tenant_id: TenantId, lot_id: LotId, location_id: LocationId) -> ServiceResult<Lot> {
        self.receiving.place(tenant_id, lot_id, location_id)
    }

    pub fn allocate(&self, request: &AllocationRequest) -> ServiceResult<AllocationResult> {
        let result = self.allocation.allocate(request)?;
        self.check_low_stock(request.tenant_id, request.product_id);
        Ok(result)
    }

    pub fn release(&self, tenant_id: TenantId, allocation_id: AllocationId) -> ServiceResult<Allocation> {
        self.allocation.release(tenant_id, allocation_id)
    }

    pub fn release_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> ServiceResult<Vec<Allocation>> {
        self.allocation.release_by_reference(tenant_id, reference_id)
    }

    pub fn adjust(&self, request: &AdjustmentRequest) -> ServiceResult<AdjustmentOutcome> {
        let outcome = self.adjustment.adjust(request)?;
        if request.adjustment_type == AdjustmentType::Decrease {
            self.check_low_stock(request.tenant_id, request.product_id);
        }
        Ok(outcome)
    }

    pub fn classify_lot(&self, tenant_id: TenantId, lot_id: LotId) -> ServiceResult<Vec<StockEvent>> {
        self.classification.classify(tenant_id, lot_id)
    }

    pub fn sweep(&self, tenant_id: TenantId) -> ServiceResult<SweepReport> {
        self.classification.sweep(tenant_id)
    }

    /// Run the classification sweep for `tenants` every configured interval
    /// on a background thread.
    pub fn spawn_sweep_worker(&self, tenants: Vec<TenantId>) -> std::io::Result<WorkerHandle> {
        SweepWorker::spawn(
            "classification-sweep",
            self.classification.clone(),
            tenants,
            self.ctx.config.sweep_interval(),
        )
    }

    /// Explicit trigger: a duplicate fails loudly.
    pub fn trigger_replenishment(&self, trigger: &TriggerReplenishment) -> ServiceResult<RestockRequest> {
        self.replenishment.trigger(trigger)
    }

    pub fn mark_restock_sent(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.replenishment.mark_sent(tenant_id, request_id)
    }

    pub fn complete_restock(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.replenishment.complete(tenant_id, request_id)
    }

    pub fn cancel_restock(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.replenishment.cancel(tenant_id, request_id)
    }

    pub fn active_restock_requests(&self, tenant_id: TenantId) -> ServiceResult<Vec<RestockRequest>> {
        self.replenishment.active_requests(tenant_id)
    }

    pub fn resolve_product(&self, tenant_id: TenantId, code: &str) -> ServiceResult<ProductId> {
        self.ctx
            .products
            .resolve_code(tenant_id, code)
            .ok_or_else(|| ServiceError::from(StockError::not_found("product")))
    }

    /// Allocatable quantity today: non-expired lots, minus reservations.
    /// With a location, only lots bound to it count.
    pub fn available_quantity(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        location_id: Option<LocationId>,
    ) -> ServiceResult<u64> {
        let today = self.ctx.clock.today();
        Ok(self
            .ctx
            .store
            .lots_for_product(tenant_id, product_id)?
            .iter()
            .filter(|lot| location_id.is_none() || lot.location_id() == location_id)
            .filter(|lot| lot.can_be_allocated_on(today))
            .map(Lot::available)
            .sum())
    }

    /// Every lot of a product, nearest expiry first.
    pub fn lots_in_fefo_order(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<Lot>> {
        let mut lots = self.ctx.store.lots_for_product(tenant_id, product_id)?;
        sort_fefo(&mut lots);
        Ok(lots)
    }

    pub fn allocations_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> ServiceResult<Vec<Allocation>> {
        Ok(self.ctx.store.allocations_by_reference(tenant_id, reference_id)?)
    }

    /// Audit trail of a product's adjustments, oldest first.
    pub fn adjustments_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> ServiceResult<Vec<Adjustment>> {
        Ok(self.ctx.store.adjustments_for_product(tenant_id, product_id)?)
    }

    /// Evaluate every reorder point of the product and trigger replenishment
    /// where stock is at or below the minimum. Returns the requests raised.
    ///
    /// Never fails: the operation that led here has already committed.
    pub fn check_low_stock(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<RestockRequest> {
        let mut raised = Vec::new();

        for point in self.reorder_points.for_product(tenant_id, product_id) {
            let current = match self.available_quantity(tenant_id, product_id, point.location_id) {
                Ok(current) => current,
                Err(err) => {
                    error!(tenant_id = %tenant_id, product_id = %product_id, error = %err, "low-stock check failed");
                    continue;
                }
            };
            let Some(signal) = point.signal(current) else {
                continue;
            };

            match self.replenishment.trigger(&TriggerReplenishment::from(signal)) {
                Ok(request) => raised.push(request),
                Err(ServiceError::Stock(StockError::DuplicateRestockRequest { .. })) => {
                    debug!(
                        tenant_id = %tenant_id,
                        product_id = %product_id,
                        current,
                        "low stock, restock request already active"
                    );
                }
                Err(err) => {
                    error!(
                        tenant_id = %tenant_id,
                        product_id = %product_id,
                        error = %err,
                        "automatic replenishment trigger failed"
                    );
                }
            }
        }

        raised
    }
}

//! Allocate and release stock.

use tracing::info;

use lotkeeper_core::{AggregateRoot, ExpectedVersion, LocationId, ProductId, TenantId};
use lotkeeper_inventory::{
    allocate_fefo, AllocateStock, Allocation, AllocationId, AllocationResult, AllocationType, Lot,
    StockError,
};

use super::{expected_version, ServiceContext};
use crate::error::{ServiceError, ServiceResult};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub quantity: u64,
    pub allocation_type: AllocationType,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AllocationService {
    ctx: ServiceContext,
}

impl AllocationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reserve `request.quantity` across lots, nearest expiry first.
    ///
    /// All-or-nothing: either every allocation record and lot update is
    /// committed, or nothing is.
    pub fn allocate(&self, request: &AllocationRequest) -> ServiceResult<AllocationResult> {
        let tenant_id = request.tenant_id;
        self.stock_request(request).validate()?;
        self.ctx.ensure_product(tenant_id, request.product_id)?;
        if let Some(location_id) = request.location_id {
            if !self.ctx.locations.is_available(tenant_id, location_id) {
                return Err(StockError::LocationUnavailable(location_id).into());
            }
        }

        let result = self
            .ctx
            .with_retries("allocate", tenant_id, || self.try_allocate(request))?;

        info!(
            tenant_id = %tenant_id,
            product_id = %request.product_id,
            quantity = result.total,
            lots = result.allocations.len(),
            allocation_type = ?request.allocation_type,
            "stock allocated"
        );
        Ok(result)
    }

    fn stock_request(&self, request: &AllocationRequest) -> AllocateStock {
        AllocateStock {
            tenant_id: request.tenant_id,
            product_id: request.product_id,
            location_id: request.location_id,
            quantity: request.quantity,
            allocation_type: request.allocation_type,
            reference_id: request.reference_id.clone(),
            today: self.ctx.clock.today(),
            occurred_at: self.ctx.clock.now(),
        }
    }

    fn try_allocate(&self, request: &AllocationRequest) -> ServiceResult<AllocationResult> {
        let stock = self.stock_request(request);
        let lots = self.ctx.store.lots_for_product(request.tenant_id, request.product_id)?;
        let result = allocate_fefo(&stock, &lots)?;

        let mut uow = UnitOfWork::begin(request.tenant_id);
        for lot in &result.lots {
            uow.stage_lot(lot.clone(), expected_version(&lots, lot.id_typed()));
        }
        for allocation in &result.allocations {
            uow.stage_allocation(allocation.clone(), ExpectedVersion::New);
        }
        self.ctx.coordinator.publish(Some(&mut uow), result.events.clone());
        uow.commit(self.ctx.store.as_ref())?;

        Ok(result)
    }

    /// Give an allocation's quantity back to its lot.
    pub fn release(&self, tenant_id: TenantId, allocation_id: AllocationId) -> ServiceResult<Allocation> {
        let released = self
            .ctx
            .with_retries("release", tenant_id, || self.try_release(tenant_id, allocation_id))?;

        info!(
            tenant_id = %tenant_id,
            allocation_id = %allocation_id,
            quantity = released.quantity(),
            "allocation released"
        );
        Ok(released)
    }

    fn try_release(&self, tenant_id: TenantId, allocation_id: AllocationId) -> ServiceResult<Allocation> {
        let mut allocation = self
            .ctx
            .store
            .allocation(tenant_id, allocation_id)?
            .ok_or_else(|| StockError::not_found("allocation"))?;
        if !allocation.is_active() {
            return Err(StockError::AlreadyReleased.into());
        }
        let mut lot = self.load_lot(tenant_id, &allocation)?;

        let (lot_version, allocation_version) = (lot.version(), allocation.version());
        let events = allocation.release(&mut lot, self.ctx.clock.now())?;

        let mut uow = UnitOfWork::begin(tenant_id);
        uow.stage_lot(lot, ExpectedVersion::Exact(lot_version));
        uow.stage_allocation(allocation.clone(), ExpectedVersion::Exact(allocation_version));
        self.ctx.coordinator.publish(Some(&mut uow), events);
        uow.commit(self.ctx.store.as_ref())?;

        Ok(allocation)
    }

    /// Release every active allocation carrying `reference_id` in one unit of
    /// work. Returns the released allocations (empty when none were active).
    pub fn release_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> ServiceResult<Vec<Allocation>> {
        let released = self.ctx.with_retries("release_by_reference", tenant_id, || {
            self.try_release_by_reference(tenant_id, reference_id)
        })?;

        info!(
            tenant_id = %tenant_id,
            reference_id,
            released = released.len(),
            "allocations released by reference"
        );
        Ok(released)
    }

    fn try_release_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> ServiceResult<Vec<Allocation>> {
        let now = self.ctx.clock.now();
        let active: Vec<Allocation> = self
            .ctx
            .store
            .allocations_by_reference(tenant_id, reference_id)?
            .into_iter()
            .filter(Allocation::is_active)
            .collect();
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let mut uow = UnitOfWork::begin(tenant_id);
        let mut lots: Vec<Lot> = Vec::new();
        let mut events = Vec::new();
        let mut released = Vec::with_capacity(active.len());

        for mut allocation in active {
            let index = match lots.iter().position(|l| l.id_typed() == allocation.lot_id()) {
                Some(index) => index,
                None => {
                    let lot = self.load_lot(tenant_id, &allocation)?;
                    // First sight of this lot: its stored version is the expectation.
                    uow.stage_lot(lot.clone(), ExpectedVersion::Exact(lot.version()));
                    lots.push(lot);
                    lots.len() - 1
                }
            };

            let allocation_version = allocation.version();
            events.extend(allocation.release(&mut lots[index], now)?);
            uow.stage_allocation(allocation.clone(), ExpectedVersion::Exact(allocation_version));
            released.push(allocation);
        }

        for lot in lots {
            uow.stage_lot(lot, ExpectedVersion::Any);
        }
        self.ctx.coordinator.publish(Some(&mut uow), events);
        uow.commit(self.ctx.store.as_ref())?;

        Ok(released)
    }

    fn load_lot(&self, tenant_id: TenantId, allocation: &Allocation) -> ServiceResult<Lot> {
        self.ctx
            .store
            .lot(tenant_id, allocation.lot_id())?
            .ok_or_else(|| ServiceError::from(StockError::not_found("lot")))
    }
}

//! Lot reception and placement.

use chrono::NaiveDate;
use tracing::info;

use lotkeeper_core::{AggregateRoot, ExpectedVersion, LocationId, ProductId, TenantId};
use lotkeeper_inventory::{Lot, LotId, PlaceLot, ReceiveLot, StockError};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::unit_of_work::UnitOfWork;

/// A consignment line confirmed as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveLotRequest {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub quantity: u64,
    pub expiration_date: Option<NaiveDate>,
    pub consignment_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceivingService {
    ctx: ServiceContext,
}

impl ReceivingService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a lot with its initial classification.
    pub fn receive(&self, request: &ReceiveLotRequest) -> ServiceResult<Lot> {
        let tenant_id = request.tenant_id;
        self.ctx.ensure_product(tenant_id, request.product_id)?;
        if let Some(location_id) = request.location_id {
            if !self.ctx.locations.is_available(tenant_id, location_id) {
                return Err(StockError::LocationUnavailable(location_id).into());
            }
        }

        let (lot, events) = Lot::receive(ReceiveLot {
            tenant_id,
            lot_id: LotId::generate(),
            product_id: request.product_id,
            location_id: request.location_id,
            quantity: request.quantity,
            expiration_date: request.expiration_date,
            consignment_ref: request.consignment_ref.clone(),
            received_on: self.ctx.clock.today(),
            occurred_at: self.ctx.clock.now(),
        })?;

        let mut uow = UnitOfWork::begin(tenant_id);
        uow.stage_lot(lot.clone(), ExpectedVersion::New);
        self.ctx.coordinator.publish(Some(&mut uow), events);
        uow.commit(self.ctx.store.as_ref())?;

        info!(
            tenant_id = %tenant_id,
            lot_id = %lot.id_typed(),
            product_id = %request.product_id,
            quantity = lot.quantity(),
            classification = %lot.classification(),
            "lot received"
        );
        Ok(lot)
    }

    /// Bind an unassigned lot to a location.
    pub fn place(&self, tenant_id: TenantId, lot_id: LotId, location_id: LocationId) -> ServiceResult<Lot> {
        if !self.ctx.locations.is_available(tenant_id, location_id) {
            return Err(StockError::LocationUnavailable(location_id).into());
        }

        let lot = self.ctx.with_retries("place", tenant_id, || {
            let mut lot = self
                .ctx
                .store
                .lot(tenant_id, lot_id)?
                .ok_or_else(|| ServiceError::from(StockError::not_found("lot")))?;
            let version = lot.version();
            let events = lot.place(PlaceLot {
                tenant_id,
                location_id,
                occurred_at: self.ctx.clock.now(),
            })?;
            if events.is_empty() {
                return Ok(lot);
            }

            let mut uow = UnitOfWork::begin(tenant_id);
            uow.stage_lot(lot.clone(), ExpectedVersion::Exact(version));
            self.ctx.coordinator.publish(Some(&mut uow), events);
            uow.commit(self.ctx.store.as_ref())?;
            Ok(lot)
        })?;

        info!(tenant_id = %tenant_id, lot_id = %lot_id, location_id = %location_id, "lot placed");
        Ok(lot)
    }
}

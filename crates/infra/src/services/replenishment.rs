//! Restock request generation and lifecycle.

use tracing::info;

use lotkeeper_core::{ExpectedVersion, LocationId, ProductId, TenantId};
use lotkeeper_inventory::{
    GenerateRestock, LowStockSignal, RestockKey, RestockRequest, RestockRequestId, StockError, StockEvent,
};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::unit_of_work::UnitOfWork;

/// Stock levels observed for a product (optionally at one location).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReplenishment {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub current: u64,
    pub minimum: u64,
    pub maximum: u64,
}

impl From<LowStockSignal> for TriggerReplenishment {
    fn from(signal: LowStockSignal) -> Self {
        Self {
            tenant_id: signal.tenant_id,
            product_id: signal.product_id,
            location_id: signal.location_id,
            current: signal.current,
            minimum: signal.minimum,
            maximum: signal.maximum,
        }
    }
}

impl TriggerReplenishment {
    fn key(&self) -> RestockKey {
        RestockKey {
            tenant_id: self.tenant_id,
            product_id: self.product_id,
            location_id: self.location_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplenishmentService {
    ctx: ServiceContext,
}

impl ReplenishmentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a PENDING restock request.
    ///
    /// Fails with `DuplicateRestockRequest` while another request for the
    /// same tenant, product and location is active.
    pub fn trigger(&self, trigger: &TriggerReplenishment) -> ServiceResult<RestockRequest> {
        let duplicate = || StockError::DuplicateRestockRequest {
            product_id: trigger.product_id,
            location_id: trigger.location_id,
        };

        if self.ctx.store.active_restock_request(trigger.key())?.is_some() {
            return Err(duplicate().into());
        }

        let (request, event) = RestockRequest::generate(GenerateRestock {
            tenant_id: trigger.tenant_id,
            product_id: trigger.product_id,
            location_id: trigger.location_id,
            current: trigger.current,
            minimum: trigger.minimum,
            maximum: trigger.maximum,
            occurred_at: self.ctx.clock.now(),
        })?;

        let mut uow = UnitOfWork::begin(trigger.tenant_id);
        uow.stage_restock_request(request.clone(), ExpectedVersion::New);
        self.ctx.coordinator.publish(Some(&mut uow), vec![event]);
        match uow.commit(self.ctx.store.as_ref()) {
            Ok(()) => {}
            // A concurrent trigger won the race for the key.
            Err(StoreError::UniqueViolation(_)) => return Err(duplicate().into()),
            Err(err) => return Err(err.into()),
        }

        info!(
            tenant_id = %trigger.tenant_id,
            product_id = %trigger.product_id,
            request_id = %request.id_typed(),
            priority = ?request.priority(),
            requested_quantity = request.requested_quantity(),
            "restock request generated"
        );
        Ok(request)
    }

    pub fn mark_sent(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.transition(tenant_id, request_id, "mark_sent", |r, now| r.mark_sent(now))
    }

    pub fn complete(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.transition(tenant_id, request_id, "complete", |r, now| r.complete(now))
    }

    pub fn cancel(&self, tenant_id: TenantId, request_id: RestockRequestId) -> ServiceResult<RestockRequest> {
        self.transition(tenant_id, request_id, "cancel", |r, now| r.cancel(now))
    }

    fn transition(
        &self,
        tenant_id: TenantId,
        request_id: RestockRequestId,
        operation: &'static str,
        step: impl Fn(&mut RestockRequest, chrono::DateTime<chrono::Utc>) -> Result<StockEvent, StockError>,
    ) -> ServiceResult<RestockRequest> {
        let request = self.ctx.with_retries(operation, tenant_id, || {
            let mut request = self
                .ctx
                .store
                .restock_request(tenant_id, request_id)?
                .ok_or_else(|| ServiceError::from(StockError::not_found("restock request")))?;
            let version = request.version();
            let event = step(&mut request, self.ctx.clock.now())?;

            let mut uow = UnitOfWork::begin(tenant_id);
            uow.stage_restock_request(request.clone(), ExpectedVersion::Exact(version));
            self.ctx.coordinator.publish(Some(&mut uow), vec![event]);
            uow.commit(self.ctx.store.as_ref())?;
            Ok(request)
        })?;

        info!(
            tenant_id = %tenant_id,
            request_id = %request_id,
            status = %request.status(),
            "restock request updated"
        );
        Ok(request)
    }

    /// Active (PENDING or SENT) requests of a tenant.
    pub fn active_requests(&self, tenant_id: TenantId) -> ServiceResult<Vec<RestockRequest>> {
        Ok(self
            .ctx
            .store
            .restock_requests(tenant_id)?
            .into_iter()
            .filter(RestockRequest::is_active)
            .collect())
    }
}

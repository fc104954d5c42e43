//! Manual stock adjustments.

use tracing::info;

use lotkeeper_core::{LocationId, ProductId, TenantId, UserId};
use lotkeeper_inventory::{apply_adjustment, AdjustStock, AdjustmentOutcome, AdjustmentType, LotId};

use super::{expected_version, ServiceContext};
use crate::error::ServiceResult;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRequest {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub lot_id: Option<LotId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub reason: String,
    pub authorization_code: Option<String>,
    pub actor: UserId,
}

#[derive(Debug, Clone)]
pub struct AdjustmentService {
    ctx: ServiceContext,
}

impl AdjustmentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Adjust quantity in the resolved scope and record the audit entry.
    pub fn adjust(&self, request: &AdjustmentRequest) -> ServiceResult<AdjustmentOutcome> {
        let tenant_id = request.tenant_id;
        self.adjust_stock(request).validate()?;
        self.ctx.ensure_product(tenant_id, request.product_id)?;

        let outcome = self
            .ctx
            .with_retries("adjust", tenant_id, || self.try_adjust(request))?;

        info!(
            tenant_id = %tenant_id,
            product_id = %request.product_id,
            adjustment_type = ?request.adjustment_type,
            quantity = request.quantity,
            before = outcome.before(),
            after = outcome.after(),
            created_lot = outcome.created_lot.is_some(),
            actor = %request.actor,
            "stock adjusted"
        );
        Ok(outcome)
    }

    fn adjust_stock(&self, request: &AdjustmentRequest) -> AdjustStock {
        AdjustStock {
            tenant_id: request.tenant_id,
            product_id: request.product_id,
            location_id: request.location_id,
            lot_id: request.lot_id,
            adjustment_type: request.adjustment_type,
            quantity: request.quantity,
            reason: request.reason.clone(),
            authorization_code: request.authorization_code.clone(),
            actor: request.actor,
            today: self.ctx.clock.today(),
            occurred_at: self.ctx.clock.now(),
        }
    }

    fn try_adjust(&self, request: &AdjustmentRequest) -> ServiceResult<AdjustmentOutcome> {
        let tenant_id = request.tenant_id;
        let mut lots = self.ctx.store.lots_for_product(tenant_id, request.product_id)?;

        // An explicit lot of another product must still be found, so scope
        // resolution can reject it as a mismatch rather than "not found".
        if let Some(lot_id) = request.lot_id {
            if !lots.iter().any(|l| l.id_typed() == lot_id) {
                if let Some(lot) = self.ctx.store.lot(tenant_id, lot_id)? {
                    lots.push(lot);
                }
            }
        }

        let policy = self.ctx.config.policy_for(tenant_id);
        let outcome = apply_adjustment(&self.adjust_stock(request), &lots, policy)?;

        let mut uow = UnitOfWork::begin(tenant_id);
        for lot in &outcome.lots {
            uow.stage_lot(lot.clone(), expected_version(&lots, lot.id_typed()));
        }
        uow.record_adjustment(outcome.adjustment.clone());
        self.ctx.coordinator.publish(Some(&mut uow), outcome.events.clone());
        uow.commit(self.ctx.store.as_ref())?;

        Ok(outcome)
    }
}

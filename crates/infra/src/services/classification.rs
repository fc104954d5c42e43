//! Expiry reclassification, per lot and as a tenant-wide sweep.

use serde::Serialize;
use tracing::{debug, error, info};

use lotkeeper_core::{AggregateRoot, ExpectedVersion, TenantId};
use lotkeeper_inventory::{LotId, ReclassifyLot, StockError, StockEvent};

use super::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::unit_of_work::UnitOfWork;

/// Outcome of one sweep over a tenant's lots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub changed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ClassificationService {
    ctx: ServiceContext,
}

impl ClassificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reclassify one lot for today's date.
    ///
    /// Returns the events raised; empty when the classification is unchanged
    /// (nothing is written in that case).
    pub fn classify(&self, tenant_id: TenantId, lot_id: LotId) -> ServiceResult<Vec<StockEvent>> {
        self.ctx
            .with_retries("classify", tenant_id, || self.try_classify(tenant_id, lot_id))
    }

    fn try_classify(&self, tenant_id: TenantId, lot_id: LotId) -> ServiceResult<Vec<StockEvent>> {
        let mut lot = self
            .ctx
            .store
            .lot(tenant_id, lot_id)?
            .ok_or_else(|| ServiceError::from(StockError::not_found("lot")))?;
        let version = lot.version();

        let events = lot.reclassify(ReclassifyLot {
            tenant_id,
            today: self.ctx.clock.today(),
            occurred_at: self.ctx.clock.now(),
        })?;
        if events.is_empty() {
            return Ok(events);
        }

        debug!(
            tenant_id = %tenant_id,
            lot_id = %lot_id,
            classification = %lot.classification(),
            "lot reclassified"
        );

        let mut uow = UnitOfWork::begin(tenant_id);
        uow.stage_lot(lot, ExpectedVersion::Exact(version));
        self.ctx.coordinator.publish(Some(&mut uow), events.clone());
        uow.commit(self.ctx.store.as_ref())?;

        Ok(events)
    }

    /// Reclassify every lot of a tenant, one unit of work per lot.
    ///
    /// A lot that fails is logged and counted; the sweep carries on.
    pub fn sweep(&self, tenant_id: TenantId) -> ServiceResult<SweepReport> {
        let lots = self.ctx.store.lots_for_tenant(tenant_id)?;
        let mut report = SweepReport::default();

        for lot in lots {
            report.examined += 1;
            match self.classify(tenant_id, lot.id_typed()) {
                Ok(events) if events.is_empty() => {}
                Ok(_) => report.changed += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(
                        tenant_id = %tenant_id,
                        lot_id = %lot.id_typed(),
                        error = %err,
                        "lot reclassification failed during sweep"
                    );
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            examined = report.examined,
            changed = report.changed,
            failed = report.failed,
            "classification sweep finished"
        );
        Ok(report)
    }
}

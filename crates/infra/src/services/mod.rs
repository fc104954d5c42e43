//! Application services: load → decide (pure domain) → stage → commit.
//!
//! Each operation runs inside one [`UnitOfWork`](crate::unit_of_work::UnitOfWork);
//! its events go through the [`EventCommitCoordinator`] and reach the sink
//! only after the commit. A commit rejected by an optimistic version check is
//! retried from a fresh read, up to the tenant's `max_conflict_retries`.

pub mod adjustment;
pub mod allocation;
pub mod classification;
pub mod receiving;
pub mod replenishment;

use std::sync::Arc;

use tracing::warn;

use lotkeeper_core::{AggregateRoot, ExpectedVersion, TenantId};
use lotkeeper_inventory::{Lot, LotId};

use crate::config::EngineConfig;
use crate::coordinator::EventCommitCoordinator;
use crate::error::ServiceResult;
use crate::ports::{Clock, LocationAvailability, ProductCatalog};
use crate::store::InventoryStore;

pub use adjustment::{AdjustmentRequest, AdjustmentService};
pub use allocation::{AllocationRequest, AllocationService};
pub use classification::{ClassificationService, SweepReport};
pub use receiving::{ReceiveLotRequest, ReceivingService};
pub use replenishment::{ReplenishmentService, TriggerReplenishment};

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn InventoryStore>,
    pub coordinator: EventCommitCoordinator,
    pub products: Arc<dyn ProductCatalog>,
    pub locations: Arc<dyn LocationAvailability>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
}

impl core::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    /// Run `attempt` until it succeeds, fails for a reason other than an
    /// optimistic conflict, or the tenant's retries run out.
    pub(crate) fn with_retries<T>(
        &self,
        operation: &'static str,
        tenant_id: TenantId,
        mut attempt: impl FnMut() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let max_retries = self.config.policy_for(tenant_id).max_conflict_retries;
        let mut retries = 0;
        loop {
            match attempt() {
                Err(err) if err.is_conflict() && retries < max_retries => {
                    retries += 1;
                    warn!(
                        operation,
                        tenant_id = %tenant_id,
                        retry = retries,
                        max_retries,
                        error = %err,
                        "optimistic concurrency conflict, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    /// Reject unknown products before anything is read or written.
    pub(crate) fn ensure_product(
        &self,
        tenant_id: TenantId,
        product_id: lotkeeper_core::ProductId,
    ) -> ServiceResult<()> {
        if self.products.exists(tenant_id, product_id) {
            Ok(())
        } else {
            Err(lotkeeper_inventory::StockError::not_found("product").into())
        }
    }
}

/// Version expectation for writing back `lot_id`: the version it had when
/// read, or `New` if it was created during the operation.
pub(crate) fn expected_version(read: &[Lot], lot_id: LotId) -> ExpectedVersion {
    read.iter()
        .find(|lot| lot.id_typed() == lot_id)
        .map_or(ExpectedVersion::New, |lot| ExpectedVersion::Exact(lot.version()))
}

//! Explicit unit of work: staged writes plus after-commit hooks.
//!
//! ```text
//! begin → stage records → on_commit(hook) → commit(store) → hooks run
//!                                          ↘ rollback / drop → hooks discarded
//! ```
//!
//! Hooks run only after the store has accepted the whole change set, in
//! registration order. A failed commit drops them unrun.

use tracing::debug;

use lotkeeper_core::{ExpectedVersion, TenantId};
use lotkeeper_inventory::{Adjustment, Allocation, Lot, RestockRequest};

use crate::error::StoreError;
use crate::store::{ChangeSet, InventoryStore};

pub type CommitHook = Box<dyn FnOnce() + Send>;

pub struct UnitOfWork {
    changes: ChangeSet,
    hooks: Vec<CommitHook>,
}

impl core::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("changes", &self.changes)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl UnitOfWork {
    pub fn begin(tenant_id: TenantId) -> Self {
        Self {
            changes: ChangeSet::new(tenant_id),
            hooks: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.changes.tenant_id()
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Stage a lot write. Staging the same lot again replaces the record but
    /// keeps the first expectation (the version originally read).
    pub fn stage_lot(&mut self, lot: Lot, expected: ExpectedVersion) {
        match self
            .changes
            .lots
            .iter_mut()
            .find(|(staged, _)| staged.id_typed() == lot.id_typed())
        {
            Some(entry) => entry.0 = lot,
            None => self.changes.lots.push((lot, expected)),
        }
    }

    pub fn stage_allocation(&mut self, allocation: Allocation, expected: ExpectedVersion) {
        self.changes.allocations.push((allocation, expected));
    }

    pub fn record_adjustment(&mut self, adjustment: Adjustment) {
        self.changes.adjustments.push(adjustment);
    }

    pub fn stage_restock_request(&mut self, request: RestockRequest, expected: ExpectedVersion) {
        self.changes.restock_requests.push((request, expected));
    }

    /// Register a hook to run once the commit has succeeded.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Write the staged records atomically, then run the hooks.
    pub fn commit<S>(self, store: &S) -> Result<(), StoreError>
    where
        S: InventoryStore + ?Sized,
    {
        let UnitOfWork { changes, hooks } = self;
        store.commit(changes)?;

        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Discard staged writes and hooks.
    pub fn rollback(self) {
        debug!(
            tenant_id = %self.tenant_id(),
            records = self.changes.len(),
            hooks = self.hooks.len(),
            "unit of work rolled back"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{NaiveDate, Utc};
    use lotkeeper_core::{AggregateRoot, ProductId};
    use lotkeeper_inventory::{LotId, ReceiveLot};

    use crate::store::InMemoryInventoryStore;

    fn lot(tenant_id: TenantId) -> Lot {
        Lot::receive(ReceiveLot {
            tenant_id,
            lot_id: LotId::generate(),
            product_id: ProductId::new(),
            location_id: None,
            quantity: 3,
            expiration_date: None,
            consignment_ref: None,
            received_on: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            occurred_at: Utc::now(),
        })
        .unwrap()
        .0
    }

    #[test]
    fn hooks_run_after_a_successful_commit() {
        let store = InMemoryInventoryStore::new();
        let tenant_id = TenantId::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut uow = UnitOfWork::begin(tenant_id);
        uow.stage_lot(lot(tenant_id), ExpectedVersion::New);
        let counter = ran.clone();
        uow.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        uow.commit(&store).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_commit_and_rollback_drop_hooks() {
        let store = InMemoryInventoryStore::new();
        let tenant_id = TenantId::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut failing = UnitOfWork::begin(tenant_id);
        failing.stage_lot(lot(tenant_id), ExpectedVersion::Exact(42));
        let counter = ran.clone();
        failing.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(failing.commit(&store).is_err());

        let mut rolled_back = UnitOfWork::begin(tenant_id);
        let counter = ran.clone();
        rolled_back.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        rolled_back.rollback();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restaging_a_lot_keeps_the_original_expectation() {
        let tenant_id = TenantId::new();
        let original = lot(tenant_id);
        let mut uow = UnitOfWork::begin(tenant_id);

        uow.stage_lot(original.clone(), ExpectedVersion::Exact(original.version()));
        uow.stage_lot(original.clone(), ExpectedVersion::Exact(99));

        assert_eq!(uow.changes().lots.len(), 1);
        assert_eq!(uow.changes().lots[0].1, ExpectedVersion::Exact(original.version()));
    }
}

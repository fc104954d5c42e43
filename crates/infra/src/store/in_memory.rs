use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use lotkeeper_core::{AggregateRoot, ExpectedVersion, ProductId, TenantId};
use lotkeeper_inventory::{
    Adjustment, AdjustmentId, Allocation, AllocationId, Lot, LotId, RestockKey, RestockRequest,
    RestockRequestId,
};

use super::r#trait::{ChangeSet, InventoryStore};
use crate::error::StoreError;

/// Insertion-ordered records with a keyed index.
#[derive(Debug)]
struct Table<K, V> {
    rows: Vec<V>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + std::hash::Hash, V> Table<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    fn upsert(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&i) => self.rows[i] = value,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(value);
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &V> {
        self.rows.iter()
    }
}

#[derive(Debug, Default)]
struct State {
    lots: Table<(TenantId, LotId), Lot>,
    allocations: Table<(TenantId, AllocationId), Allocation>,
    adjustments: Table<(TenantId, AdjustmentId), Adjustment>,
    restock_requests: Table<(TenantId, RestockRequestId), RestockRequest>,
}

/// In-memory inventory store with optimistic version checks.
///
/// One `RwLock` over all tables makes every commit atomic and serializes
/// conflicting writers. Intended for tests/dev and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }
}

fn check_version(
    what: &str,
    id: impl std::fmt::Display,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{what} {id}: expected {expected:?}, found {actual:?}"
        )))
    }
}

fn check_tenant(what: &str, expected: TenantId, actual: Option<TenantId>) -> Result<(), StoreError> {
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(StoreError::TenantIsolation(format!(
            "{what} does not belong to tenant {expected}"
        )))
    }
}

fn validate(state: &State, changes: &ChangeSet) -> Result<(), StoreError> {
    let tenant_id = changes.tenant_id();

    for (lot, expected) in &changes.lots {
        check_tenant("lot", tenant_id, lot.tenant_id())?;
        let actual = state.lots.get(&(tenant_id, lot.id_typed())).map(Lot::version);
        check_version("lot", lot.id_typed(), *expected, actual)?;
    }

    for (allocation, expected) in &changes.allocations {
        check_tenant("allocation", tenant_id, Some(allocation.tenant_id()))?;
        let actual = state
            .allocations
            .get(&(tenant_id, allocation.id_typed()))
            .map(Allocation::version);
        check_version("allocation", allocation.id_typed(), *expected, actual)?;
    }

    for adjustment in &changes.adjustments {
        check_tenant("adjustment", tenant_id, Some(adjustment.tenant_id))?;
        if state.adjustments.get(&(tenant_id, adjustment.id)).is_some() {
            return Err(StoreError::UniqueViolation(format!(
                "adjustment {} already recorded",
                adjustment.id
            )));
        }
    }

    let mut staged_active: HashSet<RestockKey> = HashSet::new();
    for (request, expected) in &changes.restock_requests {
        check_tenant("restock request", tenant_id, Some(request.tenant_id()))?;
        let actual = state
            .restock_requests
            .get(&(tenant_id, request.id_typed()))
            .map(RestockRequest::version);
        check_version("restock request", request.id_typed(), *expected, actual)?;

        if !request.is_active() {
            continue;
        }
        let key = request.key();
        let clash = state
            .restock_requests
            .iter()
            .any(|r| r.is_active() && r.key() == key && r.id_typed() != request.id_typed());
        if clash || !staged_active.insert(key) {
            return Err(StoreError::UniqueViolation(format!(
                "active restock request exists for product {}",
                key.product_id
            )));
        }
    }

    Ok(())
}

impl InventoryStore for InMemoryInventoryStore {
    fn lot(&self, tenant_id: TenantId, lot_id: LotId) -> Result<Option<Lot>, StoreError> {
        self.read(|s| s.lots.get(&(tenant_id, lot_id)).cloned())
    }

    fn lots_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Lot>, StoreError> {
        self.read(|s| {
            s.lots
                .iter()
                .filter(|l| l.tenant_id() == Some(tenant_id) && l.product_id() == Some(product_id))
                .cloned()
                .collect()
        })
    }

    fn lots_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Lot>, StoreError> {
        self.read(|s| {
            s.lots
                .iter()
                .filter(|l| l.tenant_id() == Some(tenant_id))
                .cloned()
                .collect()
        })
    }

    fn allocation(&self, tenant_id: TenantId, allocation_id: AllocationId) -> Result<Option<Allocation>, StoreError> {
        self.read(|s| s.allocations.get(&(tenant_id, allocation_id)).cloned())
    }

    fn allocations_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> Result<Vec<Allocation>, StoreError> {
        self.read(|s| {
            s.allocations
                .iter()
                .filter(|a| a.tenant_id() == tenant_id && a.reference_id() == Some(reference_id))
                .cloned()
                .collect()
        })
    }

    fn adjustments_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Adjustment>, StoreError> {
        self.read(|s| {
            s.adjustments
                .iter()
                .filter(|a| a.tenant_id == tenant_id && a.product_id == product_id)
                .cloned()
                .collect()
        })
    }

    fn restock_request(
        &self,
        tenant_id: TenantId,
        request_id: RestockRequestId,
    ) -> Result<Option<RestockRequest>, StoreError> {
        self.read(|s| s.restock_requests.get(&(tenant_id, request_id)).cloned())
    }

    fn active_restock_request(&self, key: RestockKey) -> Result<Option<RestockRequest>, StoreError> {
        self.read(|s| {
            s.restock_requests
                .iter()
                .find(|r| r.is_active() && r.key() == key)
                .cloned()
        })
    }

    fn restock_requests(&self, tenant_id: TenantId) -> Result<Vec<RestockRequest>, StoreError> {
        self.read(|s| {
            s.restock_requests
                .iter()
                .filter(|r| r.tenant_id() == tenant_id)
                .cloned()
                .collect()
        })
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        validate(&state, &changes)?;

        // Validated as a whole; nothing below can fail.
        let tenant_id = changes.tenant_id();
        for (lot, _) in changes.lots {
            state.lots.upsert((tenant_id, lot.id_typed()), lot);
        }
        for (allocation, _) in changes.allocations {
            state.allocations.upsert((tenant_id, allocation.id_typed()), allocation);
        }
        for adjustment in changes.adjustments {
            state.adjustments.upsert((tenant_id, adjustment.id), adjustment);
        }
        for (request, _) in changes.restock_requests {
            state.restock_requests.upsert((tenant_id, request.id_typed()), request);
        }

        Ok(())
    }
}

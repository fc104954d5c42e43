//! Integration tests for the full pipeline.
//!
//! Tests: Engine → Service → UnitOfWork → Store → Coordinator → Sink / Bus
//!
//! Verifies:
//! - FEFO allocation, classification, adjustment and replenishment end to end
//! - Events reach the sink only after the store accepted the commit
//! - Concurrent allocations never both succeed against the same units

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use chrono::NaiveDate;

    use lotkeeper_core::{ErrorCategory, LocationId, ProductId, TenantId, UserId};
    use lotkeeper_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use lotkeeper_inventory::{
        Adjustment, AdjustmentType, Allocation, AllocationId, AllocationType, Classification, Lot,
        LotId, ReorderPoint, RestockKey, RestockPriority, RestockRequest, RestockRequestId,
        StockError, StockEvent,
    };

    use crate::config::EngineConfig;
    use crate::coordinator::EventCommitCoordinator;
    use crate::engine::{InMemoryEngine, InventoryEngine};
    use crate::error::{ServiceError, StoreError};
    use crate::ports::{
        FixedClock, InMemoryLocationAvailability, InMemoryProductCatalog, InMemoryReorderPoints,
    };
    use crate::services::{
        AdjustmentRequest, AllocationRequest, ReceiveLotRequest, ServiceContext, TriggerReplenishment,
    };
    use crate::sink::{BusMessageSink, InMemoryMessageSink};
    use crate::store::{ChangeSet, InMemoryInventoryStore, InventoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn start() -> NaiveDate {
        date(2026, 1, 5)
    }

    struct Harness {
        engine: InventoryEngine,
        mem: InMemoryEngine,
        sink: Arc<InMemoryMessageSink>,
        clock: Arc<FixedClock>,
        tenant_id: TenantId,
        product_id: ProductId,
    }

    impl Harness {
        fn new() -> Self {
            lotkeeper_observability::init_for_tests();
            let sink = Arc::new(InMemoryMessageSink::new());
            let clock = Arc::new(FixedClock::at_date(start()));
            let mem = InventoryEngine::in_memory(EngineConfig::default(), clock.clone(), sink.clone());
            let tenant_id = TenantId::new();
            let product_id = mem.products.register(tenant_id, "SKU-MILK-1L");

            Self {
                engine: mem.engine.clone(),
                mem,
                sink,
                clock,
                tenant_id,
                product_id,
            }
        }

        fn receive(&self, quantity: u64, expiration_date: Option<NaiveDate>) -> Lot {
            self.receive_at(quantity, expiration_date, None)
        }

        fn receive_at(&self, quantity: u64, expiration_date: Option<NaiveDate>, location_id: Option<LocationId>) -> Lot {
            self.engine
                .receive_lot(&ReceiveLotRequest {
                    tenant_id: self.tenant_id,
                    product_id: self.product_id,
                    location_id,
                    quantity,
                    expiration_date,
                    consignment_ref: Some("CNS-2026-001".to_string()),
                })
                .unwrap()
        }

        fn allocation(&self, quantity: u64) -> AllocationRequest {
            AllocationRequest {
                tenant_id: self.tenant_id,
                product_id: self.product_id,
                location_id: None,
                quantity,
                allocation_type: AllocationType::Reservation,
                reference_id: None,
            }
        }

        fn adjustment(&self, adjustment_type: AdjustmentType, quantity: u64) -> AdjustmentRequest {
            AdjustmentRequest {
                tenant_id: self.tenant_id,
                product_id: self.product_id,
                location_id: None,
                lot_id: None,
                adjustment_type,
                quantity,
                reason: "cycle count".to_string(),
                authorization_code: None,
                actor: UserId::new(),
            }
        }

        fn trigger(&self, current: u64, minimum: u64, maximum: u64) -> TriggerReplenishment {
            TriggerReplenishment {
                tenant_id: self.tenant_id,
                product_id: self.product_id,
                location_id: None,
                current,
                minimum,
                maximum,
            }
        }

        fn stored(&self, lot: &Lot) -> Lot {
            self.mem.store.lot(self.tenant_id, lot.id_typed()).unwrap().unwrap()
        }

        fn events_of<T>(&self, pick: impl Fn(&StockEvent) -> Option<T>) -> Vec<T> {
            self.sink.events().iter().filter_map(pick).collect()
        }
    }

    #[test]
    fn fefo_allocation_draws_nearest_expiry_first() {
        let h = Harness::new();
        let feb = h.receive(100, Some(date(2026, 2, 15)));
        let jan25 = h.receive(50, Some(date(2026, 1, 25)));
        let jan12 = h.receive(30, Some(date(2026, 1, 12)));

        let result = h.engine.allocate(&h.allocation(60)).unwrap();

        assert_eq!(result.total, 60);
        let drawn: Vec<(LotId, u64)> = result
            .allocations
            .iter()
            .map(|a| (a.lot_id(), a.quantity()))
            .collect();
        assert_eq!(drawn, vec![(jan12.id_typed(), 30), (jan25.id_typed(), 30)]);

        assert_eq!(h.stored(&jan12).available(), 0);
        assert_eq!(h.stored(&jan25).available(), 20);
        assert_eq!(h.stored(&feb).allocated_quantity(), 0);

        let allocated = h.events_of(|e| match e {
            StockEvent::StockAllocated(a) => Some((a.lot_id, a.quantity)),
            _ => None,
        });
        assert_eq!(allocated, drawn);
    }

    #[test]
    fn classification_emits_once_per_transition() {
        let h = Harness::new();
        let lot = h.receive(10, Some(start() + chrono::Duration::days(40)));
        assert_eq!(lot.classification(), Classification::Normal);

        h.clock.advance(chrono::Duration::days(37));
        let events = h.engine.classify_lot(h.tenant_id, lot.id_typed()).unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            StockEvent::LotClassified(e) if e.previous == Classification::Normal && e.new == Classification::Critical
        ));
        assert!(matches!(
            &events[1],
            StockEvent::LotExpiringAlert(e) if e.days_remaining == 3 && e.new_classification == Classification::Critical
        ));
        assert_eq!(h.stored(&lot).classification(), Classification::Critical);

        let delivered = h.sink.events().len();
        assert!(h.engine.classify_lot(h.tenant_id, lot.id_typed()).unwrap().is_empty());
        assert_eq!(h.sink.events().len(), delivered);
    }

    #[test]
    fn expired_lot_is_skipped_by_allocation() {
        let h = Harness::new();
        let expiring = h.receive(50, Some(start() + chrono::Duration::days(1)));
        h.clock.advance(chrono::Duration::days(2));

        let events = h.engine.classify_lot(h.tenant_id, expiring.id_typed()).unwrap();
        assert!(events.iter().any(|e| matches!(e, StockEvent::LotExpired(_))));
        assert!(!h.stored(&expiring).can_be_allocated());

        let err = h.engine.allocate(&h.allocation(1)).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Stock(StockError::InsufficientStock { requested: 1, available: 0 })
        );

        let fresh = h.receive(5, None);
        let result = h.engine.allocate(&h.allocation(5)).unwrap();
        assert_eq!(result.allocations[0].lot_id(), fresh.id_typed());
    }

    #[test]
    fn adjustment_guards_leave_quantity_untouched() {
        let h = Harness::new();
        let lot = h.receive(100, None);

        let mut decrease = h.adjustment(AdjustmentType::Decrease, 150);
        decrease.authorization_code = Some("SUP-42".to_string());
        let err = h.engine.adjust(&decrease).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Stock(StockError::InsufficientStockForAdjustment { requested: 150, current: 100 })
        );
        assert_eq!(h.stored(&lot).quantity(), 100);

        let err = h.engine.adjust(&h.adjustment(AdjustmentType::Increase, 120)).unwrap_err();
        assert!(matches!(err, ServiceError::Stock(StockError::MissingAuthorization { .. })));
        assert_eq!(h.stored(&lot).quantity(), 100);

        let outcome = h.engine.adjust(&h.adjustment(AdjustmentType::Increase, 99)).unwrap();
        assert_eq!((outcome.before(), outcome.after()), (100, 199));
        assert_eq!(h.stored(&lot).quantity(), 199);

        let audit: Vec<Adjustment> = h.engine.adjustments_for_product(h.tenant_id, h.product_id).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].quantity_after, 199);
        let adjusted = h.events_of(|e| match e {
            StockEvent::StockAdjusted(a) => Some((a.quantity_before, a.quantity_after)),
            _ => None,
        });
        assert_eq!(adjusted, vec![(100, 199)]);
    }

    #[test]
    fn tenant_threshold_override_applies() {
        let h = Harness::new();
        let mut config = EngineConfig::default();
        config.tenants.insert(
            h.tenant_id,
            lotkeeper_inventory::InventoryPolicy {
                authorization_threshold: 500,
                ..Default::default()
            },
        );
        let mem = InventoryEngine::in_memory(config, h.clock.clone(), h.sink.clone());
        let product_id = mem.products.register(h.tenant_id, "SKU-BULK");

        let mut request = h.adjustment(AdjustmentType::Increase, 250);
        request.product_id = product_id;
        assert!(mem.engine.adjust(&request).is_ok());
    }

    #[test]
    fn increase_without_stock_materializes_a_lot() {
        let h = Harness::new();
        let location_id = LocationId::new();
        let mut request = h.adjustment(AdjustmentType::Increase, 25);
        request.location_id = Some(location_id);

        let outcome = h.engine.adjust(&request).unwrap();
        let lot_id = outcome.created_lot.unwrap();

        let lots = h.engine.lots_in_fefo_order(h.tenant_id, h.product_id).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].id_typed(), lot_id);
        assert_eq!(lots[0].location_id(), Some(location_id));
        assert_eq!(h.engine.available_quantity(h.tenant_id, h.product_id, Some(location_id)).unwrap(), 25);

        let kinds: Vec<&str> = h.sink.events().iter().map(lotkeeper_events::Event::event_type).collect();
        assert_eq!(kinds, vec!["inventory.lot.created", "inventory.stock.adjusted"]);
    }

    #[test]
    fn duplicate_trigger_fails_loudly() {
        let h = Harness::new();

        let request = h.engine.trigger_replenishment(&h.trigger(10, 50, 200)).unwrap();
        assert_eq!(request.priority(), RestockPriority::High);
        assert_eq!(request.requested_quantity(), 190);

        let err = h.engine.trigger_replenishment(&h.trigger(12, 50, 200)).unwrap_err();
        assert!(matches!(err, ServiceError::Stock(StockError::DuplicateRestockRequest { .. })));
        assert_eq!(err.category(), ErrorCategory::BusinessRule);

        // Another location is a different key.
        let mut elsewhere = h.trigger(10, 50, 200);
        elsewhere.location_id = Some(LocationId::new());
        assert!(h.engine.trigger_replenishment(&elsewhere).is_ok());
    }

    #[test]
    fn restock_lifecycle_frees_the_key() {
        let h = Harness::new();
        let request = h.engine.trigger_replenishment(&h.trigger(0, 10, 20)).unwrap();

        let sent = h.engine.mark_restock_sent(h.tenant_id, request.id_typed()).unwrap();
        assert!(sent.is_active());
        assert!(h.engine.trigger_replenishment(&h.trigger(0, 10, 20)).is_err());

        h.engine.complete_restock(h.tenant_id, request.id_typed()).unwrap();
        assert!(h.engine.active_restock_requests(h.tenant_id).unwrap().is_empty());
        assert!(h.engine.trigger_replenishment(&h.trigger(0, 10, 20)).is_ok());

        let err = h.engine.cancel_restock(h.tenant_id, RestockRequestId::generate()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn low_stock_after_allocation_triggers_replenishment_once() {
        let h = Harness::new();
        h.mem.reorder_points.upsert(ReorderPoint {
            tenant_id: h.tenant_id,
            product_id: h.product_id,
            location_id: None,
            minimum: 20,
            maximum: 100,
        });
        h.receive(30, None);

        h.engine.allocate(&h.allocation(15)).unwrap();
        let active = h.engine.active_restock_requests(h.tenant_id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].current_quantity(), 15);
        assert_eq!(active[0].priority(), RestockPriority::Medium);
        assert_eq!(active[0].requested_quantity(), 85);

        // Still low: the automatic path swallows the duplicate.
        h.engine.allocate(&h.allocation(1)).unwrap();
        assert_eq!(h.engine.active_restock_requests(h.tenant_id).unwrap().len(), 1);

        let generated = h.events_of(|e| match e {
            StockEvent::RestockRequestGenerated(g) => Some(g.priority),
            _ => None,
        });
        assert_eq!(generated, vec![RestockPriority::Medium]);
    }

    #[test]
    fn release_is_never_a_silent_no_op() {
        let h = Harness::new();
        let lot = h.receive(10, None);
        let result = h.engine.allocate(&h.allocation(4)).unwrap();
        let allocation_id = result.allocations[0].id_typed();

        let released: Allocation = h.engine.release(h.tenant_id, allocation_id).unwrap();
        assert!(!released.is_active());
        assert_eq!(h.stored(&lot).allocated_quantity(), 0);

        assert_eq!(
            h.engine.release(h.tenant_id, allocation_id).unwrap_err(),
            ServiceError::Stock(StockError::AlreadyReleased)
        );
        assert_eq!(
            h.engine.release(h.tenant_id, AllocationId::generate()).unwrap_err().category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn release_by_reference_frees_every_allocation_of_the_order() {
        let h = Harness::new();
        let first = h.receive(5, Some(date(2026, 3, 1)));
        let second = h.receive(5, Some(date(2026, 4, 1)));

        let mut order = h.allocation(8);
        order.allocation_type = AllocationType::SalesOrder;
        order.reference_id = Some("SO-7781".to_string());
        h.engine.allocate(&order).unwrap();
        assert_eq!(h.engine.allocations_by_reference(h.tenant_id, "SO-7781").unwrap().len(), 2);

        let released = h.engine.release_by_reference(h.tenant_id, "SO-7781").unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(h.stored(&first).allocated_quantity(), 0);
        assert_eq!(h.stored(&second).allocated_quantity(), 0);
        assert!(h.engine.release_by_reference(h.tenant_id, "SO-7781").unwrap().is_empty());

        let releases = h.events_of(|e| match e {
            StockEvent::StockAllocationReleased(r) => Some(r.quantity),
            _ => None,
        });
        assert_eq!(releases, vec![5, 3]);
    }

    #[test]
    fn sales_order_requires_reference() {
        let h = Harness::new();
        h.receive(5, None);
        let mut order = h.allocation(1);
        order.allocation_type = AllocationType::SalesOrder;

        let err = h.engine.allocate(&order).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn unknown_product_and_unavailable_location_are_rejected() {
        let h = Harness::new();
        h.receive(5, None);

        let mut unknown = h.allocation(1);
        unknown.product_id = ProductId::new();
        assert_eq!(h.engine.allocate(&unknown).unwrap_err().category(), ErrorCategory::NotFound);

        let closed = LocationId::new();
        h.mem.locations.set_available(h.tenant_id, closed, false);
        let mut at_closed = h.allocation(1);
        at_closed.location_id = Some(closed);
        assert_eq!(
            h.engine.allocate(&at_closed).unwrap_err(),
            ServiceError::Stock(StockError::LocationUnavailable(closed))
        );
        assert!(h.sink.events().iter().all(|e| !matches!(e, StockEvent::StockAllocated(_))));
    }

    #[test]
    fn resolve_product_maps_codes() {
        let h = Harness::new();
        assert_eq!(h.engine.resolve_product(h.tenant_id, "SKU-MILK-1L").unwrap(), h.product_id);
        assert_eq!(
            h.engine.resolve_product(h.tenant_id, "SKU-NONE").unwrap_err().category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn location_request_binds_unassigned_lot() {
        let h = Harness::new();
        let location_id = LocationId::new();
        let lot = h.receive(10, None);

        let mut request = h.allocation(4);
        request.location_id = Some(location_id);
        h.engine.allocate(&request).unwrap();

        assert_eq!(h.stored(&lot).location_id(), Some(location_id));
        assert_eq!(h.engine.available_quantity(h.tenant_id, h.product_id, Some(location_id)).unwrap(), 6);

        let other = LocationId::new();
        assert!(h.engine.place_lot(h.tenant_id, lot.id_typed(), other).is_err());
    }

    #[test]
    fn bus_sink_wraps_events_in_envelopes() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<StockEvent>>> = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let clock = Arc::new(FixedClock::at_date(start()));
        let mem = InventoryEngine::in_memory(
            EngineConfig::default(),
            clock,
            Arc::new(BusMessageSink::new(bus.clone())),
        );
        let tenant_id = TenantId::new();
        let other_tenant = TenantId::new();
        let product_id = mem.products.register(tenant_id, "SKU-1");
        let other_product = mem.products.register(other_tenant, "SKU-1");

        for (tenant_id, product_id) in [(tenant_id, product_id), (other_tenant, other_product)] {
            mem.engine
                .receive_lot(&ReceiveLotRequest {
                    tenant_id,
                    product_id,
                    location_id: None,
                    quantity: 3,
                    expiration_date: None,
                    consignment_ref: None,
                })
                .unwrap();
        }

        let mine = subscription.drain_tenant(tenant_id);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].event_type(), "inventory.lot.created");
        assert_eq!(mine[0].aggregate_type(), "inventory.lot");
        assert!(matches!(mine[0].payload(), StockEvent::LotCreated(e) if e.product_id == product_id));
    }

    /// Store wrapper recording what the sink had seen when each commit
    /// started, and able to reject commits.
    struct ProbeStore {
        inner: InMemoryInventoryStore,
        sink: Arc<InMemoryMessageSink>,
        seen_at_commit: Mutex<Vec<usize>>,
        reject: AtomicBool,
    }

    impl InventoryStore for ProbeStore {
        fn lot(&self, tenant_id: TenantId, lot_id: LotId) -> Result<Option<Lot>, StoreError> {
            self.inner.lot(tenant_id, lot_id)
        }

        fn lots_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Lot>, StoreError> {
            self.inner.lots_for_product(tenant_id, product_id)
        }

        fn lots_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Lot>, StoreError> {
            self.inner.lots_for_tenant(tenant_id)
        }

        fn allocation(&self, tenant_id: TenantId, allocation_id: AllocationId) -> Result<Option<Allocation>, StoreError> {
            self.inner.allocation(tenant_id, allocation_id)
        }

        fn allocations_by_reference(&self, tenant_id: TenantId, reference_id: &str) -> Result<Vec<Allocation>, StoreError> {
            self.inner.allocations_by_reference(tenant_id, reference_id)
        }

        fn adjustments_for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Adjustment>, StoreError> {
            self.inner.adjustments_for_product(tenant_id, product_id)
        }

        fn restock_request(
            &self,
            tenant_id: TenantId,
            request_id: RestockRequestId,
        ) -> Result<Option<RestockRequest>, StoreError> {
            self.inner.restock_request(tenant_id, request_id)
        }

        fn active_restock_request(&self, key: RestockKey) -> Result<Option<RestockRequest>, StoreError> {
            self.inner.active_restock_request(key)
        }

        fn restock_requests(&self, tenant_id: TenantId) -> Result<Vec<RestockRequest>, StoreError> {
            self.inner.restock_requests(tenant_id)
        }

        fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
            if let Ok(mut seen) = self.seen_at_commit.lock() {
                seen.push(self.sink.events().len());
            }
            if self.reject.load(Ordering::SeqCst) {
                return Err(StoreError::Conflict("rejected by probe".to_string()));
            }
            self.inner.commit(changes)
        }
    }

    fn probe_engine() -> (InventoryEngine, Arc<ProbeStore>, Arc<InMemoryMessageSink>, TenantId, ProductId) {
        let sink = Arc::new(InMemoryMessageSink::new());
        let store = Arc::new(ProbeStore {
            inner: InMemoryInventoryStore::new(),
            sink: sink.clone(),
            seen_at_commit: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        });
        let products = Arc::new(InMemoryProductCatalog::new());
        let tenant_id = TenantId::new();
        let product_id = products.register(tenant_id, "SKU-PROBE");

        let ctx = ServiceContext {
            store: store.clone(),
            coordinator: EventCommitCoordinator::new(sink.clone()),
            products,
            locations: Arc::new(InMemoryLocationAvailability::new()),
            clock: Arc::new(FixedClock::at_date(start())),
            config: Arc::new(EngineConfig::default()),
        };
        let engine = InventoryEngine::new(ctx, Arc::new(InMemoryReorderPoints::default()));
        (engine, store, sink, tenant_id, product_id)
    }

    #[test]
    fn no_event_reaches_the_sink_before_commit_returns() {
        let (engine, store, sink, tenant_id, product_id) = probe_engine();

        engine
            .receive_lot(&ReceiveLotRequest {
                tenant_id,
                product_id,
                location_id: None,
                quantity: 10,
                expiration_date: None,
                consignment_ref: None,
            })
            .unwrap();
        engine
            .allocate(&AllocationRequest {
                tenant_id,
                product_id,
                location_id: None,
                quantity: 4,
                allocation_type: AllocationType::Reservation,
                reference_id: None,
            })
            .unwrap();

        // Each commit saw only the events of the operations before it.
        let seen = store.seen_at_commit.lock().unwrap().clone();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn rejected_commit_delivers_nothing() {
        let (engine, store, sink, tenant_id, product_id) = probe_engine();
        store.reject.store(true, Ordering::SeqCst);

        let err = engine
            .receive_lot(&ReceiveLotRequest {
                tenant_id,
                product_id,
                location_id: None,
                quantity: 10,
                expiration_date: None,
                consignment_ref: None,
            })
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert!(sink.events().is_empty());
        assert!(store.lots_for_tenant(tenant_id).unwrap().is_empty());
    }

    #[test]
    fn conflicts_are_retried_then_surfaced() {
        let (engine, store, sink, tenant_id, product_id) = probe_engine();
        engine
            .receive_lot(&ReceiveLotRequest {
                tenant_id,
                product_id,
                location_id: None,
                quantity: 10,
                expiration_date: None,
                consignment_ref: None,
            })
            .unwrap();
        store.reject.store(true, Ordering::SeqCst);

        let err = engine
            .allocate(&AllocationRequest {
                tenant_id,
                product_id,
                location_id: None,
                quantity: 1,
                allocation_type: AllocationType::Reservation,
                reference_id: None,
            })
            .unwrap_err();

        assert!(err.is_conflict());
        // One receive commit, then 1 + max_conflict_retries allocation attempts.
        assert_eq!(store.seen_at_commit.lock().unwrap().len(), 1 + 1 + 3);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn publication_failure_does_not_fail_the_operation() {
        let h = Harness::new();
        h.receive(10, None);
        h.sink.set_failing(true);

        let result = h.engine.allocate(&h.allocation(3)).unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(
            h.engine.available_quantity(h.tenant_id, h.product_id, None).unwrap(),
            7
        );
    }

    #[test]
    fn concurrent_allocations_never_share_units() {
        for _ in 0..20 {
            let h = Harness::new();
            let last_units = h.receive(10, Some(date(2026, 1, 20)));
            let fallback = h.receive(5, Some(date(2026, 2, 20)));

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let engine = h.engine.clone();
                    let request = h.allocation(10);
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        engine.allocate(&request)
                    })
                })
                .collect();
            let outcomes: Vec<_> = handles.into_iter().map(|j| j.join().unwrap()).collect();

            let succeeded: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
            assert_eq!(succeeded.len(), 1, "exactly one allocation wins: {outcomes:?}");
            assert_eq!(succeeded[0].total, 10);
            for outcome in &outcomes {
                if let Err(err) = outcome {
                    assert!(matches!(
                        err,
                        ServiceError::Stock(StockError::InsufficientStock { requested: 10, available: 5 })
                    ));
                }
            }

            let a = h.stored(&last_units);
            let b = h.stored(&fallback);
            assert_eq!(a.allocated_quantity() + b.allocated_quantity(), 10);
            assert!(a.allocated_quantity() <= a.quantity());
            assert!(b.allocated_quantity() <= b.quantity());
        }
    }

    #[test]
    fn concurrent_allocations_fall_back_to_remaining_lots() {
        let h = Harness::new();
        let first = h.receive(6, Some(date(2026, 1, 20)));
        let second = h.receive(6, Some(date(2026, 2, 20)));

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = h.engine.clone();
                let request = h.allocation(5);
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.allocate(&request)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().total, 5);
        }

        let total = h.stored(&first).allocated_quantity() + h.stored(&second).allocated_quantity();
        assert_eq!(total, 10);
        assert_eq!(h.stored(&first).allocated_quantity(), 6);
    }

    #[test]
    fn sweep_worker_reclassifies_in_background() {
        let h = Harness::new();
        let lot = h.receive(10, Some(start() + chrono::Duration::days(20)));
        let untouched = h.receive(10, None);
        assert_eq!(lot.classification(), Classification::NearExpiry);
        h.clock.advance(chrono::Duration::days(15));

        let worker = h.engine.spawn_sweep_worker(vec![h.tenant_id]).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.stats().runs == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let stats = worker.stats();
        worker.shutdown();

        assert_eq!(stats.runs, 1);
        assert_eq!(stats.examined, 2);
        assert_eq!(stats.changed, 1);
        assert_eq!(h.stored(&lot).classification(), Classification::Critical);
        assert_eq!(h.stored(&untouched).classification(), Classification::Normal);
    }

    #[test]
    fn sweep_report_counts_transitions_only() {
        let h = Harness::new();
        h.receive(1, Some(start() + chrono::Duration::days(31)));
        h.receive(1, Some(start() + chrono::Duration::days(100)));
        h.clock.advance(chrono::Duration::days(1));

        let report = h.engine.sweep(h.tenant_id).unwrap();
        assert_eq!((report.examined, report.changed, report.failed), (2, 1, 0));
        assert_eq!(h.engine.sweep(h.tenant_id).unwrap().changed, 0);
    }
}

//! FEFO allocation: reserving quantity against lots, nearest expiry first.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{Entity, LocationId, ProductId, TenantId};

use crate::error::{StockError, StockResult};
use crate::events::StockEvent;
use crate::id::{AllocationId, LotId};
use crate::lot::{AllocateFromLot, Lot, ReleaseFromLot};

/// What the reserved quantity is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationType {
    SalesOrder,
    PickingOrder,
    Reservation,
}

impl AllocationType {
    /// Order-type reservations must name the order they serve.
    pub fn requires_reference(self) -> bool {
        matches!(self, AllocationType::SalesOrder | AllocationType::PickingOrder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Allocated,
    Released,
}

/// A reservation of quantity from one lot for one demand.
///
/// Created by an allocation, moves to `Released` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    id: AllocationId,
    tenant_id: TenantId,
    product_id: ProductId,
    location_id: Option<LocationId>,
    lot_id: LotId,
    quantity: u64,
    allocation_type: AllocationType,
    reference_id: Option<String>,
    status: AllocationStatus,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Allocation {
    pub fn id_typed(&self) -> AllocationId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn lot_id(&self) -> LotId {
        self.lot_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn allocation_type(&self) -> AllocationType {
        self.allocation_type
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.reference_id.as_deref()
    }

    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Allocated
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Release this allocation against its originating lot.
    ///
    /// Both records are updated together; on error neither is touched.
    pub fn release(&mut self, lot: &mut Lot, occurred_at: DateTime<Utc>) -> StockResult<Vec<StockEvent>> {
        if self.status == AllocationStatus::Released {
            return Err(StockError::AlreadyReleased);
        }
        if lot.id_typed() != self.lot_id {
            return Err(StockError::invariant("allocation does not belong to this lot"));
        }

        let events = lot.release(ReleaseFromLot {
            tenant_id: self.tenant_id,
            allocation_id: self.id,
            quantity: self.quantity,
            reference_id: self.reference_id.clone(),
            occurred_at,
        })?;

        self.status = AllocationStatus::Released;
        self.released_at = Some(occurred_at);
        self.version += 1;
        Ok(events)
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Request: allocate `quantity` of a product, optionally at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub quantity: u64,
    pub allocation_type: AllocationType,
    pub reference_id: Option<String>,
    /// Business date; lots dated before it are never drawn.
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

impl AllocateStock {
    pub fn validate(&self) -> StockResult<()> {
        if self.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        let has_reference = self
            .reference_id
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if self.allocation_type.requires_reference() && !has_reference {
            return Err(StockError::validation(format!(
                "reference_id is required for {:?} allocations",
                self.allocation_type
            )));
        }
        Ok(())
    }
}

/// One step of an allocation plan: take `quantity` from `lot_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: u64,
}

/// Sort lots First-Expired-First-Out: ascending expiration date, undated
/// lots last, ties keep their input order.
pub fn sort_fefo(lots: &mut [Lot]) {
    lots.sort_by_key(|lot| (lot.expiration_date().is_none(), lot.expiration_date()));
}

/// Select the candidate lots for a request, in draw order.
///
/// - expired lots (stored classification or calendar) and lots of other
///   products never qualify
/// - with a location: lots bound to it in FEFO order, followed by the
///   unassigned lots of the product in FEFO order when the bound ones cannot
///   cover the request; unassigned stock only covers the shortfall
/// - without a location: every eligible lot in FEFO order
pub fn candidate_lots(
    lots: &[Lot],
    product_id: ProductId,
    location_id: Option<LocationId>,
    quantity: u64,
    today: NaiveDate,
) -> Vec<Lot> {
    let eligible = lots.iter().filter(|lot| {
        lot.product_id() == Some(product_id) && lot.can_be_allocated_on(today) && lot.available() > 0
    });

    match location_id {
        None => {
            let mut candidates: Vec<Lot> = eligible.cloned().collect();
            sort_fefo(&mut candidates);
            candidates
        }
        Some(location) => {
            let (mut bound, mut unassigned): (Vec<Lot>, Vec<Lot>) = eligible
                .filter(|lot| lot.location_id().is_none_or(|l| l == location))
                .cloned()
                .partition(|lot| lot.location_id() == Some(location));
            sort_fefo(&mut bound);

            let bound_available: u64 = bound.iter().map(Lot::available).sum();
            if bound_available < quantity {
                sort_fefo(&mut unassigned);
                bound.append(&mut unassigned);
            }
            bound
        }
    }
}

/// Plan a FEFO allocation over `candidates` (already filtered and sorted).
///
/// Either the plan covers `quantity` exactly or an `InsufficientStock`
/// error is returned; there is no partial plan.
pub fn plan_fefo(
    candidates: &[Lot],
    location_id: Option<LocationId>,
    quantity: u64,
) -> StockResult<Vec<LotDraw>> {
    let usable = |lot: &&Lot| match (location_id, lot.location_id()) {
        (Some(requested), Some(bound)) => requested == bound,
        _ => true,
    };

    let available: u64 = candidates.iter().filter(usable).map(|lot| lot.available()).sum();
    if available < quantity {
        return Err(StockError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    let mut draws = Vec::new();
    for lot in candidates.iter().filter(usable) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.available());
        if take == 0 {
            continue;
        }
        draws.push(LotDraw {
            lot_id: lot.id_typed(),
            quantity: take,
        });
        remaining -= take;
    }

    Ok(draws)
}

/// Outcome of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResult {
    pub allocations: Vec<Allocation>,
    pub total: u64,
    /// The touched lots in their new state.
    pub lots: Vec<Lot>,
    pub events: Vec<StockEvent>,
}

/// Allocate `request.quantity` across `lots` using FEFO.
///
/// Pure: nothing is persisted. Every touched lot and every allocation record
/// is returned so the caller can write them in one unit of work. On any
/// error the caller's lots are unchanged (the function works on copies).
pub fn allocate_fefo(request: &AllocateStock, lots: &[Lot]) -> StockResult<AllocationResult> {
    request.validate()?;

    let mut candidates = candidate_lots(
        lots,
        request.product_id,
        request.location_id,
        request.quantity,
        request.today,
    );
    let draws = plan_fefo(&candidates, request.location_id, request.quantity)?;

    let mut result = AllocationResult {
        allocations: Vec::with_capacity(draws.len()),
        total: 0,
        lots: Vec::with_capacity(draws.len()),
        events: Vec::with_capacity(draws.len()),
    };

    for draw in draws {
        let Some(lot) = candidates.iter_mut().find(|l| l.id_typed() == draw.lot_id) else {
            return Err(StockError::invariant("planned lot disappeared from candidates"));
        };

        let allocation_id = AllocationId::generate();
        let events = lot.allocate(AllocateFromLot {
            tenant_id: request.tenant_id,
            allocation_id,
            quantity: draw.quantity,
            allocation_type: request.allocation_type,
            reference_id: request.reference_id.clone(),
            requested_location: request.location_id,
            occurred_at: request.occurred_at,
        })?;

        result.allocations.push(Allocation {
            id: allocation_id,
            tenant_id: request.tenant_id,
            product_id: request.product_id,
            location_id: lot.location_id(),
            lot_id: draw.lot_id,
            quantity: draw.quantity,
            allocation_type: request.allocation_type,
            reference_id: request.reference_id.clone(),
            status: AllocationStatus::Allocated,
            created_at: request.occurred_at,
            released_at: None,
            version: 1,
        });
        result.total += draw.quantity;
        result.lots.push(lot.clone());
        result.events.extend(events);
    }

    if result.total != request.quantity {
        return Err(StockError::invariant("allocation plan does not cover the request"));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::Classification;
    use crate::lot::{PlaceLot, ReceiveLot, ReclassifyLot};
    use chrono::Duration;
    use lotkeeper_core::AggregateRoot;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2026, 1, 5)
    }

    struct Fixture {
        tenant_id: TenantId,
        product_id: ProductId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tenant_id: TenantId::new(),
                product_id: ProductId::new(),
            }
        }

        fn lot(&self, quantity: u64, expiration_date: Option<NaiveDate>, location: Option<LocationId>) -> Lot {
            Lot::receive(ReceiveLot {
                tenant_id: self.tenant_id,
                lot_id: LotId::generate(),
                product_id: self.product_id,
                location_id: location,
                quantity,
                expiration_date,
                consignment_ref: None,
                received_on: today(),
                occurred_at: Utc::now(),
            })
            .unwrap()
            .0
        }

        fn request(&self, quantity: u64, location_id: Option<LocationId>) -> AllocateStock {
            AllocateStock {
                tenant_id: self.tenant_id,
                product_id: self.product_id,
                location_id,
                quantity,
                allocation_type: AllocationType::Reservation,
                reference_id: None,
                today: today(),
                occurred_at: Utc::now(),
            }
        }
    }

    fn drawn(result: &AllocationResult, lot: &Lot) -> u64 {
        result
            .allocations
            .iter()
            .filter(|a| a.lot_id() == lot.id_typed())
            .map(|a| a.quantity())
            .sum()
    }

    #[test]
    fn fefo_scenario_draws_nearest_expiry_first() {
        let f = Fixture::new();
        let feb = f.lot(100, Some(date(2026, 2, 15)), None);
        let jan25 = f.lot(50, Some(date(2026, 1, 25)), None);
        let jan12 = f.lot(30, Some(date(2026, 1, 12)), None);
        let lots = vec![feb.clone(), jan25.clone(), jan12.clone()];

        let result = allocate_fefo(&f.request(60, None), &lots).unwrap();

        assert_eq!(result.total, 60);
        assert_eq!(result.allocations.len(), 2);
        assert_eq!(result.allocations[0].lot_id(), jan12.id_typed());
        assert_eq!(drawn(&result, &jan12), 30);
        assert_eq!(drawn(&result, &jan25), 30);
        assert_eq!(drawn(&result, &feb), 0);

        let touched_jan25 = result.lots.iter().find(|l| l.id_typed() == jan25.id_typed()).unwrap();
        assert_eq!(touched_jan25.available(), 20);
        assert!(result.lots.iter().all(|l| l.id_typed() != feb.id_typed()));
    }

    #[test]
    fn undated_lots_sort_last_and_ties_keep_input_order() {
        let f = Fixture::new();
        let undated = f.lot(10, None, None);
        let first = f.lot(10, Some(date(2026, 3, 1)), None);
        let second = f.lot(10, Some(date(2026, 3, 1)), None);
        let mut lots = vec![undated.clone(), first.clone(), second.clone()];

        sort_fefo(&mut lots);

        let order: Vec<_> = lots.iter().map(|l| l.id_typed()).collect();
        assert_eq!(order, vec![first.id_typed(), second.id_typed(), undated.id_typed()]);
    }

    #[test]
    fn insufficient_stock_fails_without_partial_result() {
        let f = Fixture::new();
        let lots = vec![f.lot(10, None, None), f.lot(5, None, None)];

        let err = allocate_fefo(&f.request(16, None), &lots).unwrap_err();

        assert_eq!(err, StockError::InsufficientStock { requested: 16, available: 15 });
        assert!(lots.iter().all(|l| l.allocated_quantity() == 0));
    }

    #[test]
    fn expired_lots_are_skipped_even_with_available_quantity() {
        let f = Fixture::new();
        let mut expired = f.lot(100, Some(today() + Duration::days(1)), None);
        expired
            .reclassify(ReclassifyLot {
                tenant_id: f.tenant_id,
                today: today() + Duration::days(2),
                occurred_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(expired.classification(), Classification::Expired);
        let fresh = f.lot(5, Some(today() + Duration::days(90)), None);

        let mut request = f.request(5, None);
        request.today = today() + Duration::days(2);
        let lots = vec![expired.clone(), fresh.clone()];

        let result = allocate_fefo(&request, &lots).unwrap();
        assert_eq!(drawn(&result, &fresh), 5);
        assert_eq!(drawn(&result, &expired), 0);

        request.quantity = 6;
        assert!(matches!(
            allocate_fefo(&request, &lots),
            Err(StockError::InsufficientStock { available: 5, .. })
        ));
    }

    #[test]
    fn location_request_prefers_bound_lots() {
        let f = Fixture::new();
        let location = LocationId::new();
        let unassigned = f.lot(50, Some(date(2026, 1, 20)), None);
        let bound = f.lot(50, Some(date(2026, 6, 1)), Some(location));

        let result = allocate_fefo(&f.request(30, Some(location)), &[unassigned.clone(), bound.clone()]).unwrap();

        assert_eq!(drawn(&result, &bound), 30);
        assert_eq!(drawn(&result, &unassigned), 0);
    }

    #[test]
    fn location_request_falls_back_to_unassigned_lots_and_binds_them() {
        let f = Fixture::new();
        let location = LocationId::new();
        let elsewhere = f.lot(100, Some(date(2026, 1, 7)), Some(LocationId::new()));
        let bound = f.lot(20, Some(date(2026, 6, 1)), Some(location));
        let unassigned = f.lot(50, Some(date(2026, 1, 20)), None);
        let lots = vec![elsewhere.clone(), bound.clone(), unassigned.clone()];

        let result = allocate_fefo(&f.request(40, Some(location)), &lots).unwrap();

        assert_eq!(result.total, 40);
        assert_eq!(drawn(&result, &elsewhere), 0);
        // Bound stock goes first even though the unassigned lot expires earlier.
        assert_eq!(drawn(&result, &bound), 20);
        assert_eq!(drawn(&result, &unassigned), 20);
        let touched = result.lots.iter().find(|l| l.id_typed() == unassigned.id_typed()).unwrap();
        assert_eq!(touched.location_id(), Some(location));
        assert!(result.allocations.iter().all(|a| a.location_id() == Some(location)));
    }

    #[test]
    fn bound_lots_are_drawn_in_fefo_order_before_unassigned() {
        let f = Fixture::new();
        let location = LocationId::new();
        let late = f.lot(5, Some(date(2026, 9, 1)), Some(location));
        let early = f.lot(5, Some(date(2026, 4, 1)), Some(location));
        let unassigned_early = f.lot(10, Some(date(2026, 1, 15)), None);
        let unassigned_late = f.lot(10, Some(date(2026, 3, 1)), None);

        let candidates = candidate_lots(
            &[late.clone(), unassigned_late.clone(), early.clone(), unassigned_early.clone()],
            f.product_id,
            Some(location),
            14,
            today(),
        );
        let order: Vec<LotId> = candidates.iter().map(Lot::id_typed).collect();
        assert_eq!(
            order,
            vec![early.id_typed(), late.id_typed(), unassigned_early.id_typed(), unassigned_late.id_typed()]
        );

        // Bound stock alone covers the request: no unassigned lot is offered.
        let covered = candidate_lots(&[late, early, unassigned_early], f.product_id, Some(location), 10, today());
        assert!(covered.iter().all(|lot| lot.location_id() == Some(location)));
    }

    #[test]
    fn lots_bound_elsewhere_never_count_toward_location_request() {
        let f = Fixture::new();
        let location = LocationId::new();
        let lots = vec![
            f.lot(100, None, Some(LocationId::new())),
            f.lot(10, None, Some(location)),
        ];

        assert_eq!(
            allocate_fefo(&f.request(11, Some(location)), &lots),
            Err(StockError::InsufficientStock { requested: 11, available: 10 })
        );
    }

    #[test]
    fn order_types_require_reference() {
        let f = Fixture::new();
        let lots = vec![f.lot(10, None, None)];
        let mut request = f.request(1, None);
        request.allocation_type = AllocationType::SalesOrder;

        assert!(allocate_fefo(&request, &lots).is_err());

        request.reference_id = Some("SO-1001".to_string());
        let result = allocate_fefo(&request, &lots).unwrap();
        assert_eq!(result.allocations[0].reference_id(), Some("SO-1001"));
    }

    #[test]
    fn zero_quantity_is_a_validation_error() {
        let f = Fixture::new();
        let err = allocate_fefo(&f.request(0, None), &[f.lot(1, None, None)]).unwrap_err();
        assert_eq!(err.category(), lotkeeper_core::ErrorCategory::Validation);
    }

    #[test]
    fn release_flips_status_once() {
        let f = Fixture::new();
        let lots = vec![f.lot(10, None, None)];
        let mut result = allocate_fefo(&f.request(4, None), &lots).unwrap();
        let mut lot = result.lots.remove(0);
        let mut allocation = result.allocations.remove(0);

        let events = allocation.release(&mut lot, Utc::now()).unwrap();
        assert!(matches!(&events[0], StockEvent::StockAllocationReleased(e) if e.quantity == 4));
        assert_eq!(allocation.status(), AllocationStatus::Released);
        assert_eq!(lot.allocated_quantity(), 0);

        let lot_version = lot.version();
        assert_eq!(allocation.release(&mut lot, Utc::now()), Err(StockError::AlreadyReleased));
        assert_eq!(lot.version(), lot_version);
    }

    #[test]
    fn placed_lot_only_serves_its_location() {
        let f = Fixture::new();
        let location = LocationId::new();
        let mut lot = f.lot(10, None, None);
        lot.place(PlaceLot {
            tenant_id: f.tenant_id,
            location_id: location,
            occurred_at: Utc::now(),
        })
        .unwrap();

        assert!(allocate_fefo(&f.request(5, Some(LocationId::new())), &[lot.clone()]).is_err());
        assert!(allocate_fefo(&f.request(5, Some(location)), &[lot]).is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: a successful allocation covers the request exactly and
            /// each touched lot's allocated quantity grows by exactly its share.
            #[test]
            fn allocation_sums_to_request(
                lots in prop::collection::vec((1u64..100, prop::option::of(0i64..120)), 1..8),
                quantity in 1u64..400,
            ) {
                let f = Fixture::new();
                let lots: Vec<Lot> = lots
                    .into_iter()
                    .map(|(q, days)| f.lot(q, days.map(|d| today() + Duration::days(d)), None))
                    .collect();
                let total: u64 = lots.iter().map(|l| l.available()).sum();

                match allocate_fefo(&f.request(quantity, None), &lots) {
                    Ok(result) => {
                        prop_assert_eq!(result.total, quantity);
                        let sum: u64 = result.allocations.iter().map(|a| a.quantity()).sum();
                        prop_assert_eq!(sum, quantity);
                        for touched in &result.lots {
                            let original = lots.iter().find(|l| l.id_typed() == touched.id_typed()).unwrap();
                            prop_assert_eq!(
                                touched.allocated_quantity() - original.allocated_quantity(),
                                drawn(&result, original)
                            );
                            prop_assert!(touched.allocated_quantity() <= touched.quantity());
                        }
                    }
                    Err(StockError::InsufficientStock { requested, available }) => {
                        prop_assert!(quantity > total);
                        prop_assert_eq!(requested, quantity);
                        prop_assert_eq!(available, total);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }

            /// Property: no lot is drawn while a strictly earlier-expiring
            /// candidate still has quantity left.
            #[test]
            fn draws_respect_fefo_order(
                days in prop::collection::vec(0i64..200, 2..8),
                quantity in 1u64..60,
            ) {
                let f = Fixture::new();
                let lots: Vec<Lot> = days
                    .iter()
                    .map(|d| f.lot(10, Some(today() + Duration::days(*d)), None))
                    .collect();
                prop_assume!(quantity <= 10 * lots.len() as u64);

                let result = allocate_fefo(&f.request(quantity, None), &lots).unwrap();
                let mut sorted = lots.clone();
                sort_fefo(&mut sorted);

                let mut seen_partial = false;
                for lot in &sorted {
                    let taken = drawn(&result, lot);
                    if seen_partial {
                        prop_assert_eq!(taken, 0);
                    }
                    if taken < lot.available() {
                        seen_partial = true;
                    }
                }
            }
        }
    }
}

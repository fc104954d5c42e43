use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{Aggregate, AggregateRoot, LocationId, ProductId, TenantId};
use lotkeeper_events::execute;

use crate::adjustment::AdjustmentType;
use crate::allocation::AllocationType;
use crate::classification::{self, Classification};
use crate::error::{StockError, StockResult};
use crate::events::{
    LotClassified, LotCreated, LotExpired, LotExpiringAlert, LotPlaced, StockAllocated,
    StockAllocationReleased, StockEvent,
};
use crate::id::{AdjustmentId, AllocationId, LotId};

/// Aggregate root: Lot (a quantity of one product received together).
///
/// Invariant: `0 <= allocated_quantity <= quantity`. Lots are never deleted;
/// quantity may reach zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    id: LotId,
    tenant_id: Option<TenantId>,
    product_id: Option<ProductId>,
    location_id: Option<LocationId>,
    quantity: u64,
    allocated_quantity: u64,
    expiration_date: Option<NaiveDate>,
    classification: Classification,
    last_checked_on: Option<NaiveDate>,
    consignment_ref: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Lot {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: LotId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_id: None,
            location_id: None,
            quantity: 0,
            allocated_quantity: 0,
            expiration_date: None,
            classification: Classification::Normal,
            last_checked_on: None,
            consignment_ref: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    /// Factory: receive a new lot (consignment confirmation or a
    /// materializing increase). Validates every invariant up front.
    ///
    /// Returns the created lot with its published events: `LotCreated`, plus
    /// an expiring or expired alert when the lot arrives already urgent.
    pub fn receive(cmd: ReceiveLot) -> StockResult<(Lot, Vec<StockEvent>)> {
        let mut lot = Lot::empty(cmd.lot_id);
        let occurred_at = cmd.occurred_at;
        let events = execute(&mut lot, &LotCommand::Receive(cmd))?;

        let mut published = Vec::with_capacity(2);
        for ev in events {
            if let LotEvent::Created(created) = ev {
                let classification = created.classification;
                published.push(StockEvent::LotCreated(created));
                if let Some(alert) = lot.alert_for(classification, occurred_at) {
                    published.push(alert);
                }
            }
        }
        Ok((lot, published))
    }

    pub fn id_typed(&self) -> LotId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn allocated_quantity(&self) -> u64 {
        self.allocated_quantity
    }

    /// `quantity - allocated_quantity`, never negative.
    pub fn available(&self) -> u64 {
        self.quantity.saturating_sub(self.allocated_quantity)
    }

    pub fn expiration_date(&self) -> Option<NaiveDate> {
        self.expiration_date
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn last_checked_on(&self) -> Option<NaiveDate> {
        self.last_checked_on
    }

    pub fn consignment_ref(&self) -> Option<&str> {
        self.consignment_ref.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_unassigned(&self) -> bool {
        self.location_id.is_none()
    }

    /// Based on the stored classification only.
    pub fn can_be_allocated(&self) -> bool {
        self.created && self.classification.is_allocatable()
    }

    /// Stored classification plus the calendar: a lot whose date has passed
    /// is not allocatable even if the sweep has not reclassified it yet.
    pub fn can_be_allocated_on(&self, today: NaiveDate) -> bool {
        self.can_be_allocated() && self.expiration_date.is_none_or(|date| date >= today)
    }

    pub fn days_until_expiration(&self, today: NaiveDate) -> Option<i64> {
        self.expiration_date
            .map(|date| classification::days_until_expiration(today, date))
    }

    /// Bind an unassigned lot to a location.
    pub fn place(&mut self, cmd: PlaceLot) -> StockResult<Vec<StockEvent>> {
        self.run(LotCommand::Place(cmd))
    }

    /// Reserve part of this lot for an allocation.
    pub fn allocate(&mut self, cmd: AllocateFromLot) -> StockResult<Vec<StockEvent>> {
        self.run(LotCommand::Allocate(cmd))
    }

    /// Give back quantity reserved by an allocation.
    pub fn release(&mut self, cmd: ReleaseFromLot) -> StockResult<Vec<StockEvent>> {
        self.run(LotCommand::Release(cmd))
    }

    /// Change the physical quantity. The audit event is raised by the
    /// adjustment processor for the whole scope, so nothing is published
    /// here.
    pub fn adjust_quantity(&mut self, cmd: AdjustLotQuantity) -> StockResult<()> {
        self.run(LotCommand::AdjustQuantity(cmd))?;
        Ok(())
    }

    /// Recompute the classification for `cmd.today`.
    ///
    /// Unchanged → no events and no state change (not even the last-checked
    /// date). Changed → `LotClassified`, plus `LotExpiringAlert` when
    /// entering CRITICAL/NEAR_EXPIRY or `LotExpired` when entering EXPIRED.
    pub fn reclassify(&mut self, cmd: ReclassifyLot) -> StockResult<Vec<StockEvent>> {
        let occurred_at = cmd.occurred_at;
        let mut published = self.run(LotCommand::Reclassify(cmd))?;
        if let Some(StockEvent::LotClassified(e)) = published.first() {
            let new = e.new;
            if let Some(alert) = self.alert_for(new, occurred_at) {
                published.push(alert);
            }
        }
        Ok(published)
    }

    fn run(&mut self, cmd: LotCommand) -> StockResult<Vec<StockEvent>> {
        let events = execute(self, &cmd)?;
        Ok(events.into_iter().filter_map(LotEvent::into_published).collect())
    }

    fn alert_for(&self, entered: Classification, occurred_at: DateTime<Utc>) -> Option<StockEvent> {
        let (tenant_id, product_id, expiration_date) =
            (self.tenant_id?, self.product_id?, self.expiration_date?);
        let checked_on = self.last_checked_on?;

        if entered.is_expiring() {
            Some(StockEvent::LotExpiringAlert(LotExpiringAlert {
                tenant_id,
                lot_id: self.id,
                product_id,
                location_id: self.location_id,
                expiration_date,
                days_remaining: classification::days_until_expiration(checked_on, expiration_date),
                new_classification: entered,
                available_quantity: self.available(),
                occurred_at,
            }))
        } else if entered == Classification::Expired {
            Some(StockEvent::LotExpired(LotExpired {
                tenant_id,
                lot_id: self.id,
                product_id,
                location_id: self.location_id,
                expiration_date,
                quantity: self.quantity,
                occurred_at,
            }))
        } else {
            None
        }
    }
}

impl AggregateRoot for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub quantity: u64,
    pub expiration_date: Option<NaiveDate>,
    pub consignment_ref: Option<String>,
    /// Business date used for the initial classification.
    pub received_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceLot {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateFromLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateFromLot {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub quantity: u64,
    pub allocation_type: AllocationType,
    pub reference_id: Option<String>,
    /// Location requested by the caller; binds the lot when it is unassigned.
    pub requested_location: Option<LocationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseFromLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFromLot {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub quantity: u64,
    pub reference_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustLotQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustLotQuantity {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReclassifyLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclassifyLot {
    pub tenant_id: TenantId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotCommand {
    Receive(ReceiveLot),
    Place(PlaceLot),
    Allocate(AllocateFromLot),
    Release(ReleaseFromLot),
    AdjustQuantity(AdjustLotQuantity),
    Reclassify(ReclassifyLot),
}

/// Event: LotQuantityAdjusted (lot-internal; the published record is
/// `StockAdjusted` for the whole adjustment scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotQuantityAdjusted {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub adjustment_id: AdjustmentId,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// State transitions of a lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotEvent {
    Created(LotCreated),
    Placed(LotPlaced),
    Classified(LotClassified),
    Allocated(StockAllocated),
    AllocationReleased(StockAllocationReleased),
    QuantityAdjusted(LotQuantityAdjusted),
}

impl LotEvent {
    pub fn into_published(self) -> Option<StockEvent> {
        match self {
            LotEvent::Created(e) => Some(StockEvent::LotCreated(e)),
            LotEvent::Placed(e) => Some(StockEvent::LotPlaced(e)),
            LotEvent::Classified(e) => Some(StockEvent::LotClassified(e)),
            LotEvent::Allocated(e) => Some(StockEvent::StockAllocated(e)),
            LotEvent::AllocationReleased(e) => Some(StockEvent::StockAllocationReleased(e)),
            LotEvent::QuantityAdjusted(_) => None,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LotEvent::Created(e) => e.occurred_at,
            LotEvent::Placed(e) => e.occurred_at,
            LotEvent::Classified(e) => e.occurred_at,
            LotEvent::Allocated(e) => e.occurred_at,
            LotEvent::AllocationReleased(e) => e.occurred_at,
            LotEvent::QuantityAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lot {
    type Command = LotCommand;
    type Event = LotEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LotEvent::Created(e) => {
                self.id = e.lot_id;
                self.tenant_id = Some(e.tenant_id);
                self.product_id = Some(e.product_id);
                self.location_id = e.location_id;
                self.quantity = e.quantity;
                self.allocated_quantity = 0;
                self.expiration_date = e.expiration_date;
                self.classification = e.classification;
                self.last_checked_on = Some(e.received_on);
                self.consignment_ref = e.consignment_ref.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            LotEvent::Placed(e) => {
                self.location_id = Some(e.location_id);
            }
            LotEvent::Classified(e) => {
                self.classification = e.new;
                self.last_checked_on = Some(e.checked_on);
            }
            LotEvent::Allocated(e) => {
                self.allocated_quantity += e.quantity;
                if let Some(location_id) = e.bound_location {
                    self.location_id = Some(location_id);
                }
            }
            LotEvent::AllocationReleased(e) => {
                self.allocated_quantity = self.allocated_quantity.saturating_sub(e.quantity);
            }
            LotEvent::QuantityAdjusted(e) => match e.adjustment_type {
                AdjustmentType::Increase => self.quantity = self.quantity.saturating_add(e.quantity),
                AdjustmentType::Decrease => {
                    self.quantity = self.quantity.saturating_sub(e.quantity)
                }
            },
        }

        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LotCommand::Receive(cmd) => self.handle_receive(cmd),
            LotCommand::Place(cmd) => self.handle_place(cmd),
            LotCommand::Allocate(cmd) => self.handle_allocate(cmd),
            LotCommand::Release(cmd) => self.handle_release(cmd),
            LotCommand::AdjustQuantity(cmd) => self.handle_adjust(cmd),
            LotCommand::Reclassify(cmd) => self.handle_reclassify(cmd),
        }
    }
}

impl Lot {
    fn ensure_created(&self, tenant_id: TenantId) -> StockResult<(TenantId, ProductId)> {
        match (self.created, self.tenant_id, self.product_id) {
            (true, Some(t), Some(p)) if t == tenant_id => Ok((t, p)),
            (true, _, _) => Err(StockError::invariant("tenant mismatch")),
            _ => Err(StockError::not_found("lot")),
        }
    }

    fn handle_receive(&self, cmd: &ReceiveLot) -> StockResult<Vec<LotEvent>> {
        if self.created {
            return Err(StockError::Domain(lotkeeper_core::DomainError::conflict(
                "lot already exists",
            )));
        }
        if cmd.lot_id != self.id {
            return Err(StockError::invariant("lot_id mismatch"));
        }
        if cmd.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if cmd
            .consignment_ref
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            return Err(StockError::validation("consignment_ref cannot be blank"));
        }

        Ok(vec![LotEvent::Created(LotCreated {
            tenant_id: cmd.tenant_id,
            lot_id: cmd.lot_id,
            product_id: cmd.product_id,
            location_id: cmd.location_id,
            quantity: cmd.quantity,
            expiration_date: cmd.expiration_date,
            classification: classification::classify(cmd.received_on, cmd.expiration_date),
            consignment_ref: cmd.consignment_ref.clone(),
            received_on: cmd.received_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place(&self, cmd: &PlaceLot) -> StockResult<Vec<LotEvent>> {
        let (tenant_id, product_id) = self.ensure_created(cmd.tenant_id)?;
        match self.location_id {
            Some(current) if current == cmd.location_id => Ok(vec![]),
            Some(_) => Err(StockError::invariant("lot is already placed at another location")),
            None => Ok(vec![LotEvent::Placed(LotPlaced {
                tenant_id,
                lot_id: self.id,
                product_id,
                location_id: cmd.location_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_allocate(&self, cmd: &AllocateFromLot) -> StockResult<Vec<LotEvent>> {
        let (tenant_id, product_id) = self.ensure_created(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if !self.classification.is_allocatable() {
            return Err(StockError::invariant("expired lots cannot be allocated"));
        }
        if cmd.quantity > self.available() {
            return Err(StockError::InsufficientStock {
                requested: cmd.quantity,
                available: self.available(),
            });
        }

        let bound_location = match (self.location_id, cmd.requested_location) {
            (Some(current), Some(requested)) if current != requested => {
                return Err(StockError::invariant("lot is bound to a different location"));
            }
            (None, Some(requested)) => Some(requested),
            _ => None,
        };

        Ok(vec![LotEvent::Allocated(StockAllocated {
            tenant_id,
            allocation_id: cmd.allocation_id,
            lot_id: self.id,
            product_id,
            location_id: bound_location.or(self.location_id),
            bound_location,
            quantity: cmd.quantity,
            allocation_type: cmd.allocation_type,
            reference_id: cmd.reference_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseFromLot) -> StockResult<Vec<LotEvent>> {
        let (tenant_id, product_id) = self.ensure_created(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if cmd.quantity > self.allocated_quantity {
            return Err(StockError::invariant(
                "released quantity exceeds allocated quantity",
            ));
        }

        Ok(vec![LotEvent::AllocationReleased(StockAllocationReleased {
            tenant_id,
            allocation_id: cmd.allocation_id,
            lot_id: self.id,
            product_id,
            quantity: cmd.quantity,
            reference_id: cmd.reference_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustLotQuantity) -> StockResult<Vec<LotEvent>> {
        let (tenant_id, _) = self.ensure_created(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if cmd.adjustment_type == AdjustmentType::Decrease {
            // Reserved units cannot be adjusted away from under an allocation.
            if cmd.quantity > self.available() {
                return Err(StockError::InsufficientStockForAdjustment {
                    requested: cmd.quantity,
                    current: self.available(),
                });
            }
        } else if self.quantity.checked_add(cmd.quantity).is_none() {
            return Err(StockError::validation("quantity overflow"));
        }

        Ok(vec![LotEvent::QuantityAdjusted(LotQuantityAdjusted {
            tenant_id,
            lot_id: self.id,
            adjustment_id: cmd.adjustment_id,
            adjustment_type: cmd.adjustment_type,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reclassify(&self, cmd: &ReclassifyLot) -> StockResult<Vec<LotEvent>> {
        let (tenant_id, product_id) = self.ensure_created(cmd.tenant_id)?;

        let new = classification::classify(cmd.today, self.expiration_date);
        if new == self.classification {
            return Ok(vec![]);
        }

        Ok(vec![LotEvent::Classified(LotClassified {
            tenant_id,
            lot_id: self.id,
            product_id,
            previous: self.classification,
            new,
            checked_on: cmd.today,
            occurred_at: cmd.occurred_at,
        })])
    }
}

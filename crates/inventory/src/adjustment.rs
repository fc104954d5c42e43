//! Manual quantity adjustments with an audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{Entity, LocationId, ProductId, TenantId, UserId};

use crate::allocation::sort_fefo;
use crate::error::{StockError, StockResult};
use crate::events::{StockAdjusted, StockEvent};
use crate::id::{AdjustmentId, LotId};
use crate::lot::{AdjustLotQuantity, Lot, ReceiveLot};
use crate::policy::InventoryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Increase,
    Decrease,
}

/// Request: adjust the quantity of a product, a location or a single lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub lot_id: Option<LotId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub reason: String,
    pub authorization_code: Option<String>,
    pub actor: UserId,
    /// Business date; classifies a materialized lot.
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

impl AdjustStock {
    pub fn validate(&self) -> StockResult<()> {
        if self.quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if self.reason.trim().is_empty() {
            return Err(StockError::validation("reason cannot be empty"));
        }
        Ok(())
    }
}

/// Immutable audit record of one successful adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub location_id: Option<LocationId>,
    pub lot_id: Option<LotId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: u64,
    pub quantity_before: u64,
    pub quantity_after: u64,
    pub reason: String,
    pub authorization_code: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl Entity for Adjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The lots an adjustment applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentScope {
    /// An explicit lot.
    Lot(Lot),
    /// Lots at a location (or the unassigned fallback), FEFO ordered.
    Location { location_id: LocationId, lots: Vec<Lot> },
    /// Every lot of the product, FEFO ordered.
    Product(Vec<Lot>),
}

impl AdjustmentScope {
    pub fn lots(&self) -> &[Lot] {
        match self {
            AdjustmentScope::Lot(lot) => std::slice::from_ref(lot),
            AdjustmentScope::Location { lots, .. } | AdjustmentScope::Product(lots) => lots,
        }
    }

    /// Physical quantity in scope (allocated units included).
    pub fn current_quantity(&self) -> u64 {
        self.lots().iter().map(Lot::quantity).fold(0, u64::saturating_add)
    }

    /// Quantity a decrease may remove without touching reservations.
    pub fn adjustable_quantity(&self) -> u64 {
        self.lots().iter().map(Lot::available).fold(0, u64::saturating_add)
    }
}

/// Resolve the scope of an adjustment over the tenant's lots of the product.
///
/// An explicit lot wins. A location selects the lots bound there, falling
/// back to unassigned lots when none are bound. Otherwise every lot of the
/// product. Expired lots stay in scope: they are still physical stock.
pub fn resolve_scope(request: &AdjustStock, lots: &[Lot]) -> StockResult<AdjustmentScope> {
    if let Some(lot_id) = request.lot_id {
        let lot = lots
            .iter()
            .find(|l| l.id_typed() == lot_id)
            .ok_or_else(|| StockError::not_found("lot"))?;
        if lot.product_id() != Some(request.product_id) {
            return Err(StockError::validation("lot belongs to a different product"));
        }
        return Ok(AdjustmentScope::Lot(lot.clone()));
    }

    let of_product = lots.iter().filter(|l| l.product_id() == Some(request.product_id));

    let mut scoped: Vec<Lot> = match request.location_id {
        Some(location_id) => {
            let (bound, unassigned): (Vec<&Lot>, Vec<&Lot>) = of_product
                .filter(|l| l.location_id().is_none_or(|bound| bound == location_id))
                .partition(|l| l.location_id() == Some(location_id));
            let chosen = if bound.is_empty() { unassigned } else { bound };
            chosen.into_iter().cloned().collect()
        }
        None => of_product.cloned().collect(),
    };
    sort_fefo(&mut scoped);

    Ok(match request.location_id {
        Some(location_id) => AdjustmentScope::Location { location_id, lots: scoped },
        None => AdjustmentScope::Product(scoped),
    })
}

/// Outcome of a successful adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentOutcome {
    pub adjustment: Adjustment,
    /// Lots in their new state (including a materialized lot).
    pub lots: Vec<Lot>,
    /// Set when the increase had to create a lot.
    pub created_lot: Option<LotId>,
    pub events: Vec<StockEvent>,
}

impl AdjustmentOutcome {
    pub fn before(&self) -> u64 {
        self.adjustment.quantity_before
    }

    pub fn after(&self) -> u64 {
        self.adjustment.quantity_after
    }
}

/// Apply an adjustment to the resolved scope.
///
/// Pure: nothing is persisted and the input lots are untouched. Guards run
/// before any lot changes, so an error leaves every quantity as it was.
pub fn apply_adjustment(
    request: &AdjustStock,
    lots: &[Lot],
    policy: &InventoryPolicy,
) -> StockResult<AdjustmentOutcome> {
    request.validate()?;
    policy.check_authorization(request.quantity, request.authorization_code.as_deref())?;

    let scope = resolve_scope(request, lots)?;
    let before = scope.current_quantity();
    let after = match request.adjustment_type {
        AdjustmentType::Increase => before
            .checked_add(request.quantity)
            .ok_or_else(|| StockError::validation("quantity overflow"))?,
        AdjustmentType::Decrease => before.saturating_sub(request.quantity),
    };
    let adjustment_id = AdjustmentId::generate();

    let mut events = Vec::new();
    let mut created_lot = None;
    let mut touched = Vec::new();

    match request.adjustment_type {
        AdjustmentType::Decrease => {
            if before == 0 {
                return Err(StockError::NoStockToAdjust);
            }
            let adjustable = scope.adjustable_quantity();
            if request.quantity > adjustable {
                return Err(StockError::InsufficientStockForAdjustment {
                    requested: request.quantity,
                    current: adjustable,
                });
            }

            let mut remaining = request.quantity;
            for lot in scope.lots() {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(lot.available());
                if take == 0 {
                    continue;
                }
                let mut lot = lot.clone();
                lot.adjust_quantity(lot_command(request, adjustment_id, take))?;
                remaining -= take;
                touched.push(lot);
            }
        }
        AdjustmentType::Increase => match scope.lots().last() {
            Some(last) => {
                let mut lot = last.clone();
                lot.adjust_quantity(lot_command(request, adjustment_id, request.quantity))?;
                touched.push(lot);
            }
            None => {
                let (lot, created) = Lot::receive(ReceiveLot {
                    tenant_id: request.tenant_id,
                    lot_id: LotId::generate(),
                    product_id: request.product_id,
                    location_id: request.location_id,
                    quantity: request.quantity,
                    expiration_date: None,
                    consignment_ref: None,
                    received_on: request.today,
                    occurred_at: request.occurred_at,
                })?;
                created_lot = Some(lot.id_typed());
                events.extend(created);
                touched.push(lot);
            }
        },
    }

    let lot_id = match &scope {
        AdjustmentScope::Lot(lot) => Some(lot.id_typed()),
        _ => created_lot,
    };

    let adjustment = Adjustment {
        id: adjustment_id,
        tenant_id: request.tenant_id,
        product_id: request.product_id,
        location_id: request.location_id,
        lot_id,
        adjustment_type: request.adjustment_type,
        quantity: request.quantity,
        quantity_before: before,
        quantity_after: after,
        reason: request.reason.clone(),
        authorization_code: request.authorization_code.clone(),
        actor: request.actor,
        occurred_at: request.occurred_at,
    };

    events.push(StockEvent::StockAdjusted(StockAdjusted {
        tenant_id: adjustment.tenant_id,
        adjustment_id,
        product_id: adjustment.product_id,
        location_id: adjustment.location_id,
        lot_id: adjustment.lot_id,
        adjustment_type: adjustment.adjustment_type,
        quantity: adjustment.quantity,
        quantity_before: before,
        quantity_after: after,
        reason: adjustment.reason.clone(),
        actor: adjustment.actor,
        occurred_at: adjustment.occurred_at,
    }));

    Ok(AdjustmentOutcome {
        adjustment,
        lots: touched,
        created_lot,
        events,
    })
}

fn lot_command(request: &AdjustStock, adjustment_id: AdjustmentId, quantity: u64) -> AdjustLotQuantity {
    AdjustLotQuantity {
        tenant_id: request.tenant_id,
        adjustment_id,
        adjustment_type: request.adjustment_type,
        quantity,
        occurred_at: request.occurred_at,
    }
}

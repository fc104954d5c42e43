//! Narrow read ports onto collaborators outside the inventory core, with
//! in-memory adapters for tests/dev.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use lotkeeper_core::{LocationId, ProductId, TenantId};
use lotkeeper_inventory::ReorderPoint;

/// Product lookup.
pub trait ProductCatalog: Send + Sync {
    fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> bool;

    /// Resolve a product code to its id.
    fn resolve_code(&self, tenant_id: TenantId, code: &str) -> Option<ProductId>;
}

/// Location availability check.
pub trait LocationAvailability: Send + Sync {
    fn is_available(&self, tenant_id: TenantId, location_id: LocationId) -> bool;
}

/// Configured minimum/maximum levels per product.
pub trait ReorderPoints: Send + Sync {
    /// Every reorder point of a product (product-wide and per location).
    fn for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<ReorderPoint>;
}

/// Source of "now" and the business date.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Pinned to midnight UTC of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<(TenantId, String), ProductId>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product code, returning its (new or existing) id.
    pub fn register(&self, tenant_id: TenantId, code: impl Into<String>) -> ProductId {
        let code = code.into();
        match self.products.write() {
            Ok(mut products) => *products.entry((tenant_id, code)).or_insert_with(ProductId::new),
            Err(_) => ProductId::new(),
        }
    }
}

impl ProductCatalog for InMemoryProductCatalog {
    fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> bool {
        self.products
            .read()
            .map(|p| p.iter().any(|((t, _), id)| *t == tenant_id && *id == product_id))
            .unwrap_or(false)
    }

    fn resolve_code(&self, tenant_id: TenantId, code: &str) -> Option<ProductId> {
        let products = self.products.read().ok()?;
        products.get(&(tenant_id, code.to_string())).copied()
    }
}

/// Every location is available unless marked otherwise.
#[derive(Debug, Default)]
pub struct InMemoryLocationAvailability {
    unavailable: RwLock<HashSet<(TenantId, LocationId)>>,
}

impl InMemoryLocationAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, tenant_id: TenantId, location_id: LocationId, available: bool) {
        if let Ok(mut unavailable) = self.unavailable.write() {
            if available {
                unavailable.remove(&(tenant_id, location_id));
            } else {
                unavailable.insert((tenant_id, location_id));
            }
        }
    }
}

impl LocationAvailability for InMemoryLocationAvailability {
    fn is_available(&self, tenant_id: TenantId, location_id: LocationId) -> bool {
        self.unavailable
            .read()
            .map(|u| !u.contains(&(tenant_id, location_id)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReorderPoints {
    points: RwLock<Vec<ReorderPoint>>,
}

impl InMemoryReorderPoints {
    pub fn new(points: impl IntoIterator<Item = ReorderPoint>) -> Self {
        Self {
            points: RwLock::new(points.into_iter().collect()),
        }
    }

    /// Insert or replace the point for its (tenant, product, location).
    pub fn upsert(&self, point: ReorderPoint) {
        if let Ok(mut points) = self.points.write() {
            points.retain(|p| {
                !(p.tenant_id == point.tenant_id
                    && p.product_id == point.product_id
                    && p.location_id == point.location_id)
            });
            points.push(point);
        }
    }
}

impl ReorderPoints for InMemoryReorderPoints {
    fn for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<ReorderPoint> {
        self.points
            .read()
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.tenant_id == tenant_id && p.product_id == product_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

use lotkeeper_core::TenantId;

use crate::EventEnvelope;

/// A message that belongs to exactly one tenant.
///
/// Consumers that share a bus across tenants use this to keep only their
/// own tenant's traffic.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}

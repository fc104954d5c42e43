use serde::{Deserialize, Serialize};

use lotkeeper_core::AggregateId;

macro_rules! aggregate_id_newtype {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub AggregateId);

        impl $t {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }

            /// Fresh time-ordered identifier.
            pub fn generate() -> Self {
                Self(AggregateId::new())
            }

            pub fn aggregate_id(&self) -> AggregateId {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

aggregate_id_newtype!(
    /// Lot identifier (tenant-scoped via `tenant_id` fields in events/commands).
    LotId
);
aggregate_id_newtype!(
    /// Allocation identifier.
    AllocationId
);
aggregate_id_newtype!(
    /// Adjustment audit record identifier.
    AdjustmentId
);
aggregate_id_newtype!(
    /// Restock request identifier.
    RestockRequestId
);

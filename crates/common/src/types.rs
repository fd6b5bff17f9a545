use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a workspace (tenant).
    ///
    /// Every funnel, cart and usage counter is scoped to a workspace.
    WorkspaceId
}

uuid_id! {
    /// Unique identifier for a cart funnel (a seller's configured sales page).
    FunnelId
}

uuid_id! {
    /// Unique identifier for a cart (one checkout attempt).
    ///
    /// The cart id doubles as the payment-provider idempotency key for the
    /// cart's main charge, so it must never be reused across checkouts.
    CartId
}

uuid_id! {
    /// Unique identifier for a fan (buyer identity, shared across workspaces).
    FanId
}

uuid_id! {
    /// Unique identifier for a visitor session.
    SessionId
}

uuid_id! {
    /// Unique identifier for a shipment record attached to a cart.
    FulfillmentId
}

pub mod types;
pub mod visitor;

pub use types::{CartId, FanId, FulfillmentId, FunnelId, SessionId, WorkspaceId};
pub use visitor::{Attribution, VisitorContext};

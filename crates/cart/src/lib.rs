//! Cart funnel domain model.
//!
//! This crate provides the domain layer of the checkout funnel:
//! - `CartStage` state machine with forward-only transitions
//! - `Cart` aggregate with its amount breakdown invariants
//! - funnel, workspace, fan and fulfillment records
//! - the `FunnelStore` persistence trait with conditional-update semantics

pub mod cart;
pub mod error;
pub mod fan;
pub mod fulfillment;
pub mod funnel;
pub mod money;
pub mod stage;
pub mod store;
pub mod workspace;

pub use cart::{Address, Cart, CartLine, CheckoutDraft, CheckoutPatch, vat_rate};
pub use error::CartError;
pub use fan::{Fan, display_name_from_email};
pub use fulfillment::{CartFulfillment, is_fully_fulfilled};
pub use funnel::{CartFunnel, PayWhatYouWant, Product};
pub use money::Money;
pub use stage::CartStage;
pub use store::{FunnelStore, StoreError, StoreResult};
pub use workspace::{ChargeEnvironment, PaymentAccounts, Plan, Workspace};

//! Email sender trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CartId;

use cart::{Cart, Money};

use crate::error::CheckoutError;

/// One line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: u32,
    pub amount: Money,
}

/// Rendered-template inputs. Rendering itself happens in the email service.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailTemplate {
    Receipt {
        cart_id: CartId,
        order_id: Option<i64>,
        lines: Vec<ReceiptLine>,
        total: Money,
    },
    ShippingUpdate {
        cart_id: CartId,
        carrier: Option<String>,
        tracking_number: Option<String>,
    },
}

impl EmailTemplate {
    /// Builds the buyer receipt for a cart's current lines.
    pub fn receipt_for(cart: &Cart) -> EmailTemplate {
        let mut lines = vec![ReceiptLine {
            name: cart.main.product_name.clone(),
            quantity: cart.main.quantity,
            amount: cart.main.total(),
        }];
        if let Some(bump) = &cart.bump {
            lines.push(ReceiptLine {
                name: bump.product_name.clone(),
                quantity: bump.quantity,
                amount: bump.total(),
            });
        }
        if let Some(upsell) = &cart.upsell {
            lines.push(ReceiptLine {
                name: upsell.product_name.clone(),
                quantity: upsell.quantity,
                amount: upsell.total(),
            });
        }
        EmailTemplate::Receipt {
            cart_id: cart.id,
            order_id: cart.order_id,
            lines,
            total: cart.order_amount,
        }
    }
}

/// Outbound email, treated as a black box.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        bcc: &[String],
        template: EmailTemplate,
    ) -> Result<(), CheckoutError>;
}

/// A captured send, for assertions.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub template: EmailTemplate,
}

#[derive(Default)]
struct InMemoryEmailState {
    sent: Vec<SentEmail>,
    fail_on_send: bool,
}

/// In-memory email sender for testing.
#[derive(Clone, Default)]
pub struct InMemoryEmailSender {
    state: Arc<RwLock<InMemoryEmailState>>,
}

impl InMemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.state.read().unwrap().sent.clone()
    }

    /// Number of receipts sent for a specific cart.
    pub fn receipts_for(&self, cart_id: CartId) -> usize {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|s| matches!(&s.template, EmailTemplate::Receipt { cart_id: id, .. } if *id == cart_id))
            .count()
    }
}

#[async_trait]
impl EmailSender for InMemoryEmailSender {
    async fn send(
        &self,
        to: &str,
        _bcc: &[String],
        template: EmailTemplate,
    ) -> Result<(), CheckoutError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(CheckoutError::Email("smtp unavailable".to_string()));
        }

        state.sent.push(SentEmail {
            to: to.to_string(),
            template,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cart::{CartFunnel, CheckoutDraft, Product};
    use common::{FunnelId, VisitorContext, WorkspaceId};

    fn cart_with_bump() -> Cart {
        let funnel = CartFunnel {
            id: FunnelId::new(),
            workspace_id: WorkspaceId::new(),
            handle: "acme".to_string(),
            key: "launch".to_string(),
            main_product: Product::new("SKU-MAIN", "Album", Money::from_cents(2000)),
            main_pay_what_you_want: None,
            bump_product: Some(Product::new("SKU-BUMP", "Sticker", Money::from_cents(500))),
            bump_price_override: None,
            upsell_product: None,
            upsell_price_override: None,
            handling_fee: Money::zero(),
            fee_percent_override: None,
        };
        let mut cart = Cart::create(
            &funnel,
            VisitorContext::default(),
            CheckoutDraft {
                bump_selected: true,
                ..Default::default()
            },
        )
        .unwrap();
        cart.convert_checkout(false).unwrap();
        cart
    }

    #[test]
    fn receipt_contains_all_purchased_lines() {
        let cart = cart_with_bump();
        let EmailTemplate::Receipt { lines, total, .. } = EmailTemplate::receipt_for(&cart) else {
            panic!("expected receipt");
        };

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "Album");
        assert_eq!(lines[1].name, "Sticker");
        assert_eq!(total, cart.order_amount);
    }

    #[tokio::test]
    async fn sends_are_captured_per_cart() {
        let sender = InMemoryEmailSender::new();
        let cart = cart_with_bump();

        sender
            .send("jane@example.com", &[], EmailTemplate::receipt_for(&cart))
            .await
            .unwrap();

        assert_eq!(sender.sent_count(), 1);
        assert_eq!(sender.receipts_for(cart.id), 1);
        assert_eq!(sender.receipts_for(CartId::new()), 0);
    }

    #[tokio::test]
    async fn failure_toggle() {
        let sender = InMemoryEmailSender::new();
        sender.set_fail_on_send(true);
        let cart = cart_with_bump();

        let result = sender
            .send("jane@example.com", &[], EmailTemplate::receipt_for(&cart))
            .await;
        assert!(matches!(result, Err(CheckoutError::Email(_))));
        assert_eq!(sender.sent_count(), 0);
    }
}

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use shared::{Message, MessageHandler, OrderGateway, OrderIsPaidEvent, OrderPaymentFailedEvent, UserDirectory};
use tracing::{debug, info, warn};

use crate::store::NotificationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    PaymentFailed,
}

impl PaymentOutcome {
    pub fn message(self, order_id: i64) -> String {
        match self {
            PaymentOutcome::Paid => format!("success payment for order {order_id}"),
            PaymentOutcome::PaymentFailed => format!("not enough money for order {order_id}"),
        }
    }

    fn order_id(self, message: &Message) -> shared::Result<i64> {
        Ok(match self {
            PaymentOutcome::Paid => message.json::<OrderIsPaidEvent>()?.order_id,
            PaymentOutcome::PaymentFailed => message.json::<OrderPaymentFailedEvent>()?.order_id,
        })
    }
}

/// Tells the order owner how the payment went. One instance per outcome
/// topic.
pub struct PaymentOutcomeHandler {
    outcome: PaymentOutcome,
    orders: Arc<dyn OrderGateway>,
    users: Arc<dyn UserDirectory>,
    store: Arc<dyn NotificationStore>,
}

impl PaymentOutcomeHandler {
    pub fn new(
        outcome: PaymentOutcome,
        orders: Arc<dyn OrderGateway>,
        users: Arc<dyn UserDirectory>,
        store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            outcome,
            orders,
            users,
            store,
        }
    }
}

#[async_trait]
impl MessageHandler for PaymentOutcomeHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let order_id = match self.outcome.order_id(message) {
            Ok(order_id) => order_id,
            Err(e) => {
                warn!(outcome = ?self.outcome, offset = message.offset, error = %e, "dropping malformed event");
                return Ok(());
            }
        };

        let order = self
            .orders
            .order(order_id)
            .await
            .with_context(|| format!("failed to get order {order_id}"))?;
        let owner = self
            .users
            .user(order.owner_id)
            .await
            .with_context(|| format!("failed to get user {}", order.owner_id))?;

        let text = self.outcome.message(order_id);
        let stored = self
            .store
            .record(order_id, &owner.email, &text)
            .await
            .context("failed to store notification")?;

        if stored {
            info!(order_id, recipient = %owner.email, message = %text, "notification sent");
        } else {
            debug!(order_id, message = %text, "notification already sent");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shared::testing::{CallLog, InMemoryOrderStore, StaticUserDirectory};
    use shared::{Order, OrderStatus};

    use super::*;
    use crate::store::memory::InMemoryNotificationStore;

    fn message(payload: &str) -> Message {
        Message {
            topic: "t".into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn handler(outcome: PaymentOutcome) -> (PaymentOutcomeHandler, Arc<InMemoryNotificationStore>) {
        let orders = Arc::new(InMemoryOrderStore::new(CallLog::new()));
        orders.insert(Order {
            id: 42,
            owner_id: 3,
            item: "widget".into(),
            price: 300,
            status: OrderStatus::Paid,
            reservation_id: Some(1),
            delivery_id: Some(1),
        });
        let users = Arc::new(StaticUserDirectory::default().with_user(3, "alice", "alice@example.com"));
        let store = Arc::new(InMemoryNotificationStore::default());
        (
            PaymentOutcomeHandler::new(outcome, orders, users, store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn paid_order_notifies_the_owner_once() {
        let (handler, store) = handler(PaymentOutcome::Paid);

        handler.handle(&message(r#"{"order_id":42}"#)).await.unwrap();
        handler.handle(&message(r#"{"order_id":42}"#)).await.unwrap();

        assert_eq!(store.messages().await, vec!["success payment for order 42"]);
        let inbox = store.for_recipient("alice@example.com").await.unwrap();
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn failed_payment_has_its_own_message() {
        let (handler, store) = handler(PaymentOutcome::PaymentFailed);

        handler.handle(&message(r#"{"order_id":42}"#)).await.unwrap();

        assert_eq!(store.messages().await, vec!["not enough money for order 42"]);
    }

    #[tokio::test]
    async fn unknown_order_fails_the_message() {
        let (handler, store) = handler(PaymentOutcome::Paid);

        assert!(handler.handle(&message(r#"{"order_id":7}"#)).await.is_err());
        assert!(store.messages().await.is_empty());
    }
}

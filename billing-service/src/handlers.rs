use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use shared::{
    CheckoutError, EventBus, Message, MessageHandler, NewUserEvent, OrderEvent,
    OrderEventType, OrderGateway, OrderStatus,
};
use tracing::{debug, info, warn};

use crate::accounts::{AccountRepo, OrderCharge};

/// Opens an empty account for every registered user.
pub struct NewUserHandler {
    accounts: Arc<dyn AccountRepo>,
}

impl NewUserHandler {
    pub fn new(accounts: Arc<dyn AccountRepo>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl MessageHandler for NewUserHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let event: NewUserEvent = match message.json() {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "dropping malformed new-user event");
                return Ok(());
            }
        };

        let opened = self
            .accounts
            .open(event.id)
            .await
            .with_context(|| format!("failed to open account for user {}", event.id))?;

        if opened {
            info!(user_id = event.id, "account opened");
        } else {
            debug!(user_id = event.id, "account already exists");
        }
        Ok(())
    }
}

/// Debits newly created orders when checkout runs in asynchronous mode and
/// reports the outcome on the paid / payment-failed topics.
pub struct NewOrderHandler {
    accounts: Arc<dyn AccountRepo>,
    orders: Arc<dyn OrderGateway>,
    events: EventBus,
}

impl NewOrderHandler {
    pub fn new(accounts: Arc<dyn AccountRepo>, orders: Arc<dyn OrderGateway>, events: EventBus) -> Self {
        Self {
            accounts,
            orders,
            events,
        }
    }

    async fn publish_paid(&self, order_id: i64) -> anyhow::Result<()> {
        self.events
            .order_paid(order_id)
            .await
            .context("failed to publish order-is-paid")
    }
}

#[async_trait]
impl MessageHandler for NewOrderHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let event: OrderEvent = match message.json() {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "dropping malformed order event");
                return Ok(());
            }
        };
        if event.event_type != OrderEventType::Created {
            debug!(order_id = event.id, event_type = ?event.event_type, "ignoring order event");
            return Ok(());
        }

        let order = self
            .orders
            .order(event.id)
            .await
            .with_context(|| format!("failed to fetch order {}", event.id))?;
        if order.status != OrderStatus::Created {
            debug!(order_id = order.id, status = %order.status, "order already settled");
            return Ok(());
        }

        match self
            .accounts
            .charge_order(order.owner_id, order.id, order.price)
            .await
        {
            Ok(OrderCharge::Charged(account)) => {
                info!(order_id = order.id, user_id = order.owner_id, balance = account.balance, "order paid");
                self.publish_paid(order.id).await?;
            }
            Ok(OrderCharge::AlreadyCharged) => {
                info!(order_id = order.id, "order already charged, reporting it paid again");
                self.publish_paid(order.id).await?;
            }
            Err(CheckoutError::InsufficientFunds { balance, requested }) => {
                warn!(order_id = order.id, user_id = order.owner_id, balance, requested, "not enough money for order");
                self.events
                    .order_payment_failed(order.id)
                    .await
                    .context("failed to publish order-payment-failed")?;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to charge order {}", order.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shared::testing::{CallLog, InMemoryBroker, InMemoryOrderStore};
    use shared::{Order, OrderIsPaidEvent, OrderPaymentFailedEvent};

    use super::*;
    use crate::accounts::memory::InMemoryAccountRepo;

    fn message(payload: &str) -> Message {
        Message {
            topic: "t".into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn replayed_new_user_creates_one_account() {
        let accounts = Arc::new(InMemoryAccountRepo::default());
        let handler = NewUserHandler::new(accounts.clone());

        handler.handle(&message(r#"{"id":3}"#)).await.unwrap();
        handler.handle(&message(r#"{"id":3}"#)).await.unwrap();

        assert_eq!(accounts.len().await, 1);
        assert_eq!(accounts.balance(3).await, Some(0));
    }

    struct Fixture {
        accounts: Arc<InMemoryAccountRepo>,
        broker: InMemoryBroker,
        handler: NewOrderHandler,
    }

    async fn fixture(balance: i64, order_status: OrderStatus) -> Fixture {
        let accounts = Arc::new(InMemoryAccountRepo::default().with_balance(1, balance).await);
        let orders = Arc::new(InMemoryOrderStore::new(CallLog::new()));
        orders.insert(Order {
            id: 8,
            owner_id: 1,
            item: "widget".into(),
            price: 300,
            status: order_status,
            reservation_id: None,
            delivery_id: None,
        });
        let broker = InMemoryBroker::new();
        let handler = NewOrderHandler::new(accounts.clone(), orders, broker.event_bus());
        Fixture {
            accounts,
            broker,
            handler,
        }
    }

    #[tokio::test]
    async fn created_order_is_charged_and_reported_paid() {
        let fx = fixture(1000, OrderStatus::Created).await;

        fx.handler.handle(&message(r#"{"type":1,"id":8}"#)).await.unwrap();

        assert_eq!(fx.accounts.balance(1).await, Some(700));
        let paid: Vec<OrderIsPaidEvent> = fx.broker.events("order-is-paid");
        assert_eq!(paid, vec![OrderIsPaidEvent { order_id: 8 }]);
    }

    #[tokio::test]
    async fn redelivered_order_is_charged_once() {
        let fx = fixture(1000, OrderStatus::Created).await;
        let created = message(r#"{"type":1,"id":8}"#);
        fx.broker.faults().fail_times("publish", 1);

        assert!(fx.handler.handle(&created).await.is_err());
        assert_eq!(fx.accounts.balance(1).await, Some(700));

        fx.handler.handle(&created).await.unwrap();

        assert_eq!(fx.accounts.balance(1).await, Some(700));
        let paid: Vec<OrderIsPaidEvent> = fx.broker.events("order-is-paid");
        assert_eq!(paid, vec![OrderIsPaidEvent { order_id: 8 }]);
    }

    #[tokio::test]
    async fn poor_user_gets_payment_failed() {
        let fx = fixture(100, OrderStatus::Created).await;

        fx.handler.handle(&message(r#"{"type":1,"id":8}"#)).await.unwrap();

        assert_eq!(fx.accounts.balance(1).await, Some(100));
        let failed: Vec<OrderPaymentFailedEvent> = fx.broker.events("order-payment-failed");
        assert_eq!(failed, vec![OrderPaymentFailedEvent { order_id: 8 }]);
        assert!(fx.broker.messages("order-is-paid").is_empty());
    }

    #[tokio::test]
    async fn other_event_types_and_settled_orders_are_ignored() {
        let fx = fixture(1000, OrderStatus::Paid).await;

        fx.handler.handle(&message(r#"{"type":2,"id":8}"#)).await.unwrap();
        fx.handler.handle(&message(r#"{"type":1,"id":8}"#)).await.unwrap();

        assert_eq!(fx.accounts.balance(1).await, Some(1000));
        assert!(fx.broker.messages("order-is-paid").is_empty());
    }

    #[tokio::test]
    async fn unknown_order_fails_the_message() {
        let fx = fixture(1000, OrderStatus::Created).await;

        assert!(fx.handler.handle(&message(r#"{"type":1,"id":99}"#)).await.is_err());
    }

    #[tokio::test]
    async fn missing_account_fails_the_message() {
        let accounts = Arc::new(InMemoryAccountRepo::default());
        let orders = Arc::new(InMemoryOrderStore::new(CallLog::new()));
        orders.insert(Order {
            id: 8,
            owner_id: 5,
            item: "widget".into(),
            price: 300,
            status: OrderStatus::Created,
            reservation_id: None,
            delivery_id: None,
        });
        let handler = NewOrderHandler::new(accounts, orders, InMemoryBroker::new().event_bus());

        assert!(handler.handle(&message(r#"{"type":1,"id":8}"#)).await.is_err());
    }
}

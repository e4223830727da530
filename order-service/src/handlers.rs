use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use shared::{Message, MessageHandler, OrderIsPaidEvent, OrderStatus, OrderStore};
use tracing::{info, warn};

/// Moves orders to `paid` when billing (or the saga) reports the payment.
pub struct OrderIsPaidHandler {
    orders: Arc<dyn OrderStore>,
}

impl OrderIsPaidHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl MessageHandler for OrderIsPaidHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let event: OrderIsPaidEvent = match message.json() {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "dropping malformed order-is-paid event");
                return Ok(());
            }
        };

        self.orders
            .set_status(event.order_id, OrderStatus::Paid)
            .await
            .with_context(|| format!("failed to mark order {} as paid", event.order_id))?;

        info!(order_id = event.order_id, "order marked as paid");
        Ok(())
    }
}

//! The two checkout models. A deployment runs exactly one of them, chosen
//! by [`CheckoutMode`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::events::EventBus;
use crate::models::{AuthenticatedUser, CreateOrderArgs, Order, OrderStatus};
use crate::ports::OrderStore;
use crate::saga::{Saga, DEFAULT_COMPENSATION_ATTEMPTS, STEP_CREATE_ORDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CheckoutMode {
    /// Synchronous saga: debit, reserve and assign a courier inside the request.
    #[default]
    Saga,
    /// Create the order and let the billing consumer debit it asynchronously.
    Async,
}

#[async_trait]
pub trait Checkout: Send + Sync {
    async fn create_order(&self, user: &AuthenticatedUser, args: CreateOrderArgs) -> Result<Order>;
}

/// Persists the order as `created` and announces it on the new-order topic.
/// Billing picks it up from there and answers with paid or payment-failed.
pub struct EventDrivenCheckout {
    orders: Arc<dyn OrderStore>,
    events: EventBus,
}

impl EventDrivenCheckout {
    pub fn new(orders: Arc<dyn OrderStore>, events: EventBus) -> Self {
        Self { orders, events }
    }
}

#[async_trait]
impl Checkout for EventDrivenCheckout {
    async fn create_order(&self, user: &AuthenticatedUser, args: CreateOrderArgs) -> Result<Order> {
        args.validate()?;

        let order = self
            .orders
            .create(user.id, args.price, &args.item, OrderStatus::Created)
            .await?;

        let mut saga = Saga::new(DEFAULT_COMPENSATION_ATTEMPTS);
        let orders = Arc::clone(&self.orders);
        let order_id = order.id;
        saga.register(STEP_CREATE_ORDER, move || {
            let orders = Arc::clone(&orders);
            async move { orders.delete(order_id).await }
        });

        if let Err(e) = self.events.order_created(order.id).await {
            warn!(order_id, error = %e, "failed to announce order, removing it");
            saga.compensate().await;
            return Err(e);
        }

        info!(order_id, "order created, awaiting payment");
        Ok(order)
    }
}

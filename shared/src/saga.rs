//! Order creation as a saga of compensable steps.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::checkout::Checkout;
use crate::error::Result;
use crate::events::EventBus;
use crate::models::{AuthenticatedUser, CreateOrderArgs, Order, OrderStatus};
use crate::ports::{BillingGateway, DeliveryGateway, InventoryGateway, OrderStore};

pub const STEP_CREATE_ORDER: &str = "create_order";
pub const STEP_WITHDRAW_MONEY: &str = "withdraw_money";
pub const STEP_RESERVE_ITEM: &str = "reserve_item";
pub const STEP_ASSIGN_COURIER: &str = "assign_courier";
pub const STEP_RECORD_FULFILLMENT: &str = "record_fulfillment";

pub const DEFAULT_COMPENSATION_ATTEMPTS: u32 = 3;

type Compensation = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Stack of compensations registered by the steps that already succeeded.
pub struct Saga {
    compensations: Vec<(&'static str, Compensation)>,
    max_attempts: u32,
}

impl Saga {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            compensations: Vec::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Registers the action that undoes `step`. It may be invoked several
    /// times while compensating, so it must be re-runnable.
    pub fn register<F, Fut>(&mut self, step: &'static str, compensation: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.compensations
            .push((step, Box::new(move || compensation().boxed())));
    }

    pub fn registered_steps(&self) -> Vec<&'static str> {
        self.compensations.iter().map(|(step, _)| *step).collect()
    }

    /// Runs every registered compensation, newest first. A compensation that
    /// keeps failing is abandoned and the pass carries on with the rest.
    /// Returns the steps whose compensation was abandoned.
    pub async fn compensate(&mut self) -> Vec<&'static str> {
        let mut abandoned = Vec::new();

        while let Some((step, compensation)) = self.compensations.pop() {
            if !self.run_with_retries(step, &compensation).await {
                abandoned.push(step);
            }
        }

        abandoned
    }

    async fn run_with_retries(&self, step: &'static str, compensation: &Compensation) -> bool {
        for attempt in 1..=self.max_attempts {
            match compensation().await {
                Ok(()) => {
                    info!(step, attempt, "compensation succeeded");
                    return true;
                }
                Err(e) => {
                    warn!(step, attempt, error = %e, "compensation attempt failed");
                }
            }
        }

        error!(
            step,
            attempts = self.max_attempts,
            alert = "compensation_abandoned",
            "compensation permanently failed, manual intervention required"
        );
        false
    }
}

pub struct OrderSaga {
    orders: Arc<dyn OrderStore>,
    billing: Arc<dyn BillingGateway>,
    inventory: Arc<dyn InventoryGateway>,
    delivery: Arc<dyn DeliveryGateway>,
    events: EventBus,
    compensation_attempts: u32,
}

impl OrderSaga {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        billing: Arc<dyn BillingGateway>,
        inventory: Arc<dyn InventoryGateway>,
        delivery: Arc<dyn DeliveryGateway>,
        events: EventBus,
    ) -> Self {
        Self {
            orders,
            billing,
            inventory,
            delivery,
            events,
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
        }
    }

    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation_attempts = attempts;
        self
    }

    #[tracing::instrument(skip(self, args), fields(user_id = user.id, item = %args.item, price = args.price))]
    pub async fn create_order(&self, user: &AuthenticatedUser, args: CreateOrderArgs) -> Result<Order> {
        args.validate()?;

        let mut saga = Saga::new(self.compensation_attempts);

        match self.execute(&mut saga, user, &args).await {
            Ok(order) => {
                info!(order_id = order.id, "order saga completed");
                if let Err(e) = self.events.order_paid(order.id).await {
                    warn!(order_id = order.id, error = %e, "failed to publish order paid event");
                }
                Ok(order)
            }
            Err(e) => {
                warn!(error = %e, steps = ?saga.registered_steps(), "order saga failed, compensating");
                let abandoned = saga.compensate().await;
                if abandoned.is_empty() {
                    info!("order saga rolled back");
                } else {
                    error!(
                        abandoned = ?abandoned,
                        alert = "compensation_abandoned",
                        "order saga left partially applied"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        saga: &mut Saga,
        user: &AuthenticatedUser,
        args: &CreateOrderArgs,
    ) -> Result<Order> {
        let order = self
            .orders
            .create(user.id, args.price, &args.item, OrderStatus::Created)
            .await
            .inspect_err(|e| warn!(step = STEP_CREATE_ORDER, error = %e, "saga step failed"))?;
        let order_id = order.id;
        let orders = Arc::clone(&self.orders);
        saga.register(STEP_CREATE_ORDER, move || {
            let orders = Arc::clone(&orders);
            async move { orders.delete(order_id).await }
        });

        let (user_id, price) = (user.id, args.price);
        self.billing
            .withdraw(user_id, price)
            .await
            .inspect_err(|e| warn!(step = STEP_WITHDRAW_MONEY, error = %e, "saga step failed"))?;
        let billing = Arc::clone(&self.billing);
        saga.register(STEP_WITHDRAW_MONEY, move || {
            let billing = Arc::clone(&billing);
            async move { billing.credit(user_id, price).await }
        });

        let reservation_id = self
            .inventory
            .reserve(order_id, &args.item, 1)
            .await
            .inspect_err(|e| warn!(step = STEP_RESERVE_ITEM, error = %e, "saga step failed"))?;
        let inventory = Arc::clone(&self.inventory);
        saga.register(STEP_RESERVE_ITEM, move || {
            let inventory = Arc::clone(&inventory);
            async move { inventory.cancel(reservation_id).await }
        });

        let assignment = self
            .delivery
            .assign_courier(order_id)
            .await
            .inspect_err(|e| warn!(step = STEP_ASSIGN_COURIER, error = %e, "saga step failed"))?;
        let delivery_id = assignment.delivery_id;
        let delivery = Arc::clone(&self.delivery);
        saga.register(STEP_ASSIGN_COURIER, move || {
            let delivery = Arc::clone(&delivery);
            async move { delivery.release(delivery_id).await }
        });

        self.orders
            .record_fulfillment(order_id, reservation_id, delivery_id, OrderStatus::Paid)
            .await
            .inspect_err(|e| warn!(step = STEP_RECORD_FULFILLMENT, error = %e, "saga step failed"))
    }
}

#[async_trait]
impl Checkout for OrderSaga {
    async fn create_order(&self, user: &AuthenticatedUser, args: CreateOrderArgs) -> Result<Order> {
        OrderSaga::create_order(self, user, args).await
    }
}

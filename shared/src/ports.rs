//! Capability interfaces consumed by the checkout core. Each has one
//! production implementation and an in-memory double in [`crate::testing`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CourierAssignment, Order, OrderStatus, UserAccount, UserInfo};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, owner_id: i64, price: i64, item: &str, status: OrderStatus)
        -> Result<Order>;

    /// Removing an order that no longer exists succeeds.
    async fn delete(&self, id: i64) -> Result<()>;

    async fn get(&self, id: i64) -> Result<Order>;

    async fn set_status(&self, id: i64, status: OrderStatus) -> Result<()>;

    async fn record_fulfillment(
        &self,
        id: i64,
        reservation_id: i64,
        delivery_id: i64,
        status: OrderStatus,
    ) -> Result<Order>;
}

#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn withdraw(&self, user_id: i64, amount: i64) -> Result<()>;

    async fn credit(&self, user_id: i64, amount: i64) -> Result<()>;

    async fn account(&self, user_id: i64) -> Result<UserAccount>;
}

#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Returns the reservation id.
    async fn reserve(&self, order_id: i64, item_id: &str, amount: i64) -> Result<i64>;

    async fn cancel(&self, reservation_id: i64) -> Result<()>;
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn assign_courier(&self, order_id: i64) -> Result<CourierAssignment>;

    /// Drops a delivery that is still on the way so its courier is idle
    /// again. Releasing an unknown delivery succeeds.
    async fn release(&self, delivery_id: i64) -> Result<()>;
}

/// Read-only order lookup used by services that do not own orders.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn order(&self, id: i64) -> Result<Order>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user(&self, id: i64) -> Result<UserInfo>;
}

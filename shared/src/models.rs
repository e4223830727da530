use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Complete,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Complete => "complete",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Complete => 2,
        }
    }

    /// Statuses only move forward. Re-applying the current status is allowed
    /// so that redelivered events stay harmless.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "paid" => Ok(OrderStatus::Paid),
            "complete" => Ok(OrderStatus::Complete),
            other => Err(CheckoutError::Storage(format!("unknown order status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub owner_id: i64,
    pub item: String,
    pub price: i64,
    pub status: OrderStatus,
    pub reservation_id: Option<i64>,
    pub delivery_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderArgs {
    pub item: String,
    pub price: i64,
}

impl CreateOrderArgs {
    pub fn validate(&self) -> Result<()> {
        if self.item.trim().is_empty() {
            return Err(CheckoutError::Validation("item must not be empty".to_string()));
        }
        if self.price <= 0 {
            return Err(CheckoutError::Validation(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// The caller of a request, resolved once at the HTTP boundary and passed
/// down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub user_id: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Credit(i64),
    Withdraw(i64),
}

impl BalanceChange {
    /// Computes the balance after this change, refusing to overdraw.
    pub fn apply(self, balance: i64) -> Result<i64> {
        match self {
            BalanceChange::Credit(amount) | BalanceChange::Withdraw(amount) if amount <= 0 => {
                Err(CheckoutError::Validation(format!(
                    "amount must be positive, got {amount}"
                )))
            }
            BalanceChange::Credit(amount) => balance
                .checked_add(amount)
                .ok_or_else(|| CheckoutError::Validation("balance overflow".to_string())),
            BalanceChange::Withdraw(amount) if balance < amount => {
                Err(CheckoutError::InsufficientFunds {
                    balance,
                    requested: amount,
                })
            }
            BalanceChange::Withdraw(amount) => Ok(balance - amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub order_id: i64,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courier {
    pub id: i64,
    pub name: String,
    pub is_on_shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    OnTheWay,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::OnTheWay => "on_the_way",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on_the_way" => Ok(DeliveryStatus::OnTheWay),
            "delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(CheckoutError::Storage(format!("unknown delivery status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: i64,
    pub order_id: i64,
    pub courier_id: i64,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAssignment {
    pub courier_id: i64,
    pub delivery_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    #[serde(rename = "username")]
    pub login: String,
    pub email: String,
}

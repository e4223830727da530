//! In-memory doubles for every capability, used by the test suites of all
//! crates. None of them needs a database, a broker or a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::consumer::{Message, MessageSource};
use crate::error::{CheckoutError, Result};
use crate::events::{EventBus, EventPublisher, Topics};
use crate::models::{
    BalanceChange, CourierAssignment, Item, Order, OrderStatus, UserAccount, UserInfo,
};
use crate::ports::{
    BillingGateway, DeliveryGateway, InventoryGateway, OrderGateway, OrderStore, UserDirectory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered record of the calls made against the doubles sharing it.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: &'static str) {
        lock(&self.0).push(call);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        lock(&self.0).clone()
    }

    pub fn count(&self, call: &str) -> usize {
        lock(&self.0).iter().filter(|c| **c == call).count()
    }

    /// Entries recorded after the first occurrence of `call`.
    pub fn after(&self, call: &str) -> Vec<&'static str> {
        lock(&self.0)
            .iter()
            .skip_while(|c| **c != call)
            .skip(1)
            .copied()
            .collect()
    }
}

/// Injected failures per operation name.
#[derive(Debug, Default)]
pub struct Faults {
    remaining: Mutex<HashMap<&'static str, u32>>,
}

impl Faults {
    /// The next `times` calls of `operation` fail.
    pub fn fail_times(&self, operation: &'static str, times: u32) {
        lock(&self.remaining).insert(operation, times);
    }

    pub fn fail_always(&self, operation: &'static str) {
        self.fail_times(operation, u32::MAX);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        let mut remaining = lock(&self.remaining);
        match remaining.get_mut(operation) {
            Some(0) | None => Ok(()),
            Some(left) => {
                if *left != u32::MAX {
                    *left -= 1;
                }
                Err(CheckoutError::Transport(format!("injected failure in {operation}")))
            }
        }
    }
}

pub struct InMemoryOrderStore {
    orders: Mutex<BTreeMap<i64, Order>>,
    next_id: AtomicI64,
    faults: Faults,
    log: CallLog,
}

impl InMemoryOrderStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            orders: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            faults: Faults::default(),
            log,
        }
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn find(&self, id: i64) -> Option<Order> {
        lock(&self.orders).get(&id).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        lock(&self.orders).values().cloned().collect()
    }

    /// Inserts an order as-is, bypassing the call log.
    pub fn insert(&self, order: Order) {
        self.next_id.fetch_max(order.id + 1, Ordering::SeqCst);
        lock(&self.orders).insert(order.id, order);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, owner_id: i64, price: i64, item: &str, status: OrderStatus) -> Result<Order> {
        self.log.record("order.create");
        self.faults.check("create")?;

        let order = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            owner_id,
            item: item.to_string(),
            price,
            status,
            reservation_id: None,
            delivery_id: None,
        };
        lock(&self.orders).insert(order.id, order.clone());
        Ok(order)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.log.record("order.delete");
        self.faults.check("delete")?;
        lock(&self.orders).remove(&id);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Order> {
        self.faults.check("get")?;
        self.find(id)
            .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))
    }

    async fn set_status(&self, id: i64, status: OrderStatus) -> Result<()> {
        self.log.record("order.set_status");
        self.faults.check("set_status")?;

        let mut orders = lock(&self.orders);
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))?;
        if order.status.can_advance_to(status) {
            order.status = status;
        }
        Ok(())
    }

    async fn record_fulfillment(
        &self,
        id: i64,
        reservation_id: i64,
        delivery_id: i64,
        status: OrderStatus,
    ) -> Result<Order> {
        self.log.record("order.record_fulfillment");
        self.faults.check("record_fulfillment")?;

        let mut orders = lock(&self.orders);
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))?;
        order.reservation_id = Some(reservation_id);
        order.delivery_id = Some(delivery_id);
        if order.status.can_advance_to(status) {
            order.status = status;
        }
        Ok(order.clone())
    }
}

#[async_trait]
impl OrderGateway for InMemoryOrderStore {
    async fn order(&self, id: i64) -> Result<Order> {
        self.faults.check("order")?;
        self.find(id)
            .ok_or_else(|| CheckoutError::NotFound(format!("order {id}")))
    }
}

pub struct InMemoryBilling {
    balances: Mutex<HashMap<i64, i64>>,
    faults: Faults,
    log: CallLog,
}

impl InMemoryBilling {
    pub fn new(log: CallLog) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            faults: Faults::default(),
            log,
        }
    }

    pub fn with_account(self, user_id: i64, balance: i64) -> Self {
        lock(&self.balances).insert(user_id, balance);
        self
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn balance(&self, user_id: i64) -> Option<i64> {
        lock(&self.balances).get(&user_id).copied()
    }

    fn change(&self, user_id: i64, change: BalanceChange) -> Result<()> {
        let mut balances = lock(&self.balances);
        let balance = balances
            .get_mut(&user_id)
            .ok_or_else(|| CheckoutError::NotFound(format!("account of user {user_id}")))?;
        *balance = change.apply(*balance)?;
        Ok(())
    }
}

#[async_trait]
impl BillingGateway for InMemoryBilling {
    async fn withdraw(&self, user_id: i64, amount: i64) -> Result<()> {
        self.log.record("billing.withdraw");
        self.faults.check("withdraw")?;
        self.change(user_id, BalanceChange::Withdraw(amount))
    }

    async fn credit(&self, user_id: i64, amount: i64) -> Result<()> {
        self.log.record("billing.credit");
        self.faults.check("credit")?;
        self.change(user_id, BalanceChange::Credit(amount))
    }

    async fn account(&self, user_id: i64) -> Result<UserAccount> {
        self.faults.check("account")?;
        let balance = self
            .balance(user_id)
            .ok_or_else(|| CheckoutError::NotFound(format!("account of user {user_id}")))?;
        Ok(UserAccount {
            id: user_id,
            user_id,
            balance,
        })
    }
}

pub struct InMemoryInventory {
    stock: Mutex<HashMap<String, i64>>,
    reservations: Mutex<HashMap<i64, (i64, Item)>>,
    next_id: AtomicI64,
    faults: Faults,
    log: CallLog,
}

impl InMemoryInventory {
    pub fn new(log: CallLog) -> Self {
        Self {
            stock: Mutex::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            faults: Faults::default(),
            log,
        }
    }

    pub fn with_stock(self, item_id: &str, amount: i64) -> Self {
        lock(&self.stock).insert(item_id.to_string(), amount);
        self
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn stock(&self, item_id: &str) -> i64 {
        lock(&self.stock).get(item_id).copied().unwrap_or(0)
    }

    pub fn reservation_count(&self) -> usize {
        lock(&self.reservations).len()
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventory {
    async fn reserve(&self, order_id: i64, item_id: &str, amount: i64) -> Result<i64> {
        self.log.record("inventory.reserve");
        self.faults.check("reserve")?;

        let mut stock = lock(&self.stock);
        let available = stock.get(item_id).copied().unwrap_or(0);
        if available < amount {
            return Err(CheckoutError::InsufficientStock {
                item: item_id.to_string(),
                available,
            });
        }
        stock.insert(item_id.to_string(), available - amount);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let item = Item {
            item_id: item_id.to_string(),
            amount,
        };
        lock(&self.reservations).insert(id, (order_id, item));
        Ok(id)
    }

    async fn cancel(&self, reservation_id: i64) -> Result<()> {
        self.log.record("inventory.cancel");
        self.faults.check("cancel")?;

        let removed = lock(&self.reservations).remove(&reservation_id);
        if let Some((_, item)) = removed {
            *lock(&self.stock).entry(item.item_id).or_insert(0) += item.amount;
        }
        Ok(())
    }
}

pub struct InMemoryDelivery {
    couriers: Vec<i64>,
    assignments: Mutex<HashMap<i64, CourierAssignment>>,
    next_id: AtomicI64,
    faults: Faults,
    log: CallLog,
}

impl InMemoryDelivery {
    /// A delivery service with `couriers` idle couriers.
    pub fn new(log: CallLog, couriers: i64) -> Self {
        Self {
            couriers: (1..=couriers).collect(),
            assignments: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            faults: Faults::default(),
            log,
        }
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn assignment(&self, order_id: i64) -> Option<CourierAssignment> {
        lock(&self.assignments).get(&order_id).copied()
    }
}

#[async_trait]
impl DeliveryGateway for InMemoryDelivery {
    async fn assign_courier(&self, order_id: i64) -> Result<CourierAssignment> {
        self.log.record("delivery.assign_courier");
        self.faults.check("assign_courier")?;

        let mut assignments = lock(&self.assignments);
        if let Some(existing) = assignments.get(&order_id) {
            return Ok(*existing);
        }

        let courier_id = self
            .couriers
            .iter()
            .copied()
            .find(|id| assignments.values().all(|a| a.courier_id != *id))
            .ok_or(CheckoutError::NoCourierAvailable)?;
        let assignment = CourierAssignment {
            courier_id,
            delivery_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        assignments.insert(order_id, assignment);
        Ok(assignment)
    }

    async fn release(&self, delivery_id: i64) -> Result<()> {
        self.log.record("delivery.release");
        self.faults.check("release")?;

        lock(&self.assignments).retain(|_, a| a.delivery_id != delivery_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<i64, UserInfo>,
}

impl StaticUserDirectory {
    pub fn with_user(mut self, user_id: i64, login: &str, email: &str) -> Self {
        self.users.insert(
            user_id,
            UserInfo {
                user_id,
                login: login.to_string(),
                email: email.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn user(&self, id: i64) -> Result<UserInfo> {
        self.users
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("user {id}")))
    }
}

#[derive(Default)]
struct BrokerState {
    topics: Mutex<HashMap<String, Vec<Message>>>,
    committed: Mutex<HashMap<(String, String), i64>>,
    published: Notify,
    faults: Faults,
}

/// Single-partition topics with per-group committed offsets.
///
/// A subscription starts reading at its group's committed offset, so a
/// message that was never committed is fetched again by the next
/// subscription of the same group. Committed offsets never move backwards.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.state.faults
    }

    pub fn event_bus(&self) -> EventBus {
        EventBus::new(Arc::new(self.clone()), Topics::default())
    }

    pub fn messages(&self, topic: &str) -> Vec<Message> {
        lock(&self.state.topics).get(topic).cloned().unwrap_or_default()
    }

    /// Payloads published on `topic`, decoded as JSON.
    pub fn events<T: serde::de::DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.messages(topic)
            .iter()
            .filter_map(|m| m.json().ok())
            .collect()
    }

    pub fn committed(&self, topic: &str, group: &str) -> Option<i64> {
        lock(&self.state.committed)
            .get(&(topic.to_string(), group.to_string()))
            .copied()
    }

    pub fn subscribe(&self, topic: &str, group: &str) -> InMemorySubscription {
        let position = self.committed(topic, group).unwrap_or(0);
        InMemorySubscription {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position: Mutex::new(position),
            faults: Faults::default(),
        }
    }

    fn append(&self, topic: &str, key: &str, payload: Vec<u8>) {
        let mut topics = lock(&self.state.topics);
        let log = topics.entry(topic.to_string()).or_default();
        log.push(Message {
            topic: topic.to_string(),
            partition: 0,
            offset: log.len() as i64,
            key: Some(key.as_bytes().to_vec()),
            payload,
        });
        drop(topics);
        self.state.published.notify_waiters();
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        self.state
            .faults
            .check("publish")
            .map_err(|e| CheckoutError::Broker(e.to_string()))?;
        self.append(topic, key, payload);
        Ok(())
    }
}

pub struct InMemorySubscription {
    broker: InMemoryBroker,
    topic: String,
    group: String,
    position: Mutex<i64>,
    faults: Faults,
}

impl InMemorySubscription {
    /// Failures injected under `"fetch"` and `"commit"`.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl MessageSource for InMemorySubscription {
    async fn fetch(&self) -> Result<Message> {
        self.faults
            .check("fetch")
            .map_err(|e| CheckoutError::Broker(e.to_string()))?;

        loop {
            let published = self.broker.state.published.notified();
            {
                let topics = lock(&self.broker.state.topics);
                let mut position = lock(&self.position);
                if let Some(message) = topics
                    .get(&self.topic)
                    .and_then(|log| log.get(*position as usize))
                {
                    *position += 1;
                    return Ok(message.clone());
                }
            }
            published.await;
        }
    }

    async fn commit(&self, message: &Message) -> Result<()> {
        self.faults
            .check("commit")
            .map_err(|e| CheckoutError::Broker(e.to_string()))?;

        let mut committed = lock(&self.broker.state.committed);
        let offset = committed
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        *offset = (*offset).max(message.offset + 1);
        Ok(())
    }
}

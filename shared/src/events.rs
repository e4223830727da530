//! Order-lifecycle events and the publish side of the event bus.
//!
//! Payloads carry only the correlation id; consumers fetch the current state
//! from the owning service instead of trusting the event body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OrderEventType {
    Created,
    Other(u8),
}

impl From<u8> for OrderEventType {
    fn from(value: u8) -> Self {
        match value {
            1 => OrderEventType::Created,
            other => OrderEventType::Other(other),
        }
    }
}

impl From<OrderEventType> for u8 {
    fn from(value: OrderEventType) -> Self {
        match value {
            OrderEventType::Created => 1,
            OrderEventType::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: OrderEventType,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserEvent {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIsPaidEvent {
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentFailedEvent {
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub new_users: String,
    pub new_orders: String,
    pub order_is_paid: String,
    pub order_payment_failed: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            new_users: "new-user".to_string(),
            new_orders: "new-order".to_string(),
            order_is_paid: "order-is-paid".to_string(),
            order_payment_failed: "order-payment-failed".to_string(),
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;
}

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            delivery_timeout: Duration::from_secs(5),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(topic).payload(&payload).key(key);

        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(e, _)| CheckoutError::Broker(format!("failed to publish to {topic}: {e}")))?;

        Ok(())
    }
}

/// Typed publishing of the order-lifecycle events onto the configured topics.
#[derive(Clone)]
pub struct EventBus {
    publisher: Arc<dyn EventPublisher>,
    topics: Topics,
}

impl EventBus {
    pub fn new(publisher: Arc<dyn EventPublisher>, topics: Topics) -> Self {
        Self { publisher, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub async fn order_created(&self, order_id: i64) -> Result<()> {
        let event = OrderEvent {
            event_type: OrderEventType::Created,
            id: order_id,
        };
        self.send(&self.topics.new_orders, order_id, &event).await
    }

    pub async fn order_paid(&self, order_id: i64) -> Result<()> {
        self.send(&self.topics.order_is_paid, order_id, &OrderIsPaidEvent { order_id })
            .await
    }

    pub async fn order_payment_failed(&self, order_id: i64) -> Result<()> {
        self.send(
            &self.topics.order_payment_failed,
            order_id,
            &OrderPaymentFailedEvent { order_id },
        )
        .await
    }

    async fn send<T: Serialize>(&self, topic: &str, key: i64, event: &T) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.publisher.publish(topic, &key.to_string(), payload).await?;
        debug!(topic, key, "published event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_event_wire_format() {
        let event = OrderEvent {
            event_type: OrderEventType::Created,
            id: 7,
        };
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"type":1,"id":7}"#);

        let other: OrderEvent = serde_json::from_str(r#"{"type":3,"id":7}"#).unwrap();
        assert_eq!(other.event_type, OrderEventType::Other(3));
    }

    #[test]
    fn outcome_events_carry_only_the_order_id() {
        let paid = serde_json::to_value(OrderIsPaidEvent { order_id: 42 }).unwrap();
        assert_eq!(paid, serde_json::json!({ "order_id": 42 }));
    }
}

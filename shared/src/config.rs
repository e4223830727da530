//! Command-line and environment settings shared by the service binaries.
//! Each binary flattens the groups it needs into its own `Args`.

use std::time::Duration;

use clap::Args;

use crate::consumer::ConsumeOptions;
use crate::events::Topics;

#[derive(Debug, Clone, Args)]
pub struct HttpArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,
}

impl HttpArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_POOL_SIZE", default_value = "10")]
    pub database_pool_size: u32,
}

#[derive(Debug, Clone, Args)]
pub struct KafkaArgs {
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[arg(long, env = "NEW_USERS_TOPIC", default_value = "new-user")]
    pub new_users_topic: String,

    #[arg(long, env = "NEW_ORDERS_TOPIC", default_value = "new-order")]
    pub new_orders_topic: String,

    #[arg(long, env = "ORDER_IS_PAID_TOPIC", default_value = "order-is-paid")]
    pub order_is_paid_topic: String,

    #[arg(long, env = "ORDER_PAYMENT_FAILED_TOPIC", default_value = "order-payment-failed")]
    pub order_payment_failed_topic: String,
}

impl KafkaArgs {
    pub fn topics(&self) -> Topics {
        Topics {
            new_users: self.new_users_topic.clone(),
            new_orders: self.new_orders_topic.clone(),
            order_is_paid: self.order_is_paid_topic.clone(),
            order_payment_failed: self.order_payment_failed_topic.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConsumerArgs {
    #[arg(long, env = "CONSUMER_GROUP")]
    pub consumer_group: Option<String>,

    /// Pause after a failed fetch before trying again.
    #[arg(long, env = "FETCH_BACKOFF_MS", default_value = "3000")]
    pub fetch_backoff_ms: u64,
}

impl ConsumerArgs {
    /// The configured group, or `default` when none was given.
    pub fn group_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.consumer_group.as_deref().unwrap_or(default)
    }

    pub fn options(&self) -> ConsumeOptions {
        ConsumeOptions {
            fetch_backoff: Duration::from_millis(self.fetch_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct UpstreamArgs {
    /// Per-request timeout for calls to other services.
    #[arg(long, env = "HTTP_CLIENT_TIMEOUT_MS", default_value = "1000")]
    pub http_timeout_ms: u64,
}

impl UpstreamArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

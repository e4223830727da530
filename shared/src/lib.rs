pub mod checkout;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod kafka;
pub mod models;
pub mod ports;
pub mod saga;
pub mod telemetry;
pub mod testing;

pub use checkout::{Checkout, CheckoutMode, EventDrivenCheckout};
pub use consumer::{
    consume_topic, shutdown_channel, spawn_consumer, ConsumeOptions, Message, MessageHandler,
    MessageSource, Shutdown, ShutdownTrigger,
};
pub use error::{CheckoutError, ErrorBody, Result};
pub use events::{
    EventBus, EventPublisher, KafkaEventPublisher, NewUserEvent, OrderEvent, OrderEventType,
    OrderIsPaidEvent, OrderPaymentFailedEvent, Topics,
};
pub use kafka::KafkaMessageSource;
pub use models::*;
pub use ports::*;
pub use saga::{OrderSaga, Saga};

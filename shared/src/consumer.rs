//! The consume loop shared by every event subscriber.
//!
//! Messages are fetched one at a time. A message is committed only after its
//! handler succeeded; a failed message is logged and skipped without a commit.
//! Commits store `offset + 1` and are monotonic per partition, so once a later
//! message of the same partition is committed the group has moved past any
//! earlier failed message. Redelivery of a failed message therefore relies on
//! the group being restarted or rebalanced before that happens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// A subscription to one topic under one consumer group.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits for the next message.
    async fn fetch(&self) -> Result<Message>;

    /// Marks `message` as processed for the consumer group.
    async fn commit(&self, message: &Message) -> Result<()>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub fetch_backoff: Duration,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            fetch_backoff: Duration::from_secs(3),
        }
    }
}

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested or the trigger was dropped.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

pub async fn consume_topic<S, H>(
    name: &str,
    source: &S,
    handler: &H,
    options: &ConsumeOptions,
    mut shutdown: Shutdown,
) where
    S: MessageSource + ?Sized,
    H: MessageHandler + ?Sized,
{
    info!(consumer = name, "consumer started");

    loop {
        if shutdown.is_triggered() {
            break;
        }

        let fetched = tokio::select! {
            _ = shutdown.triggered() => break,
            fetched = source.fetch() => fetched,
        };

        let message = match fetched {
            Ok(message) => message,
            Err(e) => {
                warn!(consumer = name, error = %e, "fetch failed, retrying");
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    _ = tokio::time::sleep(options.fetch_backoff) => continue,
                }
            }
        };

        debug!(
            consumer = name,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "message received"
        );

        if let Err(e) = handler.handle(&message).await {
            error!(
                consumer = name,
                topic = %message.topic,
                offset = message.offset,
                error = ?e,
                "failed to process message, leaving it uncommitted"
            );
            continue;
        }

        if let Err(e) = source.commit(&message).await {
            error!(consumer = name, offset = message.offset, error = %e, "failed to commit message");
        }
    }

    info!(consumer = name, "consumer exited");
}

pub fn spawn_consumer(
    name: &'static str,
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
    options: ConsumeOptions,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        consume_topic(name, source.as_ref(), handler.as_ref(), &options, shutdown).await;
    })
}

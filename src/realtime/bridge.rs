//! Cross-process fan-out.
//!
//! Every process publishes the events it originates to one shared channel and
//! re-broadcasts what other processes published. Pub/sub is not durable: a
//! process that is not subscribed when an envelope goes out never sees it.

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::rooms::Room;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("bridge did not connect within {0:?}")]
    Timeout(Duration),

    #[error("bridge unavailable: {0}")]
    Unavailable(String),

    #[error("realtime hub is not running")]
    NotRunning,
}

/// Who an event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rooms", rename_all = "snake_case")]
pub enum Target {
    Rooms(Vec<Room>),
    All,
}

/// Envelope
///
/// The unit carried over the shared channel. `origin` is the publishing
/// process's node id; a process skips envelopes carrying its own id because it
/// already delivered them locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: Uuid,
    pub target: Target,
    pub event: String,
    pub payload: JsonValue,
}

/// BridgeLink
///
/// A live attachment to the shared channel: envelopes sent on `outbound` are
/// published, and `inbound` yields everything published by anyone (including
/// this process).
pub struct BridgeLink {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: BoxStream<'static, Envelope>,
}

/// PubSubBridge
///
/// Connects a process to the shared channel.
#[async_trait]
pub trait PubSubBridge: Send + Sync {
    async fn connect(&self) -> Result<BridgeLink, RealtimeError>;
}

// --- Redis ---

/// RedisBridge
///
/// Publishes over a multiplexed connection and subscribes on a dedicated
/// pub/sub connection.
#[derive(Debug, Clone)]
pub struct RedisBridge {
    url: String,
    channel: String,
}

impl RedisBridge {
    pub fn new(url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl PubSubBridge for RedisBridge {
    async fn connect(&self) -> Result<BridgeLink, RealtimeError> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut publisher = client.get_multiplexed_async_connection().await?;
        let mut subscriber = client.get_async_pubsub().await?;
        subscriber.subscribe(self.channel.as_str()).await?;

        let (outbound, mut queue) = mpsc::unbounded_channel::<Envelope>();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            while let Some(envelope) = queue.recv().await {
                let body = match serde_json::to_string(&envelope) {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(
                            event = %envelope.event,
                            error = %e,
                            "envelope not serializable, dropped"
                        );
                        continue;
                    }
                };
                let published: redis::RedisResult<()> =
                    publisher.publish(channel.as_str(), body).await;
                if let Err(e) = published {
                    tracing::warn!(event = %envelope.event, error = %e, "redis publish failed");
                }
            }
        });

        let inbound = subscriber
            .into_on_message()
            .filter_map(|msg| async move {
                let body: String = msg.get_payload().ok()?;
                match serde_json::from_str::<Envelope>(&body) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring malformed envelope");
                        None
                    }
                }
            })
            .boxed();

        tracing::info!(channel = %self.channel, "connected realtime bridge to redis");
        Ok(BridgeLink { outbound, inbound })
    }
}

// --- In-process ---

#[derive(Debug, Clone)]
enum Reachability {
    Up,
    Refusing,
    Hanging,
}

/// InMemoryBridge
///
/// An in-process stand-in for the shared channel. Clones share one channel,
/// so hubs connected through clones of the same bridge behave like separate
/// processes on one Redis.
#[derive(Debug, Clone)]
pub struct InMemoryBridge {
    channel: broadcast::Sender<Envelope>,
    reachability: Reachability,
}

impl Default for InMemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBridge {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(1024);
        Self {
            channel,
            reachability: Reachability::Up,
        }
    }

    /// A bridge whose connection attempt fails immediately.
    pub fn refusing() -> Self {
        Self {
            reachability: Reachability::Refusing,
            ..Self::new()
        }
    }

    /// A bridge whose connection attempt never completes.
    pub fn hanging() -> Self {
        Self {
            reachability: Reachability::Hanging,
            ..Self::new()
        }
    }
}

#[async_trait]
impl PubSubBridge for InMemoryBridge {
    async fn connect(&self) -> Result<BridgeLink, RealtimeError> {
        match self.reachability {
            Reachability::Up => {}
            Reachability::Refusing => {
                return Err(RealtimeError::Unavailable("connection refused".into()));
            }
            Reachability::Hanging => futures::future::pending::<()>().await,
        }

        let (outbound, mut queue) = mpsc::unbounded_channel::<Envelope>();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            while let Some(envelope) = queue.recv().await {
                // No subscribers is not an error for pub/sub.
                let _ = channel.send(envelope);
            }
        });

        let inbound = futures::stream::unfold(self.channel.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => return Some((envelope, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-memory bridge subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(BridgeLink { outbound, inbound })
    }
}

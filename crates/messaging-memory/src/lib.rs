//! In-memory broker for the messaging crate.
//!
//! Each topic keeps one queue per subscriber name. Subscriptions sharing a
//! name compete for that queue; distinct names each get their own copy of
//! every message published after they subscribed.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod publisher;
mod state;
mod subscription;

pub use error::Error;
pub use publisher::MemoryPublisher;
pub use subscription::{MemoryDelivery, MemorySubscription};

use state::State;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use trellis_messaging::broker::{Broker, Connector};
use uuid::Uuid;

/// Default delay before a rejected message is delivered again.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Options for the in-memory broker.
#[derive(Clone, Debug)]
pub struct MemoryBrokerOptions {
    /// Delay before a negatively acknowledged message is queued again.
    pub redelivery_delay: Duration,
}

impl Default for MemoryBrokerOptions {
    fn default() -> Self {
        Self {
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }
}

/// An in-process broker. Clones share the same topics.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    options: MemoryBrokerOptions,
    state: Arc<State>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerOptions::default())
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new(options: MemoryBrokerOptions) -> Self {
        Self {
            options,
            state: Arc::new(State::default()),
        }
    }

    /// Number of messages queued for a subscriber name, excluding ones
    /// currently held by a subscription.
    #[must_use]
    pub fn pending(&self, topic: &str, subscriber: &str) -> usize {
        self.state
            .existing_queue(topic, subscriber)
            .map_or(0, |queue| queue.len())
    }

    /// Makes every operation fail with [`Error::Disconnected`] until
    /// [`reconnect`](Self::reconnect). Blocked receives are released.
    pub fn disconnect(&self) {
        debug!("memory broker disconnected");
        self.state.disconnect();
    }

    /// Ends a [`disconnect`](Self::disconnect).
    pub fn reconnect(&self) {
        debug!("memory broker reconnected");
        self.state.reconnect();
    }

    /// Stops serving for good. Blocked and future operations fail with
    /// [`Error::Interrupted`].
    pub fn interrupt(&self) {
        debug!("memory broker interrupted");
        self.state.interrupt();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Error = Error;

    type Publisher = MemoryPublisher;

    type Subscription = MemorySubscription;

    async fn publisher(&self, topic: &str) -> Result<Self::Publisher, Self::Error> {
        self.state.check()?;

        Ok(MemoryPublisher::new(self.state.clone(), topic.to_string()))
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
    ) -> Result<Self::Subscription, Self::Error> {
        self.state.check()?;

        Ok(MemorySubscription::new(
            self.state.clone(),
            topic.to_string(),
            subscriber.to_string(),
            self.options.redelivery_delay,
            false,
        ))
    }

    async fn subscribe_private(&self, topic: &str) -> Result<Self::Subscription, Self::Error> {
        self.state.check()?;

        Ok(MemorySubscription::new(
            self.state.clone(),
            topic.to_string(),
            format!("private-{}", Uuid::new_v4()),
            self.options.redelivery_delay,
            true,
        ))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.state.close();
        Ok(())
    }
}

/// Connecting hands out another handle to the same broker.
#[async_trait]
impl Connector for MemoryBroker {
    type Broker = Self;

    async fn connect(&self) -> Result<Self, Error> {
        self.state.check()?;
        Ok(self.clone())
    }
}

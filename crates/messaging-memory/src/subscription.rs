use crate::error::Error;
use crate::state::{Queue, State, StoredMessage};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use trellis_messaging::Properties;
use trellis_messaging::broker::{Delivery, Subscription};

/// A message handed out by a [`MemorySubscription`].
#[derive(Clone, Debug)]
pub struct MemoryDelivery {
    message: StoredMessage,
}

impl Delivery for MemoryDelivery {
    fn payload(&self) -> &Bytes {
        &self.message.payload
    }

    fn properties(&self) -> &Properties {
        &self.message.properties
    }

    fn redeliveries(&self) -> u32 {
        self.message.redeliveries
    }
}

/// Receives from one subscriber queue of an in-memory broker.
///
/// Messages handed out but not yet acknowledged go back to the queue when
/// the subscription is dropped. A private subscription instead takes its
/// queue with it.
#[derive(Debug)]
pub struct MemorySubscription {
    private: bool,
    queue: Arc<Queue>,
    redelivery_delay: Duration,
    state: Arc<State>,
    subscriber: String,
    topic: String,
    unacknowledged: HashMap<u64, StoredMessage>,
}

impl MemorySubscription {
    pub(crate) fn new(
        state: Arc<State>,
        topic: String,
        subscriber: String,
        redelivery_delay: Duration,
        private: bool,
    ) -> Self {
        let queue = state.queue(&topic, &subscriber);

        Self {
            private,
            queue,
            redelivery_delay,
            state,
            subscriber,
            topic,
            unacknowledged: HashMap::new(),
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    type Error = Error;

    type Delivery = MemoryDelivery;

    fn topic(&self) -> &str {
        &self.topic
    }

    fn subscriber(&self) -> &str {
        &self.subscriber
    }

    async fn receive(&mut self) -> Result<Self::Delivery, Self::Error> {
        loop {
            self.state.check()?;

            if let Some(message) = self.queue.pop() {
                self.unacknowledged.insert(message.id, message.clone());
                return Ok(MemoryDelivery { message });
            }

            tokio::select! {
                () = self.queue.notified() => {}
                () = self.state.unavailable() => {}
            }
        }
    }

    async fn acknowledge(&mut self, delivery: &Self::Delivery) -> Result<(), Self::Error> {
        self.state.check()?;

        if self.unacknowledged.remove(&delivery.message.id).is_none() {
            debug!(
                "message {} on '{}/{}' was not outstanding",
                delivery.message.id, self.topic, self.subscriber
            );
        }

        Ok(())
    }

    async fn negative_acknowledge(
        &mut self,
        delivery: &Self::Delivery,
    ) -> Result<(), Self::Error> {
        self.state.check()?;

        let Some(mut message) = self.unacknowledged.remove(&delivery.message.id) else {
            debug!(
                "message {} on '{}/{}' was not outstanding",
                delivery.message.id, self.topic, self.subscriber
            );
            return Ok(());
        };

        message.redeliveries += 1;

        if self.redelivery_delay.is_zero() {
            self.queue.push(message);
        } else {
            let queue = self.queue.clone();
            let delay = self.redelivery_delay;

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.push(message);
            });
        }

        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if self.private {
            self.state.remove_queue(&self.topic, &self.subscriber);
            return;
        }

        let mut messages: Vec<_> = self.unacknowledged.drain().map(|(_, m)| m).collect();
        messages.sort_by_key(|message| message.id);

        for message in messages {
            self.queue.push(message);
        }
    }
}

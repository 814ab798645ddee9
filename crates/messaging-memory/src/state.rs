use crate::error::Error;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use trellis_messaging::Properties;

#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub id: u64,
    pub payload: Bytes,
    pub properties: Properties,
    pub redeliveries: u32,
}

/// Messages waiting for one subscriber name.
#[derive(Debug, Default)]
pub struct Queue {
    messages: Mutex<VecDeque<StoredMessage>>,
    notify: Notify,
}

impl Queue {
    pub fn push(&self, message: StoredMessage) {
        self.messages.lock().push_back(message);
        self.notify.notify_one();
    }

    /// Pops the oldest message. Wakes the next competing subscription if more remain.
    pub fn pop(&self) -> Option<StoredMessage> {
        let mut messages = self.messages.lock();
        let message = messages.pop_front();

        if message.is_some() && !messages.is_empty() {
            self.notify.notify_one();
        }

        message
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Shared state behind every handle of one broker.
#[derive(Debug)]
pub struct State {
    /// topic -> subscriber name -> queue
    topics: Mutex<HashMap<String, HashMap<String, Arc<Queue>>>>,
    next_id: AtomicU64,
    closed: CancellationToken,
    interrupted: CancellationToken,
    disconnected: AtomicBool,
    /// Cancelled on disconnect and replaced on reconnect.
    connection: Mutex<CancellationToken>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: CancellationToken::new(),
            interrupted: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
            connection: Mutex::new(CancellationToken::new()),
        }
    }
}

impl State {
    pub fn check(&self) -> Result<(), Error> {
        if self.interrupted.is_cancelled() {
            Err(Error::Interrupted)
        } else if self.closed.is_cancelled() {
            Err(Error::Closed)
        } else if self.disconnected.load(Ordering::SeqCst) {
            Err(Error::Disconnected)
        } else {
            Ok(())
        }
    }

    /// Resolves when any condition that `check` reports might have changed.
    pub async fn unavailable(&self) {
        let connection = self.connection.lock().clone();

        tokio::select! {
            () = self.closed.cancelled() => {}
            () = self.interrupted.cancelled() => {}
            () = connection.cancelled() => {}
        }
    }

    pub fn queue(&self, topic: &str, subscriber: &str) -> Arc<Queue> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .entry(subscriber.to_string())
            .or_default()
            .clone()
    }

    pub fn existing_queue(&self, topic: &str, subscriber: &str) -> Option<Arc<Queue>> {
        self.topics
            .lock()
            .get(topic)
            .and_then(|subscribers| subscribers.get(subscriber))
            .cloned()
    }

    /// Forgets a subscriber name on a topic, along with anything still queued for it.
    pub fn remove_queue(&self, topic: &str, subscriber: &str) {
        let mut topics = self.topics.lock();

        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(subscriber);

            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Copies a message into every subscriber queue on the topic. Returns the
    /// number of queues it reached.
    pub fn publish(&self, topic: &str, payload: &Bytes, properties: &Properties) -> usize {
        let topics = self.topics.lock();

        let Some(subscribers) = topics.get(topic) else {
            return 0;
        };

        for queue in subscribers.values() {
            queue.push(StoredMessage {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                payload: payload.clone(),
                properties: properties.clone(),
                redeliveries: 0,
            });
        }

        subscribers.len()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn interrupt(&self) {
        self.interrupted.cancel();
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.connection.lock().cancel();
    }

    pub fn reconnect(&self) {
        let mut connection = self.connection.lock();
        *connection = CancellationToken::new();
        self.disconnected.store(false, Ordering::SeqCst);
    }
}

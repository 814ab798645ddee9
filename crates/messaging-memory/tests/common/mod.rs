#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use trellis_messaging::broker::{Broker, Delivery, Publisher, Subscription};
use trellis_messaging::metrics::{MessageOutcome, MetricsSink, RequestOutcome};
use trellis_messaging::{CORRELATION_ID, Properties};
use trellis_messaging_memory::{MemoryBroker, MemoryBrokerOptions};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text(pub String);

impl Text {
    pub fn new(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl TryFrom<Bytes> for Text {
    type Error = serde_json::Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
    }
}

impl TryFrom<Text> for Bytes {
    type Error = serde_json::Error;

    fn try_from(text: Text) -> Result<Self, Self::Error> {
        serde_json::to_vec(&text).map(Self::from)
    }
}

#[derive(Debug, Default)]
pub struct CountingMetrics {
    pub acknowledged: AtomicUsize,
    pub rejected: AtomicUsize,
    pub discarded: AtomicUsize,
    pub replied: AtomicUsize,
    pub timed_out: AtomicUsize,
    pub failed: AtomicUsize,
    pub restarts: AtomicUsize,
}

impl CountingMetrics {
    pub fn acknowledged(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

impl MetricsSink for CountingMetrics {
    fn message_handled(&self, _consumer: &str, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Acknowledged => self.acknowledged.fetch_add(1, Ordering::SeqCst),
            MessageOutcome::Rejected => self.rejected.fetch_add(1, Ordering::SeqCst),
            MessageOutcome::Discarded => self.discarded.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn request_completed(&self, _topic: &str, outcome: RequestOutcome, _elapsed: Duration) {
        match outcome {
            RequestOutcome::Replied => self.replied.fetch_add(1, Ordering::SeqCst),
            RequestOutcome::TimedOut => self.timed_out.fetch_add(1, Ordering::SeqCst),
            RequestOutcome::Failed => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn stage_restarted(&self, _stage: &str) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn broker_with_delay(redelivery_delay: Duration) -> MemoryBroker {
    MemoryBroker::new(MemoryBrokerOptions { redelivery_delay })
}

/// Polls until `condition` holds, panicking after two seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

pub async fn send_raw(broker: &MemoryBroker, topic: &str, payload: Bytes, properties: Properties) {
    broker
        .publisher(topic)
        .await
        .unwrap()
        .send(payload, properties)
        .await
        .unwrap();
}

/// Answers every request on `request_topic` by echoing its payload under the
/// request's correlation id.
pub async fn spawn_echo_responder(
    broker: &MemoryBroker,
    request_topic: &str,
    response_topic: &str,
) -> JoinHandle<()> {
    let mut requests = broker.subscribe(request_topic, "echo").await.unwrap();
    let replies = broker.publisher(response_topic).await.unwrap();

    tokio::spawn(async move {
        while let Ok(request) = requests.receive().await {
            let id = request.properties().get(CORRELATION_ID).cloned().unwrap();
            requests.acknowledge(&request).await.unwrap();

            let properties = Properties::from([(CORRELATION_ID.to_string(), id)]);
            if replies
                .send(request.payload().clone(), properties)
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

pub fn counting_metrics() -> Arc<CountingMetrics> {
    Arc::new(CountingMetrics::default())
}

pub type TextProducer =
    trellis_messaging::producer::Producer<MemoryBroker, Text, serde_json::Error, serde_json::Error>;

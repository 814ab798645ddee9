//! A forwarding stage kept alive by the supervisor over the in-memory broker.

mod common;

use common::{CountingMetrics, Text, TextProducer, broker_with_delay, counting_metrics};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use trellis_messaging::broker::{Broker, Delivery, Subscription};
use trellis_messaging::consumer::{Consumer, Error as ConsumerError};
use trellis_messaging::consumer_handler::{ConsumerHandler, ConsumerHandlerError};
use trellis_messaging::producer::Error as ProducerError;
use trellis_messaging::stage::{Stage, StageError};
use trellis_messaging::supervisor::{Exit, Supervisor, SupervisorOptions};
use trellis_messaging::{ErrorKind, Message};
use trellis_messaging_memory::{Error as MemoryError, MemoryBroker};

#[derive(Debug, Error)]
#[error(transparent)]
struct ForwardError(#[from] ProducerError<MemoryError, serde_json::Error>);

impl ConsumerHandlerError for ForwardError {
    fn escalation(&self) -> Option<ErrorKind> {
        Some(self.0.kind())
    }
}

#[derive(Clone, Debug)]
struct ForwardHandler {
    output: TextProducer,
}

#[async_trait]
impl ConsumerHandler<Text, serde_json::Error, serde_json::Error> for ForwardHandler {
    type Error = ForwardError;

    async fn handle(&self, message: Message<Text>) -> Result<(), Self::Error> {
        self.output.send(message.payload).await?;
        Ok(())
    }
}

#[derive(Debug, Error)]
enum ForwardStageError {
    #[error("refusing to start (attempt {0})")]
    Refused(usize),

    #[error(transparent)]
    Consumer(#[from] ConsumerError<MemoryError, ForwardError>),

    #[error(transparent)]
    Producer(#[from] ProducerError<MemoryError, serde_json::Error>),
}

impl StageError for ForwardStageError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Refused(_) => ErrorKind::Retryable,
            Self::Consumer(e) => e.kind(),
            Self::Producer(e) => e.kind(),
        }
    }
}

#[derive(Debug)]
struct ForwardConfig {
    broker: MemoryBroker,
    attempts: AtomicUsize,
    refuse_first: usize,
    started: Notify,
}

impl ForwardConfig {
    fn new(broker: &MemoryBroker, refuse_first: usize) -> Arc<Self> {
        Arc::new(Self {
            broker: broker.clone(),
            attempts: AtomicUsize::new(0),
            refuse_first,
            started: Notify::new(),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct ForwardStage {
    config: Arc<ForwardConfig>,
    consumer: Consumer<MemoryBroker, ForwardHandler, Text, serde_json::Error, serde_json::Error>,
}

#[async_trait]
impl Stage for ForwardStage {
    const NAME: &'static str = "forward";

    type Config = Arc<ForwardConfig>;
    type Error = ForwardStageError;

    async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
        let attempt = config.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < config.refuse_first {
            return Err(ForwardStageError::Refused(attempt));
        }

        let handler = ForwardHandler {
            output: TextProducer::new(&config.broker, "output").await?,
        };

        let consumer = Consumer::new(
            &config.broker,
            "input",
            "forward",
            handler,
            Arc::new(trellis_messaging::metrics::NoopMetrics),
        )
        .await?;

        Ok(Self {
            config: config.clone(),
            consumer,
        })
    }

    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
        self.config.started.notify_one();
        self.consumer.run(shutdown).await?;
        Ok(())
    }
}

fn supervisor(
    config: &Arc<ForwardConfig>,
    backoff: Duration,
    shutdown: &CancellationToken,
    metrics: &Arc<CountingMetrics>,
) -> Supervisor<ForwardStage> {
    Supervisor::new(
        config.clone(),
        SupervisorOptions {
            restart_backoff: backoff,
        },
        shutdown.clone(),
    )
    .with_metrics(metrics.clone())
}

async fn assert_forwards(broker: &MemoryBroker, text: &str) {
    let mut output = broker.subscribe("output", "spy").await.unwrap();

    TextProducer::new(broker, "input")
        .await
        .unwrap()
        .send(Text::new(text))
        .await
        .unwrap();

    let delivery = output
        .receive_timeout(Duration::from_secs(2))
        .await
        .unwrap()
        .expect("nothing forwarded");
    output.acknowledge(&delivery).await.unwrap();

    assert_eq!(Text::try_from(delivery.payload().clone()).unwrap(), Text::new(text));
}

#[tokio::test]
async fn test_construction_retried_with_fixed_backoff() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let config = ForwardConfig::new(&broker, 2);
    let metrics = counting_metrics();
    let shutdown = CancellationToken::new();

    let start = Instant::now();
    let supervisor = supervisor(&config, Duration::from_millis(100), &shutdown, &metrics);
    let handle = tokio::spawn(async move { supervisor.run().await });

    timeout(Duration::from_secs(2), config.started.notified())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(config.attempts(), 3);
    assert_eq!(metrics.restarts.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1));

    assert_forwards(&broker, "after two failures").await;

    shutdown.cancel();
    assert_eq!(handle.await.unwrap(), Exit::Shutdown);
}

#[tokio::test]
async fn test_shutdown_while_receiving_exits_without_retry() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let config = ForwardConfig::new(&broker, 0);
    let metrics = counting_metrics();
    let shutdown = CancellationToken::new();

    let supervisor = supervisor(&config, Duration::from_millis(10), &shutdown, &metrics);
    let handle = tokio::spawn(async move { supervisor.run().await });

    timeout(Duration::from_secs(2), config.started.notified())
        .await
        .unwrap();
    shutdown.cancel();

    let exit = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert_eq!(exit, Exit::Shutdown);
    assert_eq!(config.attempts(), 1);
    assert_eq!(metrics.restarts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_broker_interrupt_exits_without_retry() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let config = ForwardConfig::new(&broker, 0);
    let metrics = counting_metrics();
    let shutdown = CancellationToken::new();

    let supervisor = supervisor(&config, Duration::from_millis(10), &shutdown, &metrics);
    let handle = tokio::spawn(async move { supervisor.run().await });

    timeout(Duration::from_secs(2), config.started.notified())
        .await
        .unwrap();
    broker.interrupt();

    let exit = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    assert_eq!(exit, Exit::Fatal);
    assert_eq!(config.attempts(), 1);
    assert_eq!(metrics.restarts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage_rebuilt_after_disconnect() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let config = ForwardConfig::new(&broker, 0);
    let metrics = counting_metrics();
    let shutdown = CancellationToken::new();

    let supervisor = supervisor(&config, Duration::from_millis(20), &shutdown, &metrics);
    let handle = tokio::spawn(async move { supervisor.run().await });

    timeout(Duration::from_secs(2), config.started.notified())
        .await
        .unwrap();

    broker.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(metrics.restarts.load(Ordering::SeqCst) >= 1);
    broker.reconnect();

    timeout(Duration::from_secs(2), config.started.notified())
        .await
        .unwrap();
    assert!(config.attempts() >= 2);

    assert_forwards(&broker, "after reconnect").await;

    shutdown.cancel();
    assert_eq!(handle.await.unwrap(), Exit::Shutdown);
}

use crate::broker::{Broker, BrokerDelivery, BrokerError, Delivery, Subscription};
use crate::consumer_handler::{ConsumerHandler, ConsumerHandlerError};
use crate::error::ErrorKind;
use crate::message::Message;
use crate::metrics::{MessageOutcome, MetricsSink};

use std::error::Error as StdError;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Redelivery limit stages apply unless configured otherwise.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// Errors that can occur in a consumer.
#[derive(Debug, Error)]
pub enum Error<BE, HE>
where
    BE: BrokerError,
    HE: ConsumerHandlerError,
{
    /// `start` was called more than once.
    #[error("consumer already started")]
    AlreadyStarted,

    /// `join` was called before `start`.
    #[error("consumer not started")]
    NotStarted,

    /// Receiving or acknowledging failed.
    #[error("broker error: {0}")]
    Broker(#[source] BE),

    /// The handler reported a failure of the stage's own channels.
    #[error("handler escalated: {0}")]
    Handler(#[source] HE),
}

impl<BE, HE> Error<BE, HE>
where
    BE: BrokerError,
    HE: ConsumerHandlerError,
{
    /// Classifies the error for the supervisor.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyStarted | Self::NotStarted => ErrorKind::Retryable,
            Self::Broker(e) => e.kind(),
            Self::Handler(e) => e.escalation().unwrap_or(ErrorKind::Retryable),
        }
    }
}

/// Lifecycle of a consumer loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created but not started.
    Idle,

    /// Receiving and handling messages.
    Running,

    /// A stop was requested; the current message is being finished.
    Stopping,

    /// The loop has exited.
    Stopped,
}

type Outcome<B, HE> = Option<Result<(), Error<<B as Broker>::Error, HE>>>;

/// Runs a handler over every message on a subscription.
///
/// Successful messages are acknowledged, failed ones negatively acknowledged,
/// strictly in receipt order. Handler failures never end the loop unless the
/// handler escalates them. Broker failures always do.
///
/// With a redelivery limit, a message that fails again after being redelivered
/// that many times is acknowledged and dropped instead of rejected.
pub struct Consumer<B, X, T, D, S>
where
    B: Broker,
    X: ConsumerHandler<T, D, S>,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    name: String,
    handler: X,
    max_redeliveries: Option<u32>,
    metrics: Arc<dyn MetricsSink>,
    outcome: Arc<Mutex<Outcome<B, X::Error>>>,
    /// Taken by the processing task on start.
    subscription: Mutex<Option<B::Subscription>>,
    state: Arc<Mutex<ConsumerState>>,
    /// Shutdown token for graceful termination.
    shutdown_token: CancellationToken,
    /// Task tracker for background processing.
    task_tracker: TaskTracker,
    _marker: PhantomData<(T, D, S)>,
}

impl<B, X, T, D, S> Debug for Consumer<B, X, T, D, S>
where
    B: Broker,
    X: ConsumerHandler<T, D, S>,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("max_redeliveries", &self.max_redeliveries)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<B, X, T, D, S> Consumer<B, X, T, D, S>
where
    B: Broker,
    X: ConsumerHandler<T, D, S>,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    /// Subscribes to a topic and prepares a consumer. Nothing is received until `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker refuses the subscription.
    pub async fn new(
        broker: &B,
        topic: &str,
        subscriber: &str,
        handler: X,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, Error<B::Error, X::Error>> {
        let subscription = broker
            .subscribe(topic, subscriber)
            .await
            .map_err(Error::Broker)?;

        Ok(Self {
            name: format!("{topic}/{subscriber}"),
            handler,
            max_redeliveries: None,
            metrics,
            outcome: Arc::new(Mutex::new(None)),
            subscription: Mutex::new(Some(subscription)),
            state: Arc::new(Mutex::new(ConsumerState::Idle)),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
            _marker: PhantomData,
        })
    }

    /// Drops messages that keep failing after `limit` redeliveries.
    #[must_use]
    pub fn with_max_redeliveries(mut self, limit: u32) -> Self {
        self.max_redeliveries = Some(limit);
        self
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Starts the loop on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<(), Error<B::Error, X::Error>> {
        let subscription = self
            .subscription
            .lock()
            .take()
            .ok_or(Error::AlreadyStarted)?;

        *self.state.lock() = ConsumerState::Running;

        let handler = self.handler.clone();
        let max_redeliveries = self.max_redeliveries;
        let metrics = self.metrics.clone();
        let name = self.name.clone();
        let outcome = self.outcome.clone();
        let state = self.state.clone();
        let shutdown_token = self.shutdown_token.clone();

        self.task_tracker.spawn(async move {
            let result = Self::process_messages(
                subscription,
                handler,
                max_redeliveries,
                metrics,
                &name,
                shutdown_token,
            )
            .await;

            if let Err(e) = &result {
                warn!("consumer '{}' stopped with error: {}", name, e);
            }

            *outcome.lock() = Some(result);
            *state.lock() = ConsumerState::Stopped;
        });

        // No more tasks will be spawned, so `wait` resolves once the loop exits
        self.task_tracker.close();

        Ok(())
    }

    /// Requests a stop. The message in flight, if any, is finished first.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConsumerState::Running {
                *state = ConsumerState::Stopping;
            }
        }

        self.shutdown_token.cancel();
    }

    /// Waits for the loop to exit and returns how it ended.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop, or [`Error::NotStarted`].
    pub async fn join(&self) -> Result<(), Error<B::Error, X::Error>> {
        if self.state() == ConsumerState::Idle {
            return Err(Error::NotStarted);
        }

        self.task_tracker.wait().await;

        self.outcome.lock().take().unwrap_or(Ok(()))
    }

    /// Starts the loop and waits until it exits or `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), Error<B::Error, X::Error>> {
        self.start()?;

        tokio::select! {
            () = self.task_tracker.wait() => {}
            () = shutdown.cancelled() => self.stop(),
        }

        self.join().await
    }

    async fn process_messages(
        mut subscription: B::Subscription,
        handler: X,
        max_redeliveries: Option<u32>,
        metrics: Arc<dyn MetricsSink>,
        name: &str,
        shutdown_token: CancellationToken,
    ) -> Result<(), Error<B::Error, X::Error>> {
        let mut acknowledged: u64 = 0;

        loop {
            let delivery = tokio::select! {
                biased;
                () = shutdown_token.cancelled() => break,
                delivery = subscription.receive() => delivery.map_err(Error::Broker)?,
            };

            let result = match T::try_from(delivery.payload().clone()) {
                Ok(payload) => {
                    let message =
                        Message::with_properties(payload, delivery.properties().clone());
                    handler.handle(message).await
                }
                Err(e) => {
                    warn!("consumer '{}' could not decode message: {}", name, e);
                    let outcome =
                        Self::reject(&mut subscription, &delivery, max_redeliveries, name)
                            .await
                            .map_err(Error::Broker)?;
                    metrics.message_handled(name, outcome);
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    subscription
                        .acknowledge(&delivery)
                        .await
                        .map_err(Error::Broker)?;
                    metrics.message_handled(name, MessageOutcome::Acknowledged);
                    acknowledged += 1;
                }
                Err(e) => {
                    if let Some(kind) = e.escalation() {
                        error!("consumer '{}' handler escalated ({}): {}", name, kind, e);

                        // Best effort: the channel that failed may be this one
                        if let Err(nack_error) = subscription.negative_acknowledge(&delivery).await
                        {
                            debug!("consumer '{}' could not reject message: {}", name, nack_error);
                        }
                        metrics.message_handled(name, MessageOutcome::Rejected);

                        return Err(Error::Handler(e));
                    }

                    warn!("consumer '{}' handler error: {}", name, e);
                    let outcome =
                        Self::reject(&mut subscription, &delivery, max_redeliveries, name)
                            .await
                            .map_err(Error::Broker)?;
                    metrics.message_handled(name, outcome);
                }
            }
        }

        debug!(
            "consumer '{}' stopped after acknowledging {} messages",
            name, acknowledged
        );

        Ok(())
    }

    /// Negatively acknowledges a failed message, or acknowledges it once it
    /// has used up its redeliveries.
    async fn reject(
        subscription: &mut B::Subscription,
        delivery: &BrokerDelivery<B>,
        max_redeliveries: Option<u32>,
        name: &str,
    ) -> Result<MessageOutcome, B::Error> {
        let redeliveries = delivery.redeliveries();

        if max_redeliveries.is_some_and(|limit| redeliveries >= limit) {
            warn!(
                "consumer '{}' discarding message after {} redeliveries",
                name, redeliveries
            );
            subscription.acknowledge(delivery).await?;
            return Ok(MessageOutcome::Discarded);
        }

        subscription.negative_acknowledge(delivery).await?;
        Ok(MessageOutcome::Rejected)
    }
}

impl<B, X, T, D, S> Drop for Consumer<B, X, T, D, S>
where
    B: Broker,
    X: ConsumerHandler<T, D, S>,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

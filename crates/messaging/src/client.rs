use crate::broker::{Broker, BrokerError, Delivery, Publisher, Subscription};
use crate::error::ErrorKind;
use crate::message::{CORRELATION_ID, Properties};
use crate::metrics::{MetricsSink, RequestOutcome};

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default time a request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur in a request client.
#[derive(Debug, Error)]
pub enum Error<BE, SE, RD>
where
    BE: BrokerError,
    SE: Debug + StdError + Send + Sync + 'static,
    RD: Debug + StdError + Send + Sync + 'static,
{
    /// Subscribing, publishing, or receiving failed.
    #[error("broker error: {0}")]
    Broker(#[source] BE),

    /// The response listener has stopped; no reply can arrive any more.
    /// Carries the kind of the failure that stopped it.
    #[error("response listener closed ({0})")]
    Closed(ErrorKind),

    /// The matching reply could not be deserialized.
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[source] RD),

    /// The request could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] SE),

    /// No matching reply arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl<BE, SE, RD> Error<BE, SE, RD>
where
    BE: BrokerError,
    SE: Debug + StdError + Send + Sync + 'static,
    RD: Debug + StdError + Send + Sync + 'static,
{
    /// Classifies the error for the supervisor.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Broker(e) => e.kind(),
            Self::Closed(kind) => *kind,
            Self::Deserialize(_) | Self::Serialize(_) | Self::Timeout(_) => ErrorKind::Retryable,
        }
    }

    /// Whether the call failed only because no reply arrived in time.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the client's own channels failed, as opposed to this one call.
    pub const fn is_channel_failure(&self) -> bool {
        matches!(self, Self::Broker(_) | Self::Closed(_))
    }
}

/// Options for a request client.
#[derive(Clone, Debug)]
pub struct RequestClientOptions {
    /// Topic requests are published to.
    pub request_topic: String,

    /// Topic replies arrive on.
    pub response_topic: String,

    /// Subscriber name for the response subscription. When `None` the client
    /// takes a private subscription, so no other client competes for its
    /// replies and nothing outlives it on the broker.
    pub subscriber: Option<String>,

    /// Time `request` waits for a reply.
    pub timeout: Duration,
}

impl RequestClientOptions {
    /// Creates options with a private subscriber name and the default timeout.
    pub fn new<Q, R>(request_topic: Q, response_topic: R) -> Self
    where
        Q: Into<String>,
        R: Into<String>,
    {
        Self {
            request_topic: request_topic.into(),
            response_topic: response_topic.into(),
            subscriber: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Uses a fixed subscriber name for the response subscription.
    #[must_use]
    pub fn with_subscriber<N: Into<String>>(mut self, subscriber: N) -> Self {
        self.subscriber = Some(subscriber.into());
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct PendingRequest<R, RD> {
    issued_at: Instant,
    deadline: Instant,
    sender: oneshot::Sender<Result<R, RD>>,
}

type PendingMap<R, RD> = HashMap<String, PendingRequest<R, RD>>;

/// Turns a request topic and a response topic into a call/reply interface.
///
/// Each request carries a fresh correlation id in the `id` property. A
/// single listener task owns the response subscription, acknowledges every
/// reply, and hands each one to the request waiting under its id. Replies
/// nobody is waiting for are discarded. Clones share the listener, so
/// concurrent requests through one client never see each other's replies.
pub struct RequestClient<B, T, D, S, R, RD>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
    R: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = RD> + 'static,
    RD: Debug + Send + StdError + Sync + 'static,
{
    closed: CancellationToken,
    /// Why the listener stopped. Set before `closed` is cancelled.
    close_kind: Arc<Mutex<Option<ErrorKind>>>,
    metrics: Arc<dyn MetricsSink>,
    options: Arc<RequestClientOptions>,
    pending: Arc<Mutex<PendingMap<R, RD>>>,
    publisher: Arc<B::Publisher>,
    subscriber: String,
    /// Stops the listener once the last clone is dropped.
    _listener_guard: Arc<DropGuard>,
    _marker: PhantomData<(T, D, S)>,
}

impl<B, T, D, S, R, RD> Clone for RequestClient<B, T, D, S, R, RD>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
    R: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = RD> + 'static,
    RD: Debug + Send + StdError + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            closed: self.closed.clone(),
            close_kind: self.close_kind.clone(),
            metrics: self.metrics.clone(),
            options: self.options.clone(),
            pending: self.pending.clone(),
            publisher: self.publisher.clone(),
            subscriber: self.subscriber.clone(),
            _listener_guard: self._listener_guard.clone(),
            _marker: PhantomData,
        }
    }
}

impl<B, T, D, S, R, RD> Debug for RequestClient<B, T, D, S, R, RD>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
    R: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = RD> + 'static,
    RD: Debug + Send + StdError + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("options", &self.options)
            .field("subscriber", &self.subscriber)
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl<B, T, D, S, R, RD> RequestClient<B, T, D, S, R, RD>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
    R: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = RD> + 'static,
    RD: Debug + Send + StdError + Sync + 'static,
{
    /// Subscribes to the response topic and starts the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription or publisher cannot be created.
    pub async fn new(
        broker: &B,
        options: RequestClientOptions,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, Error<B::Error, S, RD>> {
        // Subscribe before the first request goes out so no reply is missed
        let subscription = match &options.subscriber {
            Some(subscriber) => broker.subscribe(&options.response_topic, subscriber).await,
            None => broker.subscribe_private(&options.response_topic).await,
        }
        .map_err(Error::Broker)?;
        let subscriber = subscription.subscriber().to_string();

        let publisher = broker
            .publisher(&options.request_topic)
            .await
            .map_err(Error::Broker)?;

        let pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();
        let close_kind = Arc::new(Mutex::new(None));
        let listener_token = CancellationToken::new();

        tokio::spawn(Self::listen(
            subscription,
            pending.clone(),
            listener_token.clone(),
            closed.clone(),
            close_kind.clone(),
        ));

        Ok(Self {
            closed,
            close_kind,
            metrics,
            options: Arc::new(options),
            pending,
            publisher: Arc::new(publisher),
            subscriber,
            _listener_guard: Arc::new(listener_token.drop_guard()),
            _marker: PhantomData,
        })
    }

    /// The subscriber name of the response subscription.
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Sends a request and waits up to the configured timeout for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no reply arrives in time. Never retries.
    pub async fn request(&self, request: T) -> Result<R, Error<B::Error, S, RD>> {
        self.request_with_timeout(request, self.options.timeout)
            .await
    }

    /// Sends a request and waits up to `timeout` for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no reply arrives in time. Never retries.
    pub async fn request_with_timeout(
        &self,
        request: T,
        timeout: Duration,
    ) -> Result<R, Error<B::Error, S, RD>> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }

        let issued_at = Instant::now();
        let result = self.exchange(request, issued_at, timeout).await;

        let outcome = match &result {
            Ok(_) => RequestOutcome::Replied,
            Err(Error::Timeout(_)) => RequestOutcome::TimedOut,
            Err(_) => RequestOutcome::Failed,
        };
        self.metrics
            .request_completed(&self.options.request_topic, outcome, issued_at.elapsed());

        result
    }

    async fn exchange(
        &self,
        request: T,
        issued_at: Instant,
        timeout: Duration,
    ) -> Result<R, Error<B::Error, S, RD>> {
        let payload: Bytes = request.try_into().map_err(Error::Serialize)?;

        let correlation_id = Uuid::new_v4().to_string();
        let deadline = issued_at + timeout;
        let (sender, receiver) = oneshot::channel();

        self.pending.lock().insert(
            correlation_id.clone(),
            PendingRequest {
                issued_at,
                deadline,
                sender,
            },
        );

        let properties = Properties::from([(CORRELATION_ID.to_string(), correlation_id.clone())]);

        if let Err(e) = self.publisher.send(payload, properties).await {
            self.pending.lock().remove(&correlation_id);
            return Err(Error::Broker(e));
        }

        let reply = tokio::select! {
            biased;
            reply = tokio::time::timeout_at(deadline, receiver) => reply,
            () = self.closed.cancelled() => {
                self.pending.lock().remove(&correlation_id);
                return Err(self.closed_error());
            }
        };

        match reply {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(e))) => Err(Error::Deserialize(e)),
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => {
                self.pending.lock().remove(&correlation_id);
                debug!(
                    "request {} on '{}' timed out after {:?}",
                    correlation_id, self.options.request_topic, timeout
                );
                Err(Error::Timeout(timeout))
            }
        }
    }

    fn closed_error(&self) -> Error<B::Error, S, RD> {
        Error::Closed((*self.close_kind.lock()).unwrap_or(ErrorKind::Retryable))
    }

    async fn listen(
        mut subscription: B::Subscription,
        pending: Arc<Mutex<PendingMap<R, RD>>>,
        shutdown_token: CancellationToken,
        closed: CancellationToken,
        close_kind: Arc<Mutex<Option<ErrorKind>>>,
    ) {
        let kind = loop {
            let delivery = tokio::select! {
                biased;
                () = shutdown_token.cancelled() => break ErrorKind::Retryable,
                delivery = subscription.receive() => delivery,
            };

            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(
                        "response listener on '{}' stopped: {}",
                        subscription.topic(),
                        e
                    );
                    break e.kind();
                }
            };

            // Every reply is consumed, whether or not a request is still waiting for it
            if let Err(e) = subscription.acknowledge(&delivery).await {
                warn!(
                    "response listener on '{}' could not acknowledge: {}",
                    subscription.topic(),
                    e
                );
                break e.kind();
            }

            let Some(correlation_id) = delivery.properties().get(CORRELATION_ID) else {
                debug!("discarding reply without a correlation id");
                continue;
            };

            let waiting = pending.lock().remove(correlation_id);

            if let Some(request) = waiting {
                debug!(
                    "reply {} matched after {:?} ({:?} before deadline)",
                    correlation_id,
                    request.issued_at.elapsed(),
                    request.deadline.saturating_duration_since(Instant::now())
                );

                let _ = request
                    .sender
                    .send(R::try_from(delivery.payload().clone()));
            } else {
                debug!("discarding reply {} with no pending request", correlation_id);
            }
        };

        *close_kind.lock() = Some(kind);
        closed.cancel();

        // Dropping the senders wakes every waiter with `Closed`
        pending.lock().clear();
    }
}

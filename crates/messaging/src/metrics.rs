use std::fmt::Debug;
use std::time::Duration;

/// What a consumer did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageOutcome {
    /// The handler succeeded and the message was acknowledged.
    Acknowledged,

    /// The handler failed and the message was negatively acknowledged.
    Rejected,

    /// The message failed once more after reaching the redelivery limit and
    /// was acknowledged without being handled.
    Discarded,
}

/// How a correlated request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// A matching reply arrived.
    Replied,

    /// The deadline passed without a matching reply.
    TimedOut,

    /// The request could not be sent or the reply could not be read.
    Failed,
}

/// Receives framework events.
///
/// Passed into each component at construction. Every method has an empty
/// default so sinks only implement what they record.
pub trait MetricsSink: Debug + Send + Sync + 'static {
    /// A consumer finished with one message.
    fn message_handled(&self, _consumer: &str, _outcome: MessageOutcome) {}

    /// A correlated request completed.
    fn request_completed(&self, _topic: &str, _outcome: RequestOutcome, _elapsed: Duration) {}

    /// The supervisor is about to rebuild a stage after a failure.
    fn stage_restarted(&self, _stage: &str) {}
}

/// A sink that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

//! Messaging processor framework for pipeline stages.
//!
//! Stages consume typed messages from a broker subscription, optionally emit
//! messages downstream, and acknowledge or reject what they consumed. This
//! crate holds the broker-agnostic pieces: the broker traits, the consumer
//! loop, producers, the request/response correlation client, and the
//! supervisor that keeps a stage alive across failures.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Broker connections, publishers, and subscriptions.
pub mod broker;

/// Request/response calls over a pair of topics.
pub mod client;

/// Consumers run a handler over every message on a subscription.
pub mod consumer;

/// Consumer handlers hold the per-stage processing logic.
pub mod consumer_handler;

/// Error kinds shared by every layer that can fail a stage.
pub mod error;

/// Messages are payloads plus string properties.
pub mod message;

/// Metrics sinks observe the framework without global state.
pub mod metrics;

/// Producers send typed messages to a topic.
pub mod producer;

/// Stages are the unit of deployment.
pub mod stage;

/// The supervisor rebuilds a stage whenever it fails.
pub mod supervisor;

pub use error::ErrorKind;
pub use message::{CORRELATION_ID, Message, Properties};

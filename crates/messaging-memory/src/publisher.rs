use crate::error::Error;
use crate::state::State;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;
use trellis_messaging::Properties;
use trellis_messaging::broker::Publisher;

/// Publishes to one topic of an in-memory broker.
#[derive(Debug)]
pub struct MemoryPublisher {
    state: Arc<State>,
    topic: String,
}

impl MemoryPublisher {
    pub(crate) const fn new(state: Arc<State>, topic: String) -> Self {
        Self { state, topic }
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    type Error = Error;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, payload: Bytes, properties: Properties) -> Result<(), Self::Error> {
        self.state.check()?;

        let reached = self.state.publish(&self.topic, &payload, &properties);

        if reached == 0 {
            trace!("no subscribers on '{}', message dropped", self.topic);
        }

        Ok(())
    }
}

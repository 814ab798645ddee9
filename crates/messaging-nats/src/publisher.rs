use crate::error::Error;
use crate::headers::to_headers;

use async_nats::jetstream::Context as JetStreamContext;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use trellis_messaging::Properties;
use trellis_messaging::broker::Publisher;

/// Publishes to the stream backing one topic.
#[derive(Debug)]
pub struct NatsPublisher {
    closed: CancellationToken,
    header_prefix: String,
    jetstream: JetStreamContext,
    topic: String,
}

impl NatsPublisher {
    pub(crate) const fn new(
        jetstream: JetStreamContext,
        topic: String,
        header_prefix: String,
        closed: CancellationToken,
    ) -> Self {
        Self {
            closed,
            header_prefix,
            jetstream,
            topic,
        }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    type Error = Error;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, payload: Bytes, properties: Properties) -> Result<(), Self::Error> {
        if self.closed.is_cancelled() {
            return Err(Error::Closed);
        }

        let headers = to_headers(&self.header_prefix, &properties);

        // First await sends, second waits for the stream to store it
        let ack = self
            .jetstream
            .publish_with_headers(self.topic.clone(), headers, payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))?
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        trace!("published to '{}' at sequence {}", self.topic, ack.sequence);

        Ok(())
    }
}

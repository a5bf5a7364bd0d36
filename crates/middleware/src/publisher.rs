//! Registered publishing handle for a single topic

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::TransportError;
use crate::subjects::SubjectBuilder;
use crate::transport::Transport;

/// Queue depth used when the caller does not pick one
pub const DEFAULT_QUEUE_DEPTH: usize = 10;

/// Handle returned by topic registration.
///
/// Resolves the subject once and publishes every message to it.
pub struct TopicPublisher {
    transport: Arc<dyn Transport>,
    topic: String,
    subject: Arc<str>,
    queue_depth: usize,
}

impl TopicPublisher {
    /// Register `topic` on the transport and return a publishing handle.
    pub async fn advertise(
        transport: Arc<dyn Transport>,
        subjects: &SubjectBuilder,
        topic: &str,
        queue_depth: usize,
    ) -> Result<Self, TransportError> {
        let subject = subjects.topic(topic)?;
        transport.advertise(&subject, queue_depth).await?;
        tracing::debug!(topic, subject = %subject, queue_depth, "topic advertised");
        Ok(Self {
            transport,
            topic: topic.to_string(),
            subject,
            queue_depth,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Publish a payload with metadata headers.
    ///
    /// `payload` is reference counted; passing a clone does not copy the bytes.
    pub async fn publish(
        &self,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        self.transport
            .publish_with_headers(&self.subject, payload, headers)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;

    #[tokio::test]
    async fn test_advertise_and_publish() {
        let transport = Arc::new(InMemoryTransport::new());
        let subjects = SubjectBuilder::new();
        let publisher = TopicPublisher::advertise(transport.clone(), &subjects, "/camera/image", 4)
            .await
            .unwrap();
        assert_eq!(publisher.subject(), "camera.image");
        assert_eq!(publisher.topic(), "/camera/image");
        assert_eq!(publisher.queue_depth(), 4);

        let mut sub = transport.subscribe("camera.image").await.unwrap();
        let payload = Bytes::from_static(&[9, 9, 9, 9]);
        publisher.publish(payload.clone(), HashMap::new()).await.unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.payload, payload);
    }

    #[tokio::test]
    async fn test_advertise_invalid_topic() {
        let transport = Arc::new(InMemoryTransport::new());
        let result = TopicPublisher::advertise(transport, &SubjectBuilder::new(), "/", 10).await;
        assert!(matches!(result, Err(TransportError::InvalidTopic(_))));
    }
}

//! Bounded-rate image publisher
//!
//! Publishes a fixed number of identical-payload images on one topic at a
//! fixed period, after an optional start delay, then requests shutdown.
//!
//! Lifecycle: `Constructed` -> `Delaying` -> `Publishing` -> `Terminated`.
//! Transitions only move forward and are driven by timer expirations
//! dispatched from the executor.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use imgbench_middleware::{
    elapsed_secs, now_tsc, SubjectBuilder, TopicPublisher, Transport, DEFAULT_QUEUE_DEPTH,
};
use imgbench_params::ParameterSource;
use tracing::{debug, error, info, warn};

use crate::config::{load_config, PublisherConfig, RetryPolicy};
use crate::error::WorkerError;
use crate::executor::TimerCallback;
use crate::image::{generate_payload, ImageMessage, Stamper};
use crate::metrics::{Metrics, PublisherMetrics};
use crate::shutdown::Shutdown;
use crate::timer::{TimerHandle, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Constructed,
    Delaying,
    Publishing,
    Terminated,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Constructed => "constructed",
            Self::Delaying => "delaying",
            Self::Publishing => "publishing",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PublisherOptions {
    pub queue_depth: usize,
    pub retry: RetryPolicy,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            retry: RetryPolicy::default(),
        }
    }
}

/// Process-wide handles a publisher runs against
#[derive(Clone)]
pub struct NodeContext {
    pub transport: Arc<dyn Transport>,
    pub subjects: Arc<SubjectBuilder>,
    pub shutdown: Shutdown,
    pub metrics: Arc<Metrics>,
}

impl NodeContext {
    pub fn new(transport: Arc<dyn Transport>, shutdown: Shutdown, metrics: Arc<Metrics>) -> Self {
        Self {
            transport,
            subjects: Arc::new(SubjectBuilder::new()),
            shutdown,
            metrics,
        }
    }

    pub fn with_subjects(mut self, subjects: SubjectBuilder) -> Self {
        self.subjects = Arc::new(subjects);
        self
    }
}

pub struct ImagePublisher {
    name: String,
    config: PublisherConfig,
    publisher: TopicPublisher,
    payload: Bytes,
    stamper: Stamper,
    state: PublisherState,
    published: u32,
    delay_timer: Option<TimerHandle>,
    publish_timer: Option<TimerHandle>,
    shutdown: Shutdown,
    metrics: PublisherMetrics,
}

impl ImagePublisher {
    /// Load configuration from `source` and construct the publisher.
    ///
    /// Any failure requests process shutdown before it is returned.
    pub async fn create(
        name: &str,
        topic: &str,
        source: &dyn ParameterSource,
        options: &PublisherOptions,
        ctx: NodeContext,
        timers: &mut TimerQueue,
    ) -> Result<Self, WorkerError> {
        let shutdown = ctx.shutdown.clone();
        let result = match load_config(source, &options.retry, &shutdown, name).await {
            Ok(config) => Self::new(name, topic, config, options.queue_depth, ctx, timers).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!(publisher = name, error = %e, "failed to start publisher");
            shutdown.request();
        }
        result
    }

    /// Advertise `topic`, generate the shared payload and arm the start delay.
    pub async fn new(
        name: &str,
        topic: &str,
        config: PublisherConfig,
        queue_depth: usize,
        ctx: NodeContext,
        timers: &mut TimerQueue,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        let publisher =
            TopicPublisher::advertise(ctx.transport.clone(), &ctx.subjects, topic, queue_depth)
                .await?;

        let len = config.payload_len()?;
        let start = now_tsc();
        let payload = generate_payload(len, config.seed)?;
        info!(
            publisher = name,
            payload_bytes = len,
            elapsed_secs = elapsed_secs(start, now_tsc()),
            "generated payload"
        );

        let mut node = Self {
            name: name.to_string(),
            metrics: ctx.metrics.for_publisher(name),
            shutdown: ctx.shutdown,
            publisher,
            payload,
            stamper: Stamper::new(),
            state: PublisherState::Constructed,
            published: 0,
            delay_timer: None,
            publish_timer: None,
            config,
        };

        node.delay_timer = Some(timers.schedule_once(node.config.start_delay));
        node.state = PublisherState::Delaying;
        info!(
            publisher = name,
            topic,
            subject = node.publisher.subject(),
            delay_ms = node.config.start_delay.as_millis() as u64,
            "waiting before first publish"
        );
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    /// Publish attempts so far, including ones the transport rejected
    pub fn published(&self) -> u32 {
        self.published
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn subject(&self) -> &str {
        self.publisher.subject()
    }

    pub fn delay_timer(&self) -> Option<TimerHandle> {
        self.delay_timer
    }

    pub fn publish_timer(&self) -> Option<TimerHandle> {
        self.publish_timer
    }

    /// Start delay elapsed: switch from the one-shot timer to the periodic one
    pub fn on_delay_elapsed(&mut self, timers: &mut TimerQueue) {
        if self.state != PublisherState::Delaying {
            return;
        }
        if let Some(handle) = self.delay_timer.take() {
            timers.cancel(handle);
        }
        self.publish_timer = Some(timers.schedule_repeating(self.config.period));
        self.state = PublisherState::Publishing;
        info!(
            publisher = %self.name,
            period_ms = self.config.period.as_millis() as u64,
            "delay finished"
        );
    }

    /// Publish one image and terminate once the bound is reached
    pub async fn on_publish_tick(&mut self, timers: &mut TimerQueue) {
        if self.state != PublisherState::Publishing {
            return;
        }

        let image = ImageMessage::rgba8(
            self.stamper.stamp(),
            self.config.dimension,
            self.payload.clone(),
        );
        let headers = image.headers();
        let start = now_tsc();
        let result = self.publisher.publish(image.data, headers).await;
        self.published += 1;

        match result {
            Ok(()) => {
                self.metrics
                    .record_publish(self.payload.len(), elapsed_secs(start, now_tsc()));
                debug!(publisher = %self.name, count = self.published, "published image");
            }
            Err(e) => {
                self.metrics.record_error();
                warn!(
                    publisher = %self.name,
                    count = self.published,
                    error = %e,
                    "publish failed"
                );
            }
        }

        if self.published >= self.config.max_message_count {
            self.terminate(timers);
        }
    }

    /// Stop publishing and request process shutdown. Safe to call repeatedly.
    pub fn terminate(&mut self, timers: &mut TimerQueue) {
        if self.state == PublisherState::Terminated {
            return;
        }
        for handle in [self.delay_timer.take(), self.publish_timer.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(handle);
        }
        self.state = PublisherState::Terminated;
        info!(publisher = %self.name, count = self.published, "publisher terminated");
        self.shutdown.request();
    }
}

#[async_trait]
impl TimerCallback for ImagePublisher {
    async fn on_timer(&mut self, timer: TimerHandle, timers: &mut TimerQueue) {
        match self.state {
            PublisherState::Delaying if self.delay_timer == Some(timer) => {
                self.on_delay_elapsed(timers)
            }
            PublisherState::Publishing if self.publish_timer == Some(timer) => {
                self.on_publish_tick(timers).await
            }
            state => debug!(publisher = %self.name, ?timer, %state, "ignoring timer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use imgbench_middleware::{InMemoryTransport, Subscription, TransportError, TransportMessage};
    use imgbench_params::{InMemoryParameterSource, Parameters};
    use tokio::time::Instant;

    use crate::executor::{spin, SpinOutcome};

    struct Harness {
        transport: Arc<InMemoryTransport>,
        shutdown: Shutdown,
        metrics: Arc<Metrics>,
        timers: TimerQueue,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                transport: Arc::new(InMemoryTransport::new()),
                shutdown: Shutdown::new(),
                metrics: Arc::new(Metrics::new().unwrap()),
                timers: TimerQueue::new(),
            }
        }

        fn ctx(&self) -> NodeContext {
            NodeContext::new(self.transport.clone(), self.shutdown.clone(), self.metrics.clone())
        }

        async fn publisher(&mut self, config: PublisherConfig) -> ImagePublisher {
            let ctx = self.ctx();
            ImagePublisher::new("image_publisher", "image", config, 64, ctx, &mut self.timers)
                .await
                .unwrap()
        }
    }

    fn config(period_ms: u64, max: u32, dimension: u32, delay_ms: u64) -> PublisherConfig {
        PublisherConfig {
            period: Duration::from_millis(period_ms),
            max_message_count: max,
            dimension,
            start_delay: Duration::from_millis(delay_ms),
            ..Default::default()
        }
    }

    async fn drain(sub: &mut Box<dyn Subscription>) -> Vec<TransportMessage> {
        let mut out = Vec::new();
        while let Ok(Ok(msg)) = tokio::time::timeout(Duration::from_millis(50), sub.next()).await {
            out.push(msg);
        }
        out
    }

    /// Dispatch timers whose deadline is at or before `until`
    async fn run_until(node: &mut ImagePublisher, timers: &mut TimerQueue, until: Instant) {
        while let Some(deadline) = timers.next_deadline() {
            if deadline > until {
                break;
            }
            tokio::time::sleep_until(deadline).await;
            while let Some(handle) = timers.pop_due(Instant::now()) {
                node.on_timer(handle, timers).await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_exactly_max_count() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 5, 2, 0)).await;
        let mut sub = h.transport.subscribe("image").await.unwrap();

        let outcome = spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(outcome, SpinOutcome::Shutdown);
        assert_eq!(node.published(), 5);
        assert_eq!(node.state(), PublisherState::Terminated);
        assert_eq!(h.transport.published(), 5);
        assert!(h.timers.is_empty());
        assert_eq!(drain(&mut sub).await.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_gates_first_publish() {
        let mut h = Harness::new();
        let start = Instant::now();
        let mut node = h.publisher(config(10, 3, 2, 500)).await;
        assert_eq!(node.state(), PublisherState::Delaying);

        run_until(&mut node, &mut h.timers, start + Duration::from_millis(499)).await;
        assert_eq!(node.state(), PublisherState::Delaying);
        assert_eq!(h.transport.published(), 0);

        run_until(&mut node, &mut h.timers, start + Duration::from_millis(500)).await;
        assert_eq!(node.state(), PublisherState::Publishing);
        assert!(node.delay_timer().is_none());
        assert_eq!(h.transport.published(), 0);

        run_until(&mut node, &mut h.timers, start + Duration::from_millis(510)).await;
        assert_eq!(h.transport.published(), 1);

        run_until(&mut node, &mut h.timers, start + Duration::from_secs(10)).await;
        assert_eq!(h.transport.published(), 3);
        assert_eq!(node.state(), PublisherState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_share_payload() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 4, 2, 0)).await;
        assert_eq!(node.payload().len(), 16);
        let mut sub = h.transport.subscribe("image").await.unwrap();

        spin(&mut node, &mut h.timers, &h.shutdown).await;

        let messages = drain(&mut sub).await;
        assert_eq!(messages.len(), 4);
        for msg in &messages {
            assert_eq!(msg.payload.len(), 16);
            assert_eq!(msg.payload.as_ptr(), node.payload().as_ptr());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_metadata_and_increasing_stamps() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(1, 20, 3, 0)).await;
        let mut sub = h.transport.subscribe("image").await.unwrap();

        spin(&mut node, &mut h.timers, &h.shutdown).await;

        let images: Vec<ImageMessage> = drain(&mut sub)
            .await
            .iter()
            .map(|msg| ImageMessage::from_transport(msg).unwrap())
            .collect();
        assert_eq!(images.len(), 20);
        for image in &images {
            assert_eq!(image.header.frame_id, "image_frame");
            assert_eq!(image.encoding, "rgba8");
            assert_eq!(image.height, 3);
            assert_eq!(image.width, 3);
            assert_eq!(image.step, 12);
            assert_eq!(image.data, *node.payload());
        }
        for pair in images.windows(2) {
            assert!(pair[1].header.stamp > pair[0].header.stamp);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_termination_are_ignored() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 2, 1, 0)).await;

        run_until(&mut node, &mut h.timers, Instant::now()).await;
        let publish_timer = node.publish_timer().unwrap();

        spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(node.state(), PublisherState::Terminated);
        assert!(!h.timers.is_active(publish_timer));

        node.on_timer(publish_timer, &mut h.timers).await;
        node.on_publish_tick(&mut h.timers).await;
        node.terminate(&mut h.timers);
        assert_eq!(node.published(), 2);
        assert_eq!(h.transport.published(), 2);
        assert_eq!(node.state(), PublisherState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_delay_handle_ignored_while_publishing() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 3, 1, 5)).await;
        let delay = node.delay_timer().unwrap();

        let start = Instant::now();
        run_until(&mut node, &mut h.timers, start + Duration::from_millis(5)).await;
        assert_eq!(node.state(), PublisherState::Publishing);

        node.on_timer(delay, &mut h.timers).await;
        assert_eq!(node.state(), PublisherState::Publishing);
        assert_eq!(h.transport.published(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subject_prefix_applied() {
        let mut h = Harness::new();
        let ctx = h.ctx().with_subjects(SubjectBuilder::with_prefix("bench"));
        let mut node = ImagePublisher::new(
            "image_publisher",
            "/camera/image",
            config(10, 2, 1, 0),
            10,
            ctx,
            &mut h.timers,
        )
        .await
        .unwrap();
        assert_eq!(node.subject(), "bench.camera.image");
        let mut sub = h.transport.subscribe("bench.camera.image").await.unwrap();

        spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(drain(&mut sub).await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 1, 2, 0)).await;
        spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(h.transport.published(), 1);
        assert!(h.shutdown.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_dimension_publishes_empty_images() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(10, 3, 0, 0)).await;
        let mut sub = h.transport.subscribe("image").await.unwrap();
        assert!(node.payload().is_empty());

        spin(&mut node, &mut h.timers, &h.shutdown).await;

        let messages = drain(&mut sub).await;
        assert_eq!(messages.len(), 3);
        let image = ImageMessage::from_transport(&messages[0]).unwrap();
        assert_eq!(image.height, 0);
        assert_eq!(image.step, 0);
        assert!(image.data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_terminates() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(0, 10, 1, 0)).await;
        let outcome = spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(outcome, SpinOutcome::Shutdown);
        assert_eq!(h.transport.published(), 10);
    }

    #[tokio::test]
    async fn test_zero_max_count_rejected() {
        let mut h = Harness::new();
        let ctx = h.ctx();
        let result =
            ImagePublisher::new("image_publisher", "image", config(10, 0, 1, 0), 10, ctx, &mut h.timers)
                .await;
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
        assert!(h.timers.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let mut h = Harness::new();
        let mut node = h.publisher(config(1, 3, 2, 0)).await;
        spin(&mut node, &mut h.timers, &h.shutdown).await;

        let label = ["image_publisher"];
        assert_eq!(h.metrics.messages_published.with_label_values(&label).get(), 3);
        assert_eq!(h.metrics.bytes_published.with_label_values(&label).get(), 48);
        assert_eq!(h.metrics.publish_errors.with_label_values(&label).get(), 0);
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), TransportError> {
            Err(TransportError::PublishFailed("link down".to_string()))
        }

        async fn publish_with_headers(
            &self,
            _subject: &str,
            _payload: Bytes,
            _headers: HashMap<String, String>,
        ) -> Result<(), TransportError> {
            Err(TransportError::PublishFailed("link down".to_string()))
        }

        async fn subscribe(&self, _subject: &str) -> Result<Box<dyn Subscription>, TransportError> {
            Err(TransportError::SubscribeFailed("link down".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failures_counted_not_retried() {
        let mut h = Harness::new();
        let ctx = NodeContext::new(Arc::new(FailingTransport), h.shutdown.clone(), h.metrics.clone());
        let mut node =
            ImagePublisher::new("image_publisher", "image", config(10, 4, 1, 0), 10, ctx, &mut h.timers)
                .await
                .unwrap();

        let outcome = spin(&mut node, &mut h.timers, &h.shutdown).await;
        assert_eq!(outcome, SpinOutcome::Shutdown);
        assert_eq!(node.published(), 4);
        assert_eq!(node.state(), PublisherState::Terminated);
        assert_eq!(
            h.metrics
                .publish_errors
                .with_label_values(&["image_publisher"])
                .get(),
            4
        );
    }

    #[tokio::test]
    async fn test_create_reads_source() {
        let mut h = Harness::new();
        let source = InMemoryParameterSource::with_parameters(
            Parameters::new().with("max_count", 2).with("dimensions", 4).with("dt", 1),
        );
        let ctx = h.ctx();
        let node = ImagePublisher::create(
            "image_publisher",
            "image",
            &source,
            &PublisherOptions::default(),
            ctx,
            &mut h.timers,
        )
        .await
        .unwrap();
        assert_eq!(node.config().max_message_count, 2);
        assert_eq!(node.payload().len(), 64);
        assert_eq!(node.state(), PublisherState::Delaying);
        assert!(!h.shutdown.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_requests_shutdown_when_source_unavailable() {
        let mut h = Harness::new();
        let source = InMemoryParameterSource::unavailable();
        let options = PublisherOptions {
            retry: RetryPolicy {
                wait: Duration::from_secs(1),
                max_attempts: Some(2),
            },
            ..Default::default()
        };
        let ctx = h.ctx();
        let result =
            ImagePublisher::create("image_publisher", "image", &source, &options, ctx, &mut h.timers)
                .await;
        assert!(matches!(result, Err(WorkerError::ConfigUnavailable { attempts: 2 })));
        assert!(h.shutdown.is_requested());
        assert_eq!(h.transport.published(), 0);
    }

    #[tokio::test]
    async fn test_create_requests_shutdown_when_payload_cannot_be_allocated() {
        let mut h = Harness::new();
        let source = InMemoryParameterSource::with_parameters(
            Parameters::new().with("dimensions", 600_000_000),
        );
        let ctx = h.ctx();
        let result = ImagePublisher::create(
            "image_publisher",
            "image",
            &source,
            &PublisherOptions::default(),
            ctx,
            &mut h.timers,
        )
        .await;
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
        assert!(h.shutdown.is_requested());
        assert!(h.timers.is_empty());
        assert_eq!(h.transport.published(), 0);
    }

    #[tokio::test]
    async fn test_create_requests_shutdown_on_invalid_config() {
        let mut h = Harness::new();
        let source = InMemoryParameterSource::with_parameters(Parameters::new().with("max_count", 0));
        let ctx = h.ctx();
        let result = ImagePublisher::create(
            "image_publisher",
            "image",
            &source,
            &PublisherOptions::default(),
            ctx,
            &mut h.timers,
        )
        .await;
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
        assert!(h.shutdown.is_requested());
    }
}

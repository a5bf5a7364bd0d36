use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    pub registry: Registry,
    pub messages_published: IntCounterVec,
    pub bytes_published: IntCounterVec,
    pub publish_errors: IntCounterVec,
    pub publish_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let messages_published = IntCounterVec::new(
            Opts::new("imgbench_messages_published_total", "Images handed to the transport"),
            &["publisher"],
        )?;

        let bytes_published = IntCounterVec::new(
            Opts::new("imgbench_bytes_published_total", "Payload bytes handed to the transport"),
            &["publisher"],
        )?;

        let publish_errors = IntCounterVec::new(
            Opts::new("imgbench_publish_errors_total", "Publish attempts the transport rejected"),
            &["publisher"],
        )?;

        let publish_duration = HistogramVec::new(
            HistogramOpts::new(
                "imgbench_publish_duration_seconds",
                "Time spent in a single transport publish",
            )
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
            &["publisher"],
        )?;

        registry.register(Box::new(messages_published.clone()))?;
        registry.register(Box::new(bytes_published.clone()))?;
        registry.register(Box::new(publish_errors.clone()))?;
        registry.register(Box::new(publish_duration.clone()))?;

        Ok(Self {
            registry,
            messages_published,
            bytes_published,
            publish_errors,
            publish_duration,
        })
    }

    /// Counters bound to one publisher label
    pub fn for_publisher(&self, name: &str) -> PublisherMetrics {
        PublisherMetrics {
            messages: self.messages_published.with_label_values(&[name]),
            bytes: self.bytes_published.with_label_values(&[name]),
            errors: self.publish_errors.with_label_values(&[name]),
            duration: self.publish_duration.with_label_values(&[name]),
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[derive(Clone)]
pub struct PublisherMetrics {
    messages: IntCounter,
    bytes: IntCounter,
    errors: IntCounter,
    duration: Histogram,
}

impl PublisherMetrics {
    pub fn record_publish(&self, bytes: usize, seconds: f64) {
        self.messages.inc();
        self.bytes.inc_by(bytes as u64);
        self.duration.observe(seconds);
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }
}

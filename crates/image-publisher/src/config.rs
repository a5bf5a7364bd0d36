use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use imgbench_middleware::{SubjectBuilder, TransportKind, DEFAULT_QUEUE_DEPTH};
use imgbench_params::{ParamError, Parameters};
use imgbench_workers::{PublisherOptions, RetryPolicy};

/// image-publisher: publish a bounded number of images at a fixed rate
#[derive(Parser, Debug)]
#[command(name = "image-publisher")]
pub struct Args {
    /// Node name, used as the parameter namespace and metrics label
    #[arg(long, env = "IMGBENCH_NAME", default_value = "image_publisher")]
    pub name: String,

    /// Topic to publish images on
    #[arg(long, env = "IMGBENCH_TOPIC", default_value = "image")]
    pub topic: String,

    /// Transport backend (memory or nats)
    #[arg(long, env = "IMGBENCH_TRANSPORT", default_value = "memory")]
    pub transport: TransportKind,

    /// Prefix placed in front of every subject (e.g. `bench` gives `bench.image`)
    #[arg(long, env = "IMGBENCH_SUBJECT_PREFIX")]
    pub subject_prefix: Option<String>,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// YAML parameter file. Without one, built-in defaults are used.
    #[arg(long, env = "IMGBENCH_PARAMS")]
    pub params: Option<PathBuf>,

    /// Parameter override as name=value, repeatable
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub overrides: Vec<String>,

    /// Publisher queue depth
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Milliseconds to wait for the parameter source per attempt
    #[arg(long, default_value_t = 1000)]
    pub param_wait_ms: u64,

    /// Give up after this many failed waits (default: retry until shutdown)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub param_max_attempts: Option<u32>,

    /// Serve /healthz and /metrics on this address
    #[arg(long, env = "IMGBENCH_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    pub fn publisher_options(&self) -> PublisherOptions {
        PublisherOptions {
            queue_depth: self.queue_depth,
            retry: RetryPolicy {
                wait: Duration::from_millis(self.param_wait_ms),
                max_attempts: self.param_max_attempts,
            },
        }
    }

    /// `--param` overrides parsed into named values
    pub fn overrides(&self) -> Result<Parameters, ParamError> {
        let mut params = Parameters::new();
        for assignment in &self.overrides {
            let (name, value) = Parameters::parse_override(assignment)?;
            params.insert(name, value);
        }
        Ok(params)
    }

    pub fn subjects(&self) -> SubjectBuilder {
        match &self.subject_prefix {
            Some(prefix) => SubjectBuilder::with_prefix(prefix.as_str()),
            None => SubjectBuilder::new(),
        }
    }

    pub fn nats_url(&self) -> Option<&str> {
        match self.transport {
            TransportKind::Nats => Some(&self.nats_url),
            TransportKind::Memory => None,
        }
    }
}

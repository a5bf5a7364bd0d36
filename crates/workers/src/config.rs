//! Publisher configuration and loading from a parameter source

use std::time::Duration;

use imgbench_params::{ParamError, ParameterSource, Parameters};
use tracing::{error, info, warn};

use crate::error::WorkerError;
use crate::image::{payload_len, BYTES_PER_PIXEL};
use crate::shutdown::Shutdown;

/// Parameter names read from the source
pub mod names {
    /// Publish period in milliseconds
    pub const PERIOD_MS: &str = "dt";
    pub const MAX_COUNT: &str = "max_count";
    /// Image side length in pixels
    pub const DIMENSIONS: &str = "dimensions";
    /// Start delay in milliseconds
    pub const DELAY_MS: &str = "delay";
    pub const BENCHMARK_PATH: &str = "benchmark_path";
    /// Optional payload RNG seed
    pub const SEED: &str = "seed";

    pub const ALL: [&str; 6] = [PERIOD_MS, MAX_COUNT, DIMENSIONS, DELAY_MS, BENCHMARK_PATH, SEED];
}

pub const DEFAULT_PERIOD_MS: u64 = 10;
pub const DEFAULT_MAX_COUNT: u32 = 100;
pub const DEFAULT_DIMENSION: u32 = 1024;
pub const DEFAULT_DELAY_MS: u64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    pub period: Duration,
    pub max_message_count: u32,
    pub dimension: u32,
    pub start_delay: Duration,
    /// Where a benchmark report would go. Loaded but never written.
    pub report_path: String,
    pub seed: Option<u64>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(DEFAULT_PERIOD_MS),
            max_message_count: DEFAULT_MAX_COUNT,
            dimension: DEFAULT_DIMENSION,
            start_delay: Duration::from_millis(DEFAULT_DELAY_MS),
            report_path: String::new(),
            seed: None,
        }
    }
}

impl PublisherConfig {
    /// Build from named parameters, applying defaults for absent ones
    pub fn from_parameters(params: &Parameters) -> Result<Self, WorkerError> {
        let config = Self {
            period: Duration::from_millis(params.get_or(names::PERIOD_MS, DEFAULT_PERIOD_MS)?),
            max_message_count: params.get_or(names::MAX_COUNT, DEFAULT_MAX_COUNT)?,
            dimension: params.get_or(names::DIMENSIONS, DEFAULT_DIMENSION)?,
            start_delay: Duration::from_millis(params.get_or(names::DELAY_MS, DEFAULT_DELAY_MS)?),
            report_path: params.get_or(names::BENCHMARK_PATH, String::new())?,
            seed: params.get_opt(names::SEED)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.max_message_count == 0 {
            return Err(WorkerError::InvalidConfig(format!(
                "{} must be at least 1",
                names::MAX_COUNT
            )));
        }
        if self.dimension > u32::MAX / BYTES_PER_PIXEL {
            return Err(WorkerError::InvalidConfig(format!(
                "{} {} overflows the row step",
                names::DIMENSIONS,
                self.dimension
            )));
        }
        self.payload_len().map(|_| ())
    }

    /// Payload size in bytes: 4 * dimension^2
    pub fn payload_len(&self) -> Result<usize, WorkerError> {
        payload_len(self.dimension).ok_or_else(|| {
            WorkerError::InvalidConfig(format!(
                "{} {} is too large for this platform",
                names::DIMENSIONS,
                self.dimension
            ))
        })
    }

    /// Row length in bytes
    pub fn step(&self) -> u32 {
        self.dimension.saturating_mul(BYTES_PER_PIXEL)
    }
}

/// How long to wait for the parameter source, and how often to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Time given to each availability check
    pub wait: Duration,
    /// Give up after this many failed checks; `None` retries until shutdown.
    /// Every policy makes at least one check, so `Some(0)` acts as `Some(1)`.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Wait for `source` and read the publisher configuration from it.
///
/// Each failed availability check is logged and retried. Fails with
/// `Interrupted` if shutdown is requested meanwhile, or `ConfigUnavailable`
/// once `policy.max_attempts` checks have failed.
pub async fn load_config(
    source: &dyn ParameterSource,
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    node: &str,
) -> Result<PublisherConfig, WorkerError> {
    let mut attempts = 0u32;
    let params = loop {
        if source.wait_for_service(policy.wait).await {
            match source.get_parameters(&names::ALL).await {
                Ok(params) => break params,
                Err(ParamError::Unavailable(reason)) => {
                    warn!(node, %reason, "parameter source went away while reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if shutdown.is_requested() {
            error!(node, "interrupted while waiting for the parameter service, exiting");
            return Err(WorkerError::Interrupted);
        }

        attempts += 1;
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            error!(node, attempts, "parameter service never became available");
            return Err(WorkerError::ConfigUnavailable { attempts });
        }
        info!(node, attempts, "parameter service not available, waiting again");
    };

    let config = PublisherConfig::from_parameters(&params)?;
    info!(
        node,
        dt_ms = config.period.as_millis() as u64,
        max_count = config.max_message_count,
        dimensions = config.dimension,
        delay_ms = config.start_delay.as_millis() as u64,
        benchmark_path = %config.report_path,
        "loaded publisher parameters"
    );
    Ok(config)
}

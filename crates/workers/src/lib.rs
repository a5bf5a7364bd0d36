//! imgbench-workers: Rate-controlled benchmark publishers
//!
//! A worker is driven by a `TimerQueue` through the single-task executor in
//! `executor::spin`. `ImagePublisher` publishes a bounded number of images at
//! a fixed period and then requests shutdown.

pub mod config;
pub mod error;
pub mod executor;
pub mod image;
pub mod metrics;
pub mod publisher;
pub mod shutdown;
pub mod timer;

pub use config::{load_config, PublisherConfig, RetryPolicy};
pub use error::{MessageError, WorkerError};
pub use executor::{spin, SpinOutcome, TimerCallback};
pub use image::{generate_payload, payload_len, ImageMessage, Stamper};
pub use metrics::{Metrics, PublisherMetrics};
pub use publisher::{ImagePublisher, NodeContext, PublisherOptions, PublisherState};
pub use shutdown::Shutdown;
pub use timer::{TimerHandle, TimerQueue, MIN_PERIOD};

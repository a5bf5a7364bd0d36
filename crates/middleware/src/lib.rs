//! imgbench-middleware: Pluggable pub/sub transport
//!
//! Provides the `Transport` abstraction used by benchmark workers, with an
//! in-memory implementation for testing and a NATS implementation for real runs.

pub mod error;
pub mod factory;
pub mod latency;
pub mod memory;
pub mod nats;
pub mod publisher;
pub mod subjects;
pub mod transport;

pub use error::TransportError;
pub use factory::{FactoryError, MiddlewareFactory, TransportKind};
pub use latency::{elapsed_secs, now_tsc, CLOCK};
pub use memory::InMemoryTransport;
pub use nats::NatsTransport;
pub use publisher::{TopicPublisher, DEFAULT_QUEUE_DEPTH};
pub use subjects::{sanitize_subject_token, topic_to_subject, SubjectBuilder};
pub use transport::{Subscription, Transport, TransportMessage};

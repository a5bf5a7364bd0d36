use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TransportError;
use crate::memory::InMemoryTransport;
use crate::nats::NatsTransport;
use crate::transport::Transport;

/// Error creating middleware
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown transport type: {0}")]
    UnknownTransport(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Supported transport backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Memory,
    Nats,
}

impl FromStr for TransportKind {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "nats" => Ok(Self::Nats),
            other => Err(FactoryError::UnknownTransport(other.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Nats => write!(f, "nats"),
        }
    }
}

/// Factory for creating transports from runtime configuration
pub struct MiddlewareFactory;

impl MiddlewareFactory {
    /// Create a transport of the given kind. NATS requires a server URL.
    pub async fn create_transport(
        kind: TransportKind,
        url: Option<&str>,
    ) -> Result<Arc<dyn Transport>, FactoryError> {
        match kind {
            TransportKind::Memory => Ok(Arc::new(InMemoryTransport::new())),
            TransportKind::Nats => {
                let url = url.ok_or_else(|| {
                    FactoryError::ConfigError("NATS transport requires a server URL".to_string())
                })?;
                let transport = NatsTransport::connect(url).await?;
                tracing::info!(url, "connected to NATS");
                Ok(Arc::new(transport))
            }
        }
    }
}

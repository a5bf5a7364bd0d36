//! In-memory parameter source for tests and command-line overrides

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ParamError;
use crate::source::{ParameterSource, Parameters};

pub struct InMemoryParameterSource {
    params: RwLock<Parameters>,
    available: AtomicBool,
}

impl InMemoryParameterSource {
    /// An empty, reachable source
    pub fn new() -> Self {
        Self::with_parameters(Parameters::new())
    }

    pub fn with_parameters(params: Parameters) -> Self {
        Self {
            params: RwLock::new(params),
            available: AtomicBool::new(true),
        }
    }

    /// A source that reports itself unreachable until `set_available(true)`
    pub fn unavailable() -> Self {
        let source = Self::new();
        source.set_available(false);
        source
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        if let Ok(mut params) = self.params.write() {
            params.insert(name, value);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryParameterSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParameterSource for InMemoryParameterSource {
    async fn wait_for_service(&self, timeout: Duration) -> bool {
        if self.is_available() {
            return true;
        }
        tokio::time::sleep(timeout).await;
        self.is_available()
    }

    async fn get_parameters(&self, names: &[&str]) -> Result<Parameters, ParamError> {
        if !self.is_available() {
            return Err(ParamError::Unavailable("in-memory source disabled".to_string()));
        }
        let params = self
            .params
            .read()
            .map_err(|e| ParamError::Unavailable(e.to_string()))?;
        Ok(params.select(names))
    }
}

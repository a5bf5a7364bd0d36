use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParamError;
use crate::source::{ParameterSource, Parameters};

/// Fixed values layered over another source.
///
/// Reachability is the base source's; overrides win for names both define.
pub struct OverlayParameterSource {
    base: Box<dyn ParameterSource>,
    overrides: Parameters,
}

impl OverlayParameterSource {
    pub fn new(base: Box<dyn ParameterSource>, overrides: Parameters) -> Self {
        Self { base, overrides }
    }
}

#[async_trait]
impl ParameterSource for OverlayParameterSource {
    async fn wait_for_service(&self, timeout: Duration) -> bool {
        self.base.wait_for_service(timeout).await
    }

    async fn get_parameters(&self, names: &[&str]) -> Result<Parameters, ParamError> {
        let mut params = self.base.get_parameters(names).await?;
        params.merge(&self.overrides.select(names));
        Ok(params)
    }
}

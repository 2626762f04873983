pub mod assignment;
pub mod feasibility;
pub mod planning;
pub mod scoring;

use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::routing::RoutingProvider;

/// The four-layer dispatch funnel. Holds the immutable config and the routing
/// provider seam; all per-decision state comes in through the call arguments.
pub struct DispatchEngine {
    config: DispatchConfig,
    provider: Arc<dyn RoutingProvider>,
}

impl DispatchEngine {
    pub fn new(
        config: DispatchConfig,
        provider: Arc<dyn RoutingProvider>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

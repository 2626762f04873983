use thiserror::Error;

use crate::routing::RoutingError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatch config: {0}")]
    InvalidConfig(String),

    #[error("routing provider error: {0}")]
    Routing(#[from] RoutingError),

    #[error("order queue send failed: {0}")]
    QueueSend(String),
}
